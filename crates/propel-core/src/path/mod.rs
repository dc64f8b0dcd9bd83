//! Waypoint containers and arc-length-parameterized sampling.
//!
//! A path is authored as a *frame* (the control polygon of waypoints) and
//! consumed through derived *path points*: a tessellated sample sequence
//! paired with a segment table recording each consecutive pair's share of
//! the total length. The base [`Path`] connects its frame linearly;
//! [`BezierPath`] and [`CubicSplinePath`] tessellate a curve through the
//! frame instead.

mod bezier;
mod cubic;
mod spline;

pub use bezier::{BezierControl, BezierPath};
pub use cubic::CubicSplinePath;
pub use spline::SplineMode;

use crate::error::{DriveError, Result};
use crate::math::VecN;

/// One tessellated span: its cumulative-percent range along the whole path
/// and its absolute length.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PathSegment {
    pub start_pct: f64,
    pub end_pct: f64,
    pub length: f64,
}

/// Sampling surface shared by all path flavors; drivers hold paths through
/// this trait.
pub trait PathSample {
    /// The point at normalized arc length `pct` in `[0,1]`.
    fn value_at(&self, pct: f64) -> Result<VecN>;
    /// The path percent closest to `point`.
    fn nearest_to(&self, point: &VecN) -> Result<f64>;
    /// Total tessellated length.
    fn length(&self) -> f64;
    /// Whether the derived points are current.
    fn is_built(&self) -> bool;
}

/// A multi-waypoint path sampled by linear interpolation between its
/// tessellated points.
#[derive(Clone, Debug, Default)]
pub struct Path {
    frame: Vec<VecN>,
    closed: bool,
    auto_build: bool,
    points: Vec<VecN>,
    segments: Vec<PathSegment>,
    total_length: f64,
    built: bool,
}

impl Path {
    /// Create a linear path over `waypoints` and build it immediately.
    /// A build failure (fewer than two waypoints) is logged; the path stays
    /// unbuilt until more waypoints arrive.
    pub fn new(waypoints: Vec<VecN>) -> Self {
        let mut path = Self {
            frame: waypoints,
            closed: false,
            auto_build: true,
            points: Vec::new(),
            segments: Vec::new(),
            total_length: 0.0,
            built: false,
        };
        path.auto_rebuild();
        path
    }

    /// Create a path directly from tessellated sample points, bypassing any
    /// frame. Used by the spline paths to wrap their sampled points.
    pub(crate) fn from_points(points: Vec<VecN>) -> Result<Self> {
        if points.len() < 2 {
            return Err(DriveError::TooFewWaypoints {
                count: points.len(),
            });
        }
        let (segments, total_length) = assemble_segments(&points);
        Ok(Self {
            frame: Vec::new(),
            closed: false,
            auto_build: false,
            points,
            segments,
            total_length,
            built: true,
        })
    }

    /// The user-authored control polygon.
    #[inline]
    pub fn waypoints(&self) -> &[VecN] {
        &self.frame
    }

    /// The derived sample points (empty until built).
    #[inline]
    pub fn points(&self) -> &[VecN] {
        &self.points
    }

    /// The segment table (empty until built).
    #[inline]
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Append a waypoint; rebuilds (or invalidates) the derived points.
    pub fn push_waypoint(&mut self, point: VecN) {
        self.frame.push(point);
        self.auto_rebuild();
    }

    /// Replace a waypoint; rebuilds (or invalidates) the derived points.
    /// Panics if `index` is out of bounds.
    pub fn set_waypoint(&mut self, index: usize, point: VecN) {
        self.frame[index] = point;
        self.auto_rebuild();
    }

    /// Open or close the path; rebuilds (or invalidates) the derived points.
    pub fn set_closed(&mut self, closed: bool) {
        self.closed = closed;
        self.auto_rebuild();
    }

    /// Toggle automatic rebuilds on mutation. While off, mutations mark the
    /// path invalid until [`rebuild`](Self::rebuild) is called.
    pub fn set_auto_build(&mut self, auto_build: bool) {
        self.auto_build = auto_build;
    }

    /// Rebuild the derived points from the frame.
    pub fn rebuild(&mut self) -> Result<()> {
        self.built = false;
        if self.frame.len() < 2 {
            return Err(DriveError::TooFewWaypoints {
                count: self.frame.len(),
            });
        }
        self.points = resolve_frame(&self.frame, self.closed);
        let (segments, total) = assemble_segments(&self.points);
        self.segments = segments;
        self.total_length = total;
        self.built = true;
        Ok(())
    }

    fn auto_rebuild(&mut self) {
        if self.auto_build {
            if let Err(err) = self.rebuild() {
                log::error!("path rebuild failed: {err}");
            }
        } else {
            self.built = false;
        }
    }
}

impl PathSample for Path {
    fn value_at(&self, pct: f64) -> Result<VecN> {
        if !self.built {
            return Err(DriveError::PathNotBuilt {
                reason: "path mutated with auto-build off, or build failed".into(),
            });
        }
        Ok(sample_points(&self.points, &self.segments, pct))
    }

    fn nearest_to(&self, point: &VecN) -> Result<f64> {
        if !self.built {
            return Err(DriveError::PathNotBuilt {
                reason: "path mutated with auto-build off, or build failed".into(),
            });
        }
        Ok(nearest_on_points(&self.points, &self.segments, point))
    }

    #[inline]
    fn length(&self) -> f64 {
        self.total_length
    }

    #[inline]
    fn is_built(&self) -> bool {
        self.built
    }
}

/// Resolve a frame into the logical point list: a closed frame repeats its
/// first point at the end.
pub(crate) fn resolve_frame(frame: &[VecN], closed: bool) -> Vec<VecN> {
    let mut points = frame.to_vec();
    if closed {
        if let Some(first) = frame.first() {
            points.push(first.clone());
        }
    }
    points
}

/// Compute the segment table over consecutive point pairs. Segment percents
/// are monotone, start at 0, end at 1, and lengths sum to the returned
/// total. A degenerate all-coincident path distributes percents evenly.
pub(crate) fn assemble_segments(points: &[VecN]) -> (Vec<PathSegment>, f64) {
    let count = points.len().saturating_sub(1);
    let lengths: Vec<f64> = (0..count)
        .map(|i| points[i].distance(&points[i + 1]))
        .collect();
    let total: f64 = lengths.iter().sum();

    let mut segments = Vec::with_capacity(count);
    let mut cursor = 0.0;
    for (i, &length) in lengths.iter().enumerate() {
        let share = if total > 0.0 {
            length / total
        } else {
            1.0 / count as f64
        };
        let start_pct = cursor;
        let end_pct = if i + 1 == count { 1.0 } else { cursor + share };
        segments.push(PathSegment {
            start_pct,
            end_pct,
            length,
        });
        cursor = end_pct;
    }
    (segments, total)
}

/// Locate `pct` in the segment table and interpolate within the winning
/// segment. The 0 and 1 boundaries return the first/last point directly.
pub(crate) fn sample_points(points: &[VecN], segments: &[PathSegment], pct: f64) -> VecN {
    if pct <= 0.0 {
        return points[0].clone();
    }
    if pct >= 1.0 {
        return points[points.len() - 1].clone();
    }
    let index = segments
        .partition_point(|s| s.end_pct < pct)
        .min(segments.len() - 1);
    let segment = &segments[index];
    let span = segment.end_pct - segment.start_pct;
    let local = if span > 0.0 {
        (pct - segment.start_pct) / span
    } else {
        0.0
    };
    points[index].lerp(&points[index + 1], local)
}

/// Project `point` onto every segment (clamped) and return the global path
/// percent of the closest projection.
pub(crate) fn nearest_on_points(points: &[VecN], segments: &[PathSegment], point: &VecN) -> f64 {
    let mut best_pct = 0.0;
    let mut best_dist = f64::INFINITY;
    for (i, segment) in segments.iter().enumerate() {
        let (t, dist_sq) = point.distance_sq_to_segment(&points[i], &points[i + 1]);
        if dist_sq < best_dist {
            best_dist = dist_sq;
            best_pct = segment.start_pct + t * (segment.end_pct - segment.start_pct);
        }
    }
    best_pct
}
