//! Cubic Bezier paths with per-waypoint tangent controls.

use super::spline::{sample_curve, CurveSource, SplineMode};
use super::{
    nearest_on_points, resolve_frame, sample_points, Path, PathSample, PathSegment,
};
use crate::error::{DriveError, Result};
use crate::math::VecN;
use std::time::Duration;

/// Per-waypoint pair of tangent vectors. The in-vector shapes the curve
/// arriving at the waypoint, the out-vector the curve leaving it; both are
/// offsets relative to the waypoint itself.
#[derive(Clone, Debug, PartialEq)]
pub struct BezierControl {
    vec_in: VecN,
    vec_out: VecN,
    colinear: bool,
}

impl BezierControl {
    pub fn new(vec_in: VecN, vec_out: VecN) -> Self {
        Self {
            vec_in,
            vec_out,
            colinear: false,
        }
    }

    /// Zero tangents of the given dimension count (the curve degenerates to
    /// a line through the waypoint).
    pub fn flat(dimensions: usize) -> Self {
        Self::new(VecN::zeros(dimensions), VecN::zeros(dimensions))
    }

    /// Tie the two tangents together: while set, assigning either tangent
    /// forces the opposite one antiparallel in direction, keeping its own
    /// magnitude.
    pub fn with_colinear(mut self, colinear: bool) -> Self {
        self.colinear = colinear;
        if colinear {
            self.enforce_colinear_from_out();
        }
        self
    }

    #[inline]
    pub fn vec_in(&self) -> &VecN {
        &self.vec_in
    }

    #[inline]
    pub fn vec_out(&self) -> &VecN {
        &self.vec_out
    }

    #[inline]
    pub fn is_colinear(&self) -> bool {
        self.colinear
    }

    /// Set the incoming tangent. When colinear, the outgoing tangent keeps
    /// its magnitude but flips to the opposite direction.
    pub fn set_vec_in(&mut self, vec_in: VecN) {
        self.vec_in = vec_in;
        if self.colinear {
            self.enforce_colinear_from_in();
        }
    }

    /// Set the outgoing tangent. When colinear, the incoming tangent keeps
    /// its magnitude but flips to the opposite direction.
    pub fn set_vec_out(&mut self, vec_out: VecN) {
        self.vec_out = vec_out;
        if self.colinear {
            self.enforce_colinear_from_out();
        }
    }

    fn enforce_colinear_from_in(&mut self) {
        if self.vec_in.magnitude_sq() > 0.0 {
            let magnitude = self.vec_out.magnitude();
            self.vec_out = self.vec_in.normalized().scale(-magnitude);
        }
    }

    fn enforce_colinear_from_out(&mut self) {
        if self.vec_out.magnitude_sq() > 0.0 {
            let magnitude = self.vec_in.magnitude();
            self.vec_in = self.vec_out.normalized().scale(-magnitude);
        }
    }
}

/// A multi-waypoint cubic Bezier path. Each consecutive frame pair spans one
/// cubic segment shaped by the first waypoint's out-vector and the second's
/// in-vector. Dimensions can individually opt out of the curve and fall back
/// to the frame's linear interpolation.
pub struct BezierPath {
    frame: Vec<VecN>,
    controls: Vec<BezierControl>,
    /// Per-dimension flag: curved (true) or linear frame interpolation.
    curved_dims: Vec<bool>,
    closed: bool,
    mode: SplineMode,
    auto_build: bool,
    build_timeout: Duration,
    sampled: Option<Path>,
}

impl BezierPath {
    /// Create a Bezier path with flat (zero) controls on every waypoint and
    /// every dimension curved, then build it.
    pub fn new(waypoints: Vec<VecN>) -> Self {
        let dims = waypoints.first().map_or(0, VecN::dimensions);
        let controls = waypoints.iter().map(|_| BezierControl::flat(dims)).collect();
        let mut path = Self {
            frame: waypoints,
            controls,
            curved_dims: vec![true; dims],
            closed: false,
            mode: SplineMode::default(),
            auto_build: true,
            build_timeout: Duration::from_millis(500),
            sampled: None,
        };
        path.auto_rebuild();
        path
    }

    #[inline]
    pub fn waypoints(&self) -> &[VecN] {
        &self.frame
    }

    #[inline]
    pub fn control(&self, index: usize) -> &BezierControl {
        &self.controls[index]
    }

    /// Replace the control pair at a waypoint. Panics if out of bounds.
    pub fn set_control(&mut self, index: usize, control: BezierControl) {
        self.controls[index] = control;
        self.auto_rebuild();
    }

    /// Choose which dimensions follow the curve; the rest interpolate
    /// linearly between frame points.
    pub fn set_curved_dimensions(&mut self, curved: Vec<bool>) {
        self.curved_dims = curved;
        self.auto_rebuild();
    }

    pub fn set_closed(&mut self, closed: bool) {
        self.closed = closed;
        self.auto_rebuild();
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn set_mode(&mut self, mode: SplineMode) {
        self.mode = mode;
        self.auto_rebuild();
    }

    pub fn set_build_timeout(&mut self, timeout: Duration) {
        self.build_timeout = timeout;
    }

    pub fn set_auto_build(&mut self, auto_build: bool) {
        self.auto_build = auto_build;
    }

    /// Append a waypoint with flat controls.
    pub fn push_waypoint(&mut self, point: VecN) {
        let dims = point.dimensions();
        self.frame.push(point);
        self.controls.push(BezierControl::flat(dims));
        self.auto_rebuild();
    }

    /// Replace a waypoint, keeping its controls. Panics if out of bounds.
    pub fn set_waypoint(&mut self, index: usize, point: VecN) {
        self.frame[index] = point;
        self.auto_rebuild();
    }

    /// The derived sample points and segment table.
    pub fn points(&self) -> &[VecN] {
        self.sampled.as_ref().map_or(&[], Path::points)
    }

    pub fn segments(&self) -> &[PathSegment] {
        self.sampled.as_ref().map_or(&[], Path::segments)
    }

    /// Exact curve position at curve percent `pct` (not arc-length
    /// normalized; use [`PathSample::value_at`] for that).
    pub fn curve_value_at(&self, pct: f64) -> VecN {
        let shape = BezierShape {
            points: resolve_frame(&self.frame, self.closed),
            controls: &self.controls,
            curved_dims: &self.curved_dims,
            closed: self.closed,
        };
        shape.point_at(pct.clamp(0.0, 1.0))
    }

    /// Tessellate the curve into path points by the configured mode.
    pub fn rebuild(&mut self) -> Result<()> {
        self.sampled = None;
        if self.frame.len() < 2 {
            return Err(DriveError::TooFewWaypoints {
                count: self.frame.len(),
            });
        }
        let shape = BezierShape {
            points: resolve_frame(&self.frame, self.closed),
            controls: &self.controls,
            curved_dims: &self.curved_dims,
            closed: self.closed,
        };
        let points = sample_curve(&shape, self.mode, self.build_timeout)?;
        self.sampled = Some(Path::from_points(points)?);
        Ok(())
    }

    fn auto_rebuild(&mut self) {
        if self.auto_build {
            if let Err(err) = self.rebuild() {
                log::error!("bezier path rebuild failed: {err}");
            }
        } else {
            self.sampled = None;
        }
    }
}

impl PathSample for BezierPath {
    fn value_at(&self, pct: f64) -> Result<VecN> {
        let path = self.sampled.as_ref().ok_or_else(|| DriveError::PathNotBuilt {
            reason: "bezier path mutated with auto-build off, or build failed".into(),
        })?;
        Ok(sample_points(path.points(), path.segments(), pct))
    }

    fn nearest_to(&self, point: &VecN) -> Result<f64> {
        let path = self.sampled.as_ref().ok_or_else(|| DriveError::PathNotBuilt {
            reason: "bezier path mutated with auto-build off, or build failed".into(),
        })?;
        Ok(nearest_on_points(path.points(), path.segments(), point))
    }

    fn length(&self) -> f64 {
        self.sampled.as_ref().map_or(0.0, PathSample::length)
    }

    fn is_built(&self) -> bool {
        self.sampled.is_some()
    }
}

/// Resolved curve geometry handed to the sampling strategies.
struct BezierShape<'a> {
    /// Frame with the closing duplicate appended when closed.
    points: Vec<VecN>,
    controls: &'a [BezierControl],
    curved_dims: &'a [bool],
    closed: bool,
}

impl BezierShape<'_> {
    /// Control at a resolved index; the closing duplicate reuses the first
    /// waypoint's controls.
    fn control(&self, index: usize) -> &BezierControl {
        if self.closed && index == self.points.len() - 1 {
            &self.controls[0]
        } else {
            &self.controls[index]
        }
    }
}

impl CurveSource for BezierShape<'_> {
    fn point_at(&self, pct: f64) -> VecN {
        let intervals = self.points.len() - 1;
        let scaled = pct * intervals as f64;
        let index = (scaled.floor() as usize).min(intervals - 1);
        let t = scaled - index as f64;

        let p0 = &self.points[index];
        let p3 = &self.points[index + 1];
        let out = self.control(index).vec_out();
        let inn = self.control(index + 1).vec_in();

        let dims = p0.dimensions();
        let mut value = VecN::zeros(dims);
        for d in 0..dims {
            let curved = self.curved_dims.get(d).copied().unwrap_or(true);
            value[d] = if curved {
                cubic_bernstein(p0[d], p0[d] + out[d], p3[d] + inn[d], p3[d], t)
            } else {
                p0[d] + (p3[d] - p0[d]) * t
            };
        }
        value
    }

    fn interval_count(&self) -> usize {
        self.points.len() - 1
    }
}

/// Standard cubic Bernstein polynomial.
#[inline]
fn cubic_bernstein(p0: f64, p1: f64, p2: f64, p3: f64, t: f64) -> f64 {
    let u = 1.0 - t;
    u * u * u * p0 + 3.0 * u * u * t * p1 + 3.0 * u * t * t * p2 + t * t * t * p3
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn flat_controls_reduce_to_a_line() {
        let path = BezierPath::new(vec![VecN::new(vec![0.0, 0.0]), VecN::new(vec![4.0, 0.0])]);
        let mid = path.curve_value_at(0.5);
        assert_relative_eq!(mid[0], 2.0, epsilon = 1e-12);
        assert_relative_eq!(mid[1], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn curve_passes_through_waypoints() {
        let mut path = BezierPath::new(vec![
            VecN::new(vec![0.0, 0.0]),
            VecN::new(vec![2.0, 2.0]),
            VecN::new(vec![4.0, 0.0]),
        ]);
        path.set_control(
            0,
            BezierControl::new(VecN::zeros(2), VecN::new(vec![1.0, 1.0])),
        );
        assert_relative_eq!(path.curve_value_at(0.0)[0], 0.0);
        assert_relative_eq!(path.curve_value_at(0.5)[0], 2.0, epsilon = 1e-12);
        assert_relative_eq!(path.curve_value_at(1.0)[0], 4.0);
    }

    #[test]
    fn controls_bow_the_curve() {
        let mut path = BezierPath::new(vec![VecN::new(vec![0.0, 0.0]), VecN::new(vec![4.0, 0.0])]);
        path.set_control(
            0,
            BezierControl::new(VecN::zeros(2), VecN::new(vec![0.0, 3.0])),
        );
        path.set_control(
            1,
            BezierControl::new(VecN::new(vec![0.0, 3.0]), VecN::zeros(2)),
        );
        let mid = path.curve_value_at(0.5);
        assert!(mid[1] > 1.0, "curve should bow upward, got {}", mid[1]);
    }

    #[test]
    fn uncurved_dimension_stays_linear() {
        let mut path = BezierPath::new(vec![VecN::new(vec![0.0, 0.0]), VecN::new(vec![4.0, 0.0])]);
        path.set_control(
            0,
            BezierControl::new(VecN::zeros(2), VecN::new(vec![0.0, 3.0])),
        );
        path.set_curved_dimensions(vec![true, false]);
        let mid = path.curve_value_at(0.5);
        assert_relative_eq!(mid[1], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn colinear_controls_stay_antiparallel() {
        let mut control = BezierControl::new(
            VecN::new(vec![-1.0, 0.0]),
            VecN::new(vec![2.0, 0.0]),
        )
        .with_colinear(true);
        control.set_vec_out(VecN::new(vec![0.0, 4.0]));
        // Direction flips, magnitude of the opposite tangent is kept.
        assert_relative_eq!(control.vec_in()[1], -1.0, epsilon = 1e-12);
        assert_relative_eq!(control.vec_in().magnitude(), 1.0, epsilon = 1e-12);

        control.set_vec_in(VecN::new(vec![3.0, 0.0]));
        assert_relative_eq!(control.vec_out()[0], -4.0, epsilon = 1e-12);
        assert_relative_eq!(control.vec_out().magnitude(), 4.0, epsilon = 1e-12);
    }

    #[test]
    fn sampled_path_covers_the_curve() {
        let mut path = BezierPath::new(vec![VecN::new(vec![0.0, 0.0]), VecN::new(vec![4.0, 0.0])]);
        path.set_control(
            0,
            BezierControl::new(VecN::zeros(2), VecN::new(vec![0.0, 3.0])),
        );
        assert!(path.is_built());
        let start = path.value_at(0.0).unwrap();
        let end = path.value_at(1.0).unwrap();
        assert_relative_eq!(start[0], 0.0);
        assert_relative_eq!(end[0], 4.0);
        assert!(path.length() > 4.0);
    }

    #[test]
    fn closed_bezier_returns_to_start() {
        let mut path = BezierPath::new(vec![
            VecN::new(vec![0.0, 0.0]),
            VecN::new(vec![2.0, 0.0]),
            VecN::new(vec![1.0, 2.0]),
        ]);
        path.set_closed(true);
        let start = path.value_at(0.0).unwrap();
        let end = path.value_at(1.0).unwrap();
        assert_relative_eq!(start[0], end[0], epsilon = 1e-9);
        assert_relative_eq!(start[1], end[1], epsilon = 1e-9);
    }
}
