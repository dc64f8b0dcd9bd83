//! Point-generation strategies shared by the spline paths.

use crate::error::{DriveError, Result};
use crate::math::VecN;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// How a spline converts its continuous curve into discrete path points.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum SplineMode {
    /// Walk the curve emitting points a fixed chord length apart, refining
    /// each step by binary search until the chord lands within
    /// `accuracy * segment_length` of the target.
    FixedLength { segment_length: f64, accuracy: f64 },
    /// Adaptively bisect each frame interval, keeping a midpoint only where
    /// the curve turns by more than `angle_threshold` radians and the span
    /// being split is longer than `min_segment_length` (auto-derived as
    /// estimated total length / 500 when unset).
    MinimumAngle {
        angle_threshold: f64,
        min_segment_length: Option<f64>,
    },
}

impl Default for SplineMode {
    fn default() -> Self {
        Self::MinimumAngle {
            angle_threshold: 5.0_f64.to_radians(),
            min_segment_length: None,
        }
    }
}

impl SplineMode {
    /// Replace invalid numeric settings with defaults, logging each one.
    pub(crate) fn sanitized(self) -> Self {
        match self {
            Self::FixedLength {
                mut segment_length,
                mut accuracy,
            } => {
                if !(segment_length > 0.0) || !segment_length.is_finite() {
                    log::error!("invalid spline segment_length {segment_length}; using 0.1");
                    segment_length = 0.1;
                }
                if !(accuracy > 0.0) || !accuracy.is_finite() {
                    log::error!("invalid spline accuracy {accuracy}; using 0.01");
                    accuracy = 0.01;
                }
                Self::FixedLength {
                    segment_length,
                    accuracy,
                }
            }
            Self::MinimumAngle {
                mut angle_threshold,
                mut min_segment_length,
            } => {
                if !(angle_threshold > 0.0) || !angle_threshold.is_finite() {
                    log::error!("invalid spline angle_threshold {angle_threshold}; using 5 degrees");
                    angle_threshold = 5.0_f64.to_radians();
                }
                if let Some(min) = min_segment_length {
                    if !(min > 0.0) || !min.is_finite() {
                        log::error!("invalid spline min_segment_length {min}; auto-deriving");
                        min_segment_length = None;
                    }
                }
                Self::MinimumAngle {
                    angle_threshold,
                    min_segment_length,
                }
            }
        }
    }
}

/// A continuous curve over `[0,1]` that a sampling strategy can probe.
pub(crate) trait CurveSource {
    /// Exact curve position at curve percent `pct`.
    fn point_at(&self, pct: f64) -> VecN;
    /// Number of frame-to-frame intervals.
    fn interval_count(&self) -> usize;
}

/// Chord-sum estimate of the curve's total length.
pub(crate) fn estimate_length(curve: &dyn CurveSource) -> f64 {
    let samples = (curve.interval_count() * 16).max(16);
    let mut total = 0.0;
    let mut last = curve.point_at(0.0);
    for i in 1..=samples {
        let next = curve.point_at(i as f64 / samples as f64);
        total += last.distance(&next);
        last = next;
    }
    total
}

/// Generate path points by the chosen mode.
pub(crate) fn sample_curve(
    curve: &dyn CurveSource,
    mode: SplineMode,
    timeout: Duration,
) -> Result<Vec<VecN>> {
    match mode.sanitized() {
        SplineMode::FixedLength {
            segment_length,
            accuracy,
        } => sample_fixed_length(curve, segment_length, accuracy, timeout),
        SplineMode::MinimumAngle {
            angle_threshold,
            min_segment_length,
        } => Ok(sample_min_angle(curve, angle_threshold, min_segment_length)),
    }
}

/// Fixed-chord sampling with per-step binary search. The search for each
/// step is seeded by `segment_length / estimated_total` and refined until
/// the chord from the last accepted point lands within
/// `±accuracy·segment_length` of the target. A wall-clock `timeout` guards
/// against non-convergence: on expiry the build aborts with an error.
fn sample_fixed_length(
    curve: &dyn CurveSource,
    segment_length: f64,
    accuracy: f64,
    timeout: Duration,
) -> Result<Vec<VecN>> {
    let deadline = Instant::now() + timeout;
    let estimated_total = estimate_length(curve).max(f64::MIN_POSITIVE);
    let guess_step = (segment_length / estimated_total).clamp(1e-9, 1.0);
    let upper = segment_length * (1.0 + accuracy);
    let lower = segment_length * (1.0 - accuracy);

    let mut points = vec![curve.point_at(0.0)];
    let mut last_pct = 0.0_f64;
    let end_point = curve.point_at(1.0);

    loop {
        if Instant::now() >= deadline {
            return Err(DriveError::BuildTimeout {
                timeout_ms: timeout.as_millis() as u64,
            });
        }

        let last_point = points.last().expect("points is never empty").clone();
        // Stop once the remaining curve fits in a single closing chord.
        if last_pct >= 1.0 - 1e-9 || last_point.distance(&end_point) <= upper {
            points.push(end_point);
            return Ok(points);
        }

        let mut lo = last_pct;
        let mut hi = 1.0_f64;
        let mut candidate = (last_pct + guess_step).min(1.0);
        for _ in 0..64 {
            if Instant::now() >= deadline {
                return Err(DriveError::BuildTimeout {
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            let chord = last_point.distance(&curve.point_at(candidate));
            if chord > upper {
                hi = candidate;
            } else if chord < lower && candidate < 1.0 - 1e-12 {
                lo = candidate;
            } else {
                break;
            }
            if hi - lo < 1e-12 {
                break;
            }
            candidate = 0.5 * (lo + hi);
        }

        points.push(curve.point_at(candidate));
        if candidate >= 1.0 - 1e-9 {
            return Ok(points);
        }
        last_pct = candidate;
    }
}

/// Adaptive minimum-angle sampling, iterative with an explicit work stack to
/// bound stack depth on pathological inputs. Accepted midpoints are merged
/// with the frame points in curve-percent order.
fn sample_min_angle(
    curve: &dyn CurveSource,
    angle_threshold: f64,
    min_segment_length: Option<f64>,
) -> Vec<VecN> {
    let intervals = curve.interval_count().max(1);
    let min_length = min_segment_length.unwrap_or_else(|| estimate_length(curve) / 500.0);

    let mut samples: Vec<(f64, VecN)> = (0..=intervals)
        .map(|i| {
            let pct = i as f64 / intervals as f64;
            (pct, curve.point_at(pct))
        })
        .collect();

    let mut stack: Vec<(f64, f64)> = (0..intervals)
        .map(|i| {
            (
                i as f64 / intervals as f64,
                (i + 1) as f64 / intervals as f64,
            )
        })
        .collect();

    while let Some((lo, hi)) = stack.pop() {
        if hi - lo < 1e-6 {
            continue;
        }
        let mid = 0.5 * (lo + hi);
        let p_lo = curve.point_at(lo);
        let p_mid = curve.point_at(mid);
        let p_hi = curve.point_at(hi);
        let to_mid = p_mid.sub(&p_lo);
        let from_mid = p_hi.sub(&p_mid);
        let turn = to_mid.angle_between(&from_mid);
        if turn > angle_threshold && p_lo.distance(&p_hi) > min_length {
            samples.push((mid, p_mid));
            stack.push((lo, mid));
            stack.push((mid, hi));
        }
    }

    samples.sort_by(|a, b| a.0.total_cmp(&b.0));
    samples.into_iter().map(|(_, point)| point).collect()
}
