//! Natural cubic spline paths.
//!
//! Per dimension, waypoint first derivatives are solved from a tridiagonal
//! system under the natural boundary condition (zero second derivative at
//! open ends); closed paths solve the corresponding cyclic system. Each
//! waypoint interval then carries one cubic polynomial.

use super::spline::{sample_curve, CurveSource, SplineMode};
use super::{nearest_on_points, sample_points, Path, PathSample, PathSegment};
use crate::error::{DriveError, Result};
use crate::math::VecN;
use std::time::Duration;

/// A path interpolating all waypoints with a natural cubic spline.
pub struct CubicSplinePath {
    frame: Vec<VecN>,
    closed: bool,
    mode: SplineMode,
    auto_build: bool,
    build_timeout: Duration,
    /// Polynomial coefficients `[a, b, c, d]` per interval, per dimension.
    coefficients: Option<Vec<Vec<[f64; 4]>>>,
    sampled: Option<Path>,
}

impl CubicSplinePath {
    /// Create a natural cubic spline over `waypoints` and build it.
    pub fn new(waypoints: Vec<VecN>) -> Self {
        let mut path = Self {
            frame: waypoints,
            closed: false,
            mode: SplineMode::default(),
            auto_build: true,
            build_timeout: Duration::from_millis(500),
            coefficients: None,
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
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn set_closed(&mut self, closed: bool) {
        self.closed = closed;
        self.auto_rebuild();
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

    pub fn push_waypoint(&mut self, point: VecN) {
        self.frame.push(point);
        self.auto_rebuild();
    }

    /// Replace a waypoint. Panics if out of bounds.
    pub fn set_waypoint(&mut self, index: usize, point: VecN) {
        self.frame[index] = point;
        self.auto_rebuild();
    }

    pub fn points(&self) -> &[VecN] {
        self.sampled.as_ref().map_or(&[], Path::points)
    }

    pub fn segments(&self) -> &[PathSegment] {
        self.sampled.as_ref().map_or(&[], Path::segments)
    }

    /// Exact spline position at curve percent `pct`: the interval is the
    /// integer part of `pct * interval_count`, the polynomial is evaluated
    /// at the fractional remainder.
    pub fn spline_value_at(&self, pct: f64) -> Result<VecN> {
        let coefficients = self
            .coefficients
            .as_ref()
            .ok_or_else(|| DriveError::PathNotBuilt {
                reason: "spline mutated with auto-build off, or build failed".into(),
            })?;
        Ok(eval_spline(coefficients, pct.clamp(0.0, 1.0)))
    }

    /// Solve the spline and tessellate it into path points.
    pub fn rebuild(&mut self) -> Result<()> {
        self.coefficients = None;
        self.sampled = None;
        if self.frame.len() < 2 {
            return Err(DriveError::TooFewWaypoints {
                count: self.frame.len(),
            });
        }
        let coefficients = solve_coefficients(&self.frame, self.closed);
        let shape = SplineShape {
            coefficients: &coefficients,
        };
        let points = sample_curve(&shape, self.mode, self.build_timeout)?;
        self.sampled = Some(Path::from_points(points)?);
        self.coefficients = Some(coefficients);
        Ok(())
    }

    fn auto_rebuild(&mut self) {
        if self.auto_build {
            if let Err(err) = self.rebuild() {
                log::error!("cubic spline rebuild failed: {err}");
            }
        } else {
            self.coefficients = None;
            self.sampled = None;
        }
    }
}

impl PathSample for CubicSplinePath {
    fn value_at(&self, pct: f64) -> Result<VecN> {
        let path = self.sampled.as_ref().ok_or_else(|| DriveError::PathNotBuilt {
            reason: "spline mutated with auto-build off, or build failed".into(),
        })?;
        Ok(sample_points(path.points(), path.segments(), pct))
    }

    fn nearest_to(&self, point: &VecN) -> Result<f64> {
        let path = self.sampled.as_ref().ok_or_else(|| DriveError::PathNotBuilt {
            reason: "spline mutated with auto-build off, or build failed".into(),
        })?;
        Ok(nearest_on_points(path.points(), path.segments(), point))
    }

    fn length(&self) -> f64 {
        self.sampled.as_ref().map_or(0.0, PathSample::length)
    }

    fn is_built(&self) -> bool {
        self.sampled.is_some() && self.coefficients.is_some()
    }
}

struct SplineShape<'a> {
    coefficients: &'a [Vec<[f64; 4]>],
}

impl CurveSource for SplineShape<'_> {
    fn point_at(&self, pct: f64) -> VecN {
        eval_spline(self.coefficients, pct.clamp(0.0, 1.0))
    }

    fn interval_count(&self) -> usize {
        self.coefficients.len()
    }
}

fn eval_spline(coefficients: &[Vec<[f64; 4]>], pct: f64) -> VecN {
    let intervals = coefficients.len();
    let scaled = pct * intervals as f64;
    let index = (scaled.floor() as usize).min(intervals - 1);
    let t = scaled - index as f64;
    let interval = &coefficients[index];
    let mut value = VecN::zeros(interval.len());
    for (d, [a, b, c, e]) in interval.iter().enumerate() {
        value[d] = a + t * (b + t * (c + t * e));
    }
    value
}

/// Solve per-dimension first derivatives and turn them into per-interval
/// cubic coefficients `[a, b, c, d]` with `f(t) = a + b t + c t^2 + d t^3`.
fn solve_coefficients(frame: &[VecN], closed: bool) -> Vec<Vec<[f64; 4]>> {
    let dims = frame[0].dimensions();
    let n = frame.len();
    let intervals = if closed { n } else { n - 1 };

    let mut coefficients = vec![vec![[0.0; 4]; dims]; intervals];
    for d in 0..dims {
        let x: Vec<f64> = frame.iter().map(|p| p[d]).collect();
        let derivatives = if closed {
            solve_derivatives_cyclic(&x)
        } else {
            solve_derivatives_natural(&x)
        };
        for i in 0..intervals {
            let x0 = x[i];
            let x1 = x[(i + 1) % n];
            let d0 = derivatives[i];
            let d1 = derivatives[(i + 1) % n];
            let delta = x1 - x0;
            coefficients[i][d] = [
                x0,
                d0,
                3.0 * delta - 2.0 * d0 - d1,
                -2.0 * delta + d0 + d1,
            ];
        }
    }
    coefficients
}

/// First derivatives at each waypoint for an open spline with natural ends:
/// tridiagonal system solved by Thomas-style forward elimination and back
/// substitution.
fn solve_derivatives_natural(x: &[f64]) -> Vec<f64> {
    let n = x.len();
    if n == 2 {
        let slope = x[1] - x[0];
        return vec![slope, slope];
    }

    let mut sub = vec![1.0; n];
    let mut diag = vec![4.0; n];
    let mut sup = vec![1.0; n];
    let mut rhs = vec![0.0; n];

    diag[0] = 2.0;
    diag[n - 1] = 2.0;
    sub[0] = 0.0;
    sup[n - 1] = 0.0;
    rhs[0] = 3.0 * (x[1] - x[0]);
    rhs[n - 1] = 3.0 * (x[n - 1] - x[n - 2]);
    for i in 1..n - 1 {
        rhs[i] = 3.0 * (x[i + 1] - x[i - 1]);
    }

    solve_tridiagonal(&sub, &mut diag, &sup, &mut rhs);
    rhs
}

/// First derivatives for a closed spline: the cyclic tridiagonal system is
/// reduced to two ordinary solves via the Sherman-Morrison correction.
fn solve_derivatives_cyclic(x: &[f64]) -> Vec<f64> {
    let n = x.len();
    if n < 3 {
        let slope = if n == 2 { x[1] - x[0] } else { 0.0 };
        return vec![slope; n];
    }

    let mut rhs = vec![0.0; n];
    for i in 0..n {
        let prev = x[(i + n - 1) % n];
        let next = x[(i + 1) % n];
        rhs[i] = 3.0 * (next - prev);
    }

    // A = tri(1, 4, 1) with corner couplings; write A = B + u v^T where
    // B is tridiagonal with modified first/last diagonal entries.
    let gamma = -4.0;
    let sub = vec![1.0; n];
    let sup = vec![1.0; n];
    let mut diag = vec![4.0; n];
    diag[0] = 4.0 - gamma;
    diag[n - 1] = 4.0 - 1.0 / gamma;

    let mut y = rhs.clone();
    let mut diag_y = diag.clone();
    solve_tridiagonal(&sub, &mut diag_y, &sup, &mut y);

    let mut u = vec![0.0; n];
    u[0] = gamma;
    u[n - 1] = 1.0;
    let mut diag_z = diag.clone();
    let mut z = u.clone();
    solve_tridiagonal(&sub, &mut diag_z, &sup, &mut z);

    let factor = (y[0] + y[n - 1] / gamma) / (1.0 + z[0] + z[n - 1] / gamma);
    for i in 0..n {
        y[i] -= factor * z[i];
    }
    y
}

/// In-place Thomas algorithm; `diag` and `rhs` are consumed, the solution is
/// left in `rhs`.
fn solve_tridiagonal(sub: &[f64], diag: &mut [f64], sup: &[f64], rhs: &mut [f64]) {
    let n = rhs.len();
    for i in 1..n {
        let w = sub[i] / diag[i - 1];
        diag[i] -= w * sup[i - 1];
        rhs[i] -= w * rhs[i - 1];
    }
    rhs[n - 1] /= diag[n - 1];
    for i in (0..n - 1).rev() {
        rhs[i] = (rhs[i] - sup[i] * rhs[i + 1]) / diag[i];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn zigzag() -> Vec<VecN> {
        vec![
            VecN::new(vec![0.0, 0.0]),
            VecN::new(vec![1.0, 2.0]),
            VecN::new(vec![2.0, -1.0]),
            VecN::new(vec![3.0, 0.5]),
        ]
    }

    #[test]
    fn spline_reproduces_waypoints() {
        let path = CubicSplinePath::new(zigzag());
        let n = 3.0; // intervals
        for (i, waypoint) in path.waypoints().to_vec().iter().enumerate() {
            let value = path.spline_value_at(i as f64 / n).unwrap();
            assert_relative_eq!(value[0], waypoint[0], epsilon = 1e-9);
            assert_relative_eq!(value[1], waypoint[1], epsilon = 1e-9);
        }
    }

    #[test]
    fn two_point_spline_is_linear() {
        let path = CubicSplinePath::new(vec![VecN::new(vec![0.0]), VecN::new(vec![4.0])]);
        let mid = path.spline_value_at(0.5).unwrap();
        assert_relative_eq!(mid[0], 2.0, epsilon = 1e-9);
    }

    #[test]
    fn natural_ends_have_zero_second_derivative() {
        let path = CubicSplinePath::new(zigzag());
        // Second derivative of a + bt + ct^2 + dt^3 at t=0 is 2c; at t=1 it
        // is 2c + 6d. Check both open ends.
        let coefficients = path.coefficients.as_ref().unwrap();
        let first = &coefficients[0];
        let last = coefficients.last().unwrap();
        for d in 0..2 {
            assert_relative_eq!(first[d][2], 0.0, epsilon = 1e-9);
            assert_relative_eq!(last[d][2] + 3.0 * last[d][3], 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn closed_spline_wraps_continuously() {
        let mut path = CubicSplinePath::new(vec![
            VecN::new(vec![1.0, 0.0]),
            VecN::new(vec![0.0, 1.0]),
            VecN::new(vec![-1.0, 0.0]),
            VecN::new(vec![0.0, -1.0]),
        ]);
        path.set_closed(true);
        // Start and end of the curve coincide.
        let start = path.spline_value_at(0.0).unwrap();
        let end = path.spline_value_at(1.0).unwrap();
        assert_relative_eq!(start[0], end[0], epsilon = 1e-9);
        assert_relative_eq!(start[1], end[1], epsilon = 1e-9);
        // First derivative is continuous across the seam: compare the end of
        // the last interval with the start of the first.
        let coefficients = path.coefficients.as_ref().unwrap();
        let last = coefficients.last().unwrap();
        let first = &coefficients[0];
        for d in 0..2 {
            let end_slope = last[d][1] + 2.0 * last[d][2] + 3.0 * last[d][3];
            assert_relative_eq!(end_slope, first[d][1], epsilon = 1e-9);
        }
    }

    #[test]
    fn closed_cyclic_system_matches_equations() {
        // Verify D_{i-1} + 4 D_i + D_{i+1} = 3 (x_{i+1} - x_{i-1}) cyclically.
        let x = vec![1.0, 0.0, -1.0, 0.0, 2.0];
        let d = solve_derivatives_cyclic(&x);
        let n = x.len();
        for i in 0..n {
            let lhs = d[(i + n - 1) % n] + 4.0 * d[i] + d[(i + 1) % n];
            let rhs = 3.0 * (x[(i + 1) % n] - x[(i + n - 1) % n]);
            assert_relative_eq!(lhs, rhs, epsilon = 1e-9);
        }
    }

    #[test]
    fn arc_length_sampling_covers_spline() {
        let path = CubicSplinePath::new(zigzag());
        assert!(path.is_built());
        let start = path.value_at(0.0).unwrap();
        let end = path.value_at(1.0).unwrap();
        assert_relative_eq!(start[0], 0.0, epsilon = 1e-9);
        assert_relative_eq!(end[0], 3.0, epsilon = 1e-9);
        let sum: f64 = path.segments().iter().map(|s| s.length).sum();
        assert_relative_eq!(sum, path.length(), epsilon = 1e-9);
    }
}
