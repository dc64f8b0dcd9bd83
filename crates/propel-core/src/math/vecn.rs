//! Generic n-dimensional vector used throughout the path engine.

use serde::{Deserialize, Serialize};
use std::ops::{Add, Index, IndexMut, Neg, Sub};

/// An n-dimensional vector of `f64` components.
///
/// Operations that combine two vectors panic on dimension mismatch; mixing
/// dimension counts is a programmer error, not a runtime condition the
/// engine recovers from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
pub struct VecN(Vec<f64>);

impl VecN {
    /// Build a vector from components.
    pub fn new(components: impl Into<Vec<f64>>) -> Self {
        Self(components.into())
    }

    /// A vector of `dimensions` zeros.
    pub fn zeros(dimensions: usize) -> Self {
        Self(vec![0.0; dimensions])
    }

    /// Number of dimensions.
    #[inline]
    pub fn dimensions(&self) -> usize {
        self.0.len()
    }

    /// Component slice.
    #[inline]
    pub fn components(&self) -> &[f64] {
        &self.0
    }

    #[inline]
    fn check_dims(&self, other: &Self) {
        assert_eq!(
            self.dimensions(),
            other.dimensions(),
            "dimension mismatch: {} vs {}",
            self.dimensions(),
            other.dimensions()
        );
    }

    /// Componentwise sum.
    pub fn add(&self, other: &Self) -> Self {
        self.check_dims(other);
        Self(self.0.iter().zip(&other.0).map(|(a, b)| a + b).collect())
    }

    /// Componentwise difference.
    pub fn sub(&self, other: &Self) -> Self {
        self.check_dims(other);
        Self(self.0.iter().zip(&other.0).map(|(a, b)| a - b).collect())
    }

    /// Componentwise negation.
    pub fn neg(&self) -> Self {
        Self(self.0.iter().map(|a| -a).collect())
    }

    /// Scale every component by `factor`.
    pub fn scale(&self, factor: f64) -> Self {
        Self(self.0.iter().map(|a| a * factor).collect())
    }

    /// Dot product.
    pub fn dot(&self, other: &Self) -> f64 {
        self.check_dims(other);
        self.0.iter().zip(&other.0).map(|(a, b)| a * b).sum()
    }

    /// Squared Euclidean magnitude.
    #[inline]
    pub fn magnitude_sq(&self) -> f64 {
        self.0.iter().map(|a| a * a).sum()
    }

    /// Euclidean magnitude.
    #[inline]
    pub fn magnitude(&self) -> f64 {
        self.magnitude_sq().sqrt()
    }

    /// Euclidean distance to another point.
    #[inline]
    pub fn distance(&self, other: &Self) -> f64 {
        self.sub(other).magnitude()
    }

    /// Unit vector in the same direction. A zero vector normalizes to itself.
    pub fn normalized(&self) -> Self {
        let mag = self.magnitude();
        if mag == 0.0 {
            self.clone()
        } else {
            self.scale(1.0 / mag)
        }
    }

    /// Angle between two vectors in radians, via the arccosine of the
    /// normalized dot product (clamped to guard rounding).
    pub fn angle_between(&self, other: &Self) -> f64 {
        self.check_dims(other);
        let denom = self.magnitude() * other.magnitude();
        if denom == 0.0 {
            return 0.0;
        }
        (self.dot(other) / denom).clamp(-1.0, 1.0).acos()
    }

    /// Linear interpolation: `self + (other - self) * t`.
    pub fn lerp(&self, other: &Self, t: f64) -> Self {
        self.check_dims(other);
        Self(
            self.0
                .iter()
                .zip(&other.0)
                .map(|(a, b)| a + (b - a) * t)
                .collect(),
        )
    }

    /// Inverse of [`lerp`](Self::lerp): the ratio at which `value` sits
    /// between `self` and `other`. The first dimension where the endpoints
    /// differ determines the ratio; identical endpoints yield 0.
    pub fn inverse_lerp(&self, other: &Self, value: &Self) -> f64 {
        self.check_dims(other);
        self.check_dims(value);
        for ((a, b), v) in self.0.iter().zip(&other.0).zip(&value.0) {
            if (b - a).abs() > f64::EPSILON {
                return (v - a) / (b - a);
            }
        }
        0.0
    }

    /// Squared distance from this point to the segment `a..b`, together with
    /// the projection parameter clamped to `[0,1]`. A degenerate segment
    /// (`a == b`) projects everything onto `a` with parameter 0.
    pub fn distance_sq_to_segment(&self, a: &Self, b: &Self) -> (f64, f64) {
        self.check_dims(a);
        self.check_dims(b);
        let ab = b.sub(a);
        let len_sq = ab.magnitude_sq();
        let t = if len_sq == 0.0 {
            0.0
        } else {
            (self.sub(a).dot(&ab) / len_sq).clamp(0.0, 1.0)
        };
        let closest = a.lerp(b, t);
        (t, self.sub(&closest).magnitude_sq())
    }
}

impl From<Vec<f64>> for VecN {
    fn from(components: Vec<f64>) -> Self {
        Self(components)
    }
}

impl Index<usize> for VecN {
    type Output = f64;

    #[inline]
    fn index(&self, i: usize) -> &f64 {
        &self.0[i]
    }
}

impl IndexMut<usize> for VecN {
    #[inline]
    fn index_mut(&mut self, i: usize) -> &mut f64 {
        &mut self.0[i]
    }
}

impl Add for &VecN {
    type Output = VecN;

    fn add(self, other: &VecN) -> VecN {
        VecN::add(self, other)
    }
}

impl Sub for &VecN {
    type Output = VecN;

    fn sub(self, other: &VecN) -> VecN {
        VecN::sub(self, other)
    }
}

impl Neg for &VecN {
    type Output = VecN;

    fn neg(self) -> VecN {
        VecN::neg(self)
    }
}
