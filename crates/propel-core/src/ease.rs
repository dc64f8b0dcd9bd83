//! Closed-form easing curves and the tagged easing handle.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Named closed-form easing curves. All map `[0,1] -> [0,1]` with
/// `f(0) = 0` and `f(1) = 1`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EaseKind {
    #[default]
    Linear,
    QuadIn,
    QuadOut,
    QuadInOut,
    CubicIn,
    CubicOut,
    CubicInOut,
    SineIn,
    SineOut,
    SineInOut,
    ExpoIn,
    ExpoOut,
    ExpoInOut,
}

impl EaseKind {
    /// Evaluate the curve at `t`. Inputs outside `[0,1]` are not clamped;
    /// callers clamp before easing.
    pub fn apply(self, t: f64) -> f64 {
        use std::f64::consts::{FRAC_PI_2, PI};
        match self {
            Self::Linear => t,
            Self::QuadIn => t * t,
            Self::QuadOut => t * (2.0 - t),
            Self::QuadInOut => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    let u = 2.0 * t - 2.0;
                    1.0 - u * u / 2.0
                }
            }
            Self::CubicIn => t * t * t,
            Self::CubicOut => {
                let u = t - 1.0;
                u * u * u + 1.0
            }
            Self::CubicInOut => {
                if t < 0.5 {
                    4.0 * t * t * t
                } else {
                    let u = 2.0 * t - 2.0;
                    u * u * u / 2.0 + 1.0
                }
            }
            Self::SineIn => 1.0 - (t * FRAC_PI_2).cos(),
            Self::SineOut => (t * FRAC_PI_2).sin(),
            Self::SineInOut => 0.5 * (1.0 - (t * PI).cos()),
            Self::ExpoIn => {
                if t <= 0.0 {
                    0.0
                } else {
                    (2.0f64).powf(10.0 * (t - 1.0))
                }
            }
            Self::ExpoOut => {
                if t >= 1.0 {
                    1.0
                } else {
                    1.0 - (2.0f64).powf(-10.0 * t)
                }
            }
            Self::ExpoInOut => {
                if t <= 0.0 {
                    0.0
                } else if t >= 1.0 {
                    1.0
                } else if t < 0.5 {
                    0.5 * (2.0f64).powf(20.0 * t - 10.0)
                } else {
                    1.0 - 0.5 * (2.0f64).powf(-20.0 * t + 10.0)
                }
            }
        }
    }
}

/// An easing selection: either a named closed-form curve or a caller-supplied
/// function.
#[derive(Clone)]
pub enum Ease {
    Named(EaseKind),
    Custom(Arc<dyn Fn(f64) -> f64>),
}

impl Ease {
    /// Evaluate the easing at `t`.
    #[inline]
    pub fn apply(&self, t: f64) -> f64 {
        match self {
            Self::Named(kind) => kind.apply(t),
            Self::Custom(f) => f(t),
        }
    }

    /// Wrap a custom easing function.
    pub fn custom(f: impl Fn(f64) -> f64 + 'static) -> Self {
        Self::Custom(Arc::new(f))
    }
}

impl Default for Ease {
    fn default() -> Self {
        Self::Named(EaseKind::Linear)
    }
}

impl From<EaseKind> for Ease {
    fn from(kind: EaseKind) -> Self {
        Self::Named(kind)
    }
}

impl fmt::Debug for Ease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(kind) => write!(f, "Ease::Named({kind:?})"),
            Self::Custom(_) => write!(f, "Ease::Custom(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const ALL: &[EaseKind] = &[
        EaseKind::Linear,
        EaseKind::QuadIn,
        EaseKind::QuadOut,
        EaseKind::QuadInOut,
        EaseKind::CubicIn,
        EaseKind::CubicOut,
        EaseKind::CubicInOut,
        EaseKind::SineIn,
        EaseKind::SineOut,
        EaseKind::SineInOut,
        EaseKind::ExpoIn,
        EaseKind::ExpoOut,
        EaseKind::ExpoInOut,
    ];

    #[test]
    fn endpoints_are_fixed() {
        for kind in ALL {
            assert_relative_eq!(kind.apply(0.0), 0.0, epsilon = 1e-9);
            assert_relative_eq!(kind.apply(1.0), 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn curves_are_monotone_on_samples() {
        for kind in ALL {
            let mut prev = kind.apply(0.0);
            for i in 1..=100 {
                let v = kind.apply(i as f64 / 100.0);
                assert!(v >= prev - 1e-12, "{kind:?} decreased at step {i}");
                prev = v;
            }
        }
    }

    #[test]
    fn custom_ease_is_applied() {
        let ease = Ease::custom(|t| t * t);
        assert_relative_eq!(ease.apply(0.5), 0.25);
    }
}
