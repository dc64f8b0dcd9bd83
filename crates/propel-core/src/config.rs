//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for an [`Engine`](crate::Engine).
///
/// Invalid numeric settings are never fatal: [`EngineConfig::sanitized`]
/// logs and substitutes the default for any out-of-range field.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Global multiplier applied to every frame delta. Must be >= 0.
    pub time_scale: f64,

    /// Maximum pump frequency in Hz. Frames arriving faster than this are
    /// skipped without advancing time. `0.0` disables the cap.
    pub max_update_frequency: f64,

    /// When true, mapped transforms record raw/clamped/eased percents each
    /// tick and guard the pipeline against NaN and infinity.
    pub debug_trace: bool,

    /// Wall-clock budget for iterative spline tessellation. A build that
    /// exceeds this aborts and leaves the path unbuilt.
    pub spline_build_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            time_scale: 1.0,
            max_update_frequency: 0.0,
            debug_trace: false,
            spline_build_timeout: Duration::from_millis(500),
        }
    }
}

impl EngineConfig {
    /// Return a copy with every invalid field replaced by its default,
    /// logging each substitution.
    pub fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        if !(self.time_scale >= 0.0) || !self.time_scale.is_finite() {
            log::error!(
                "invalid time_scale {}; using {}",
                self.time_scale,
                defaults.time_scale
            );
            self.time_scale = defaults.time_scale;
        }
        if !(self.max_update_frequency >= 0.0) || !self.max_update_frequency.is_finite() {
            log::error!(
                "invalid max_update_frequency {}; using {}",
                self.max_update_frequency,
                defaults.max_update_frequency
            );
            self.max_update_frequency = defaults.max_update_frequency;
        }
        if self.spline_build_timeout.is_zero() {
            log::error!(
                "spline_build_timeout of zero; using {:?}",
                defaults.spline_build_timeout
            );
            self.spline_build_timeout = defaults.spline_build_timeout;
        }
        self
    }
}
