//! Per-tick transform strategies.
//!
//! A driver is composition, not hierarchy: timing/lifecycle state plus one
//! tagged [`Transform`] strategy deciding how the drive value becomes the
//! target value each tick.

use crate::adapter::{Adapter, CoordinateAdapter};
use crate::driver::{DriverCallbacks, LoopMode};
use crate::ease::Ease;
use crate::path::PathSample;
use std::sync::Arc;

/// Result of one transform application.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum StepOutcome {
    Running,
    /// The strategy reached its natural end; the driver finishes.
    Finished,
    /// Unrecoverable misconfiguration discovered mid-run; the driver
    /// self-destructs without terminal callbacks.
    Failed,
}

/// Debug record of one tick's percent pipeline.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct PercentTrace {
    pub raw: f64,
    pub clamped: f64,
    pub eased: f64,
}

/// Where an eased percent lands: a two-point lerp or a path sample.
pub(crate) enum PercentTarget<T> {
    TwoPoint {
        from: T,
        to: T,
        ops: Arc<Adapter<T>>,
    },
    Path {
        path: Box<dyn PathSample>,
        coord: Arc<CoordinateAdapter<T>>,
    },
}

impl<T> PercentTarget<T> {
    /// Resolve a percent to a target value. `None` signals an unusable
    /// target (unbuilt path), already logged.
    pub(crate) fn value_at(&self, pct: f64) -> Option<T> {
        match self {
            Self::TwoPoint { from, to, ops } => Some((ops.lerp)(from, to, pct)),
            Self::Path { path, coord } => match path.value_at(pct) {
                Ok(point) => Some(coord.from_point(&point)),
                Err(err) => {
                    log::error!("path sample failed: {err}");
                    None
                }
            },
        }
    }

    /// Length of the traversed span, for speed-based progress.
    pub(crate) fn span_length(&self) -> f64 {
        match self {
            Self::TwoPoint { from, to, ops } => (ops.distance)(from, to),
            Self::Path { path, .. } => path.length(),
        }
    }
}

/// The clamp → ease → target tail of the percent pipeline, shared by the
/// mapped, tween and speed strategies.
pub(crate) struct PercentPipe<T> {
    pub clamp: (f64, f64),
    pub ease: Ease,
    pub target: PercentTarget<T>,
    pub last_trace: Option<PercentTrace>,
}

impl<T> PercentPipe<T> {
    pub(crate) fn new(target: PercentTarget<T>, clamp: (f64, f64), ease: Ease) -> Self {
        Self {
            clamp,
            ease,
            target,
            last_trace: None,
        }
    }

    /// Run a raw percent through clamp and ease, then resolve the target
    /// value. In debug mode the three stages are recorded and a NaN or
    /// infinite clamp result is forced to zero with a logged error so the
    /// driver keeps running.
    pub(crate) fn resolve(&mut self, raw: f64, debug: bool) -> Option<T> {
        let mut clamped = raw.clamp(self.clamp.0, self.clamp.1);
        if debug && !clamped.is_finite() {
            log::error!("percent pipeline produced {clamped}; forcing to zero");
            clamped = 0.0;
        }
        let eased = self.ease.apply(clamped);
        if debug {
            self.last_trace = Some(PercentTrace {
                raw,
                clamped,
                eased,
            });
        }
        self.target.value_at(eased)
    }
}

/// Cycle bookkeeping shared by the duration-based tween and the
/// speed-based strategy. Progress is measured in cycles; a fractional
/// budget truncates the final cycle proportionally.
pub(crate) struct LoopState {
    mode: LoopMode,
    budget: f64,
    total: f64,
}

/// Boundary crossings observed during one advance, for callback dispatch.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct LoopCrossings {
    /// Completed cycles (Repeat mode).
    pub cycles: u32,
    /// Reached progress 1 traveling forward (PingPong).
    pub forward: u32,
    /// Reached progress 0 traveling backward (PingPong).
    pub backward: u32,
}

impl LoopState {
    pub(crate) fn new(mode: LoopMode, budget: f64) -> Self {
        let budget = match mode {
            LoopMode::Once => 1.0,
            _ if budget > 0.0 => budget,
            _ => {
                log::error!("invalid loop budget {budget}; using 1");
                1.0
            }
        };
        Self {
            mode,
            budget,
            total: 0.0,
        }
    }

    /// Advance by `delta` cycles; returns the cycle-local percent to feed
    /// the percent pipeline, the boundary crossings, and whether the budget
    /// is exhausted.
    pub(crate) fn advance(&mut self, delta: f64) -> (f64, LoopCrossings, bool) {
        let previous = self.total;
        self.total = (self.total + delta.max(0.0)).min(self.budget);
        let finished = self.total >= self.budget;

        let mut crossings = LoopCrossings::default();
        let first = previous.floor() as u64 + 1;
        // An instant jump to an unbounded budget has no countable crossings.
        let last = if self.total.is_finite() {
            self.total.floor() as u64
        } else {
            previous.floor() as u64
        };
        for k in first..=last {
            match self.mode {
                LoopMode::Once => {}
                LoopMode::Repeat => crossings.cycles += 1,
                LoopMode::PingPong => {
                    if k % 2 == 1 {
                        crossings.forward += 1;
                    } else {
                        crossings.backward += 1;
                    }
                }
            }
        }

        let pct = self.percent_at(self.total, finished);
        (pct, crossings, finished)
    }

    fn percent_at(&self, total: f64, finished: bool) -> f64 {
        match self.mode {
            LoopMode::Once => total.min(1.0),
            LoopMode::Repeat => {
                let frac = total.fract();
                if finished && frac == 0.0 && total > 0.0 {
                    1.0
                } else {
                    frac
                }
            }
            LoopMode::PingPong => {
                let cycle = total.floor();
                let frac = total - cycle;
                let forward = (cycle as u64) % 2 == 0;
                if forward {
                    frac
                } else {
                    1.0 - frac
                }
            }
        }
    }
}

/// The tagged transform strategy a driver runs each tick.
pub(crate) enum Transform<T> {
    /// Target := drive value, unchanged.
    Direct { source: Box<dyn FnMut() -> T> },
    /// Drive value → inverse-lerp percent → clamp/ease → target.
    Mapped {
        drive_pct: Box<dyn FnMut() -> f64>,
        pipe: PercentPipe<T>,
    },
    /// Internally integrated cycle progress over a fixed duration.
    Tween {
        cycle_duration: f64,
        loops: LoopState,
        pipe: PercentPipe<T>,
    },
    /// Per-second additive nudge, re-evaluated every tick, not accumulated.
    Rate {
        source: Box<dyn FnMut() -> T>,
        ops: Arc<Adapter<T>>,
    },
    /// Accumulated nudges, seeded from a start-value provider. `dup` is a
    /// clone captured at construction so the stored accumulator can be
    /// emitted as-is, independent of the adapter's lerp.
    Step {
        source: Box<dyn FnMut() -> T>,
        start: Box<dyn FnMut() -> T>,
        accumulator: Option<T>,
        dup: Box<dyn Fn(&T) -> T>,
        ops: Arc<Adapter<T>>,
    },
    /// Instantaneous scalar speed converted to distance along the target.
    Speed {
        speed: Box<dyn FnMut() -> f64>,
        loops: LoopState,
        pipe: PercentPipe<T>,
    },
}

impl<T: 'static> Transform<T> {
    /// Apply one tick. `dt` is the driver-scaled delta in seconds.
    pub(crate) fn apply(
        &mut self,
        dt: f64,
        debug: bool,
        callbacks: &mut DriverCallbacks,
        setter: &mut dyn FnMut(T),
    ) -> StepOutcome {
        match self {
            Self::Direct { source } => {
                setter(source());
                StepOutcome::Running
            }
            Self::Mapped { drive_pct, pipe } => match pipe.resolve(drive_pct(), debug) {
                Some(value) => {
                    setter(value);
                    StepOutcome::Running
                }
                None => StepOutcome::Failed,
            },
            Self::Tween {
                cycle_duration,
                loops,
                pipe,
            } => {
                let delta = if *cycle_duration > 0.0 {
                    dt / *cycle_duration
                } else {
                    // Zero-duration tween jumps straight to the end.
                    f64::INFINITY
                };
                Self::advance_loops(loops, delta, pipe, debug, callbacks, setter)
            }
            Self::Rate { source, ops } => {
                let value = source();
                let zero = (ops.zero)();
                setter((ops.lerp)(&zero, &value, dt));
                StepOutcome::Running
            }
            Self::Step {
                source,
                start,
                accumulator,
                dup,
                ops,
            } => {
                let acc = accumulator.get_or_insert_with(|| start());
                let value = source();
                let zero = (ops.zero)();
                let nudge = (ops.lerp)(&zero, &value, dt);
                *acc = (ops.add)(acc, &nudge);
                setter(dup(acc));
                StepOutcome::Running
            }
            Self::Speed { speed, loops, pipe } => {
                let span = pipe.target.span_length();
                if !(span > 0.0) {
                    log::error!("speed driver over a zero-length target; discarding");
                    return StepOutcome::Failed;
                }
                let delta = speed() * dt / span;
                Self::advance_loops(loops, delta, pipe, debug, callbacks, setter)
            }
        }
    }

    fn advance_loops(
        loops: &mut LoopState,
        delta: f64,
        pipe: &mut PercentPipe<T>,
        debug: bool,
        callbacks: &mut DriverCallbacks,
        setter: &mut dyn FnMut(T),
    ) -> StepOutcome {
        let (pct, crossings, finished) = loops.advance(delta);
        for _ in 0..crossings.cycles {
            if let Some(cb) = &mut callbacks.on_cycle {
                cb();
            }
        }
        for _ in 0..crossings.forward {
            if let Some(cb) = &mut callbacks.on_forward_complete {
                cb();
            }
        }
        for _ in 0..crossings.backward {
            if let Some(cb) = &mut callbacks.on_backward_complete {
                cb();
            }
        }
        match pipe.resolve(pct, debug) {
            Some(value) => {
                setter(value);
                if finished {
                    StepOutcome::Finished
                } else {
                    StepOutcome::Running
                }
            }
            None => StepOutcome::Failed,
        }
    }

    /// Latest debug trace, if the strategy has a percent pipeline and debug
    /// tracing ran.
    pub(crate) fn last_trace(&self) -> Option<PercentTrace> {
        match self {
            Self::Mapped { pipe, .. } | Self::Tween { pipe, .. } | Self::Speed { pipe, .. } => {
                pipe.last_trace
            }
            _ => None,
        }
    }
}
