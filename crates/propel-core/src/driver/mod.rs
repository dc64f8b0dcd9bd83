//! Drivers: identity, timing, lifecycle flags and the start-request builder.
//!
//! A [`Drive`] describes a driver before it runs; the engine resolves it
//! against the adapter registry into a live `Driver` at `start()`. Adapter
//! lookups happen exactly once, at that resolution point.

mod transform;

pub use transform::PercentTrace;
pub(crate) use transform::{LoopState, PercentPipe, PercentTarget, StepOutcome, Transform};

use crate::adapter::AdapterRegistry;
use crate::bind::{ConflictDomain, TargetBinding};
use crate::ease::Ease;
use crate::ids::DriverId;
use crate::path::PathSample;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Wraparound policy for cycle-based strategies.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoopMode {
    /// Stop at progress 1.
    #[default]
    Once,
    /// Wrap modulo 1, firing a cycle-complete callback at each boundary.
    Repeat,
    /// Reverse direction at each boundary, firing direction-specific
    /// completion callbacks.
    PingPong,
}

/// What happens when a starting driver collides with a live one by name or
/// by conflict domain.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictPolicy {
    /// Rename on name collisions; run alongside on target collisions.
    #[default]
    Ignore,
    /// Cancel and dispose the existing driver.
    Replace,
    /// Abandon the new driver.
    Cancel,
}

/// Lifecycle flags, readable through engine queries.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverStatus {
    pub started: bool,
    pub paused: bool,
    pub cancelled: bool,
    pub finished: bool,
    pub destroy_pending: bool,
}

impl DriverStatus {
    /// Finished or cancelled; the dispose phase removes such drivers.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        self.finished || self.cancelled
    }
}

/// Lifecycle and per-tick hooks. All optional.
#[derive(Default)]
pub(crate) struct DriverCallbacks {
    pub on_start: Option<Box<dyn FnMut()>>,
    pub on_after_delay: Option<Box<dyn FnMut()>>,
    pub before_step: Option<Box<dyn FnMut()>>,
    pub after_step: Option<Box<dyn FnMut()>>,
    pub on_finish: Option<Box<dyn FnMut()>>,
    pub on_cancel: Option<Box<dyn FnMut()>>,
    pub on_cycle: Option<Box<dyn FnMut()>>,
    pub on_forward_complete: Option<Box<dyn FnMut()>>,
    pub on_backward_complete: Option<Box<dyn FnMut()>>,
}

/// Builder-time settings the transform strategies consume at resolution.
pub(crate) struct TransformCfg {
    pub clamp: (f64, f64),
    pub ease: Ease,
    pub loop_mode: LoopMode,
    pub loop_budget: f64,
}

type BuildFn<T> =
    Box<dyn FnOnce(&AdapterRegistry, TransformCfg) -> std::result::Result<Transform<T>, String>>;

/// A driver under construction. Consumed by [`Engine::start`].
///
/// [`Engine::start`]: crate::Engine::start
pub struct Drive<T: 'static> {
    binding: TargetBinding<T>,
    build: BuildFn<T>,
    name: Option<String>,
    tag: String,
    policy: ConflictPolicy,
    delay: f64,
    duration: f64,
    time_scale: Option<f64>,
    clamp: (f64, f64),
    ease: Ease,
    loop_mode: LoopMode,
    loop_budget: f64,
    callbacks: DriverCallbacks,
}

fn resolve_ops<T: 'static>(
    registry: &AdapterRegistry,
) -> std::result::Result<Arc<crate::adapter::Adapter<T>>, String> {
    registry.get::<T>().ok_or_else(|| {
        format!(
            "no adapter registered for {}",
            std::any::type_name::<T>()
        )
    })
}

fn resolve_coord<T: 'static>(
    registry: &AdapterRegistry,
) -> std::result::Result<Arc<crate::adapter::CoordinateAdapter<T>>, String> {
    registry.get_coordinate::<T>().ok_or_else(|| {
        format!(
            "no coordinate adapter registered for {}",
            std::any::type_name::<T>()
        )
    })
}

fn sanitize_duration(duration_secs: f64) -> f64 {
    if duration_secs.is_finite() && duration_secs >= 0.0 {
        duration_secs
    } else {
        log::error!("invalid cycle duration {duration_secs}; treating as instant");
        0.0
    }
}

impl<T: 'static> Drive<T> {
    fn with_build(binding: TargetBinding<T>, build: BuildFn<T>) -> Self {
        Self {
            binding,
            build,
            name: None,
            tag: String::new(),
            policy: ConflictPolicy::default(),
            delay: 0.0,
            duration: f64::INFINITY,
            time_scale: None,
            clamp: (f64::NEG_INFINITY, f64::INFINITY),
            ease: Ease::default(),
            loop_mode: LoopMode::Once,
            loop_budget: 1.0,
            callbacks: DriverCallbacks::default(),
        }
    }

    /// Identity transform: target := drive value each tick.
    pub fn direct(binding: TargetBinding<T>, mut source: impl FnMut() -> T + 'static) -> Self {
        Self::with_build(
            binding,
            Box::new(move |registry, _| {
                resolve_ops::<T>(registry)?;
                Ok(Transform::Direct {
                    source: Box::new(move || source()),
                })
            }),
        )
    }

    /// Duration-based tween from `from` to `to` over `duration_secs` per
    /// cycle.
    pub fn tween(binding: TargetBinding<T>, from: T, to: T, duration_secs: f64) -> Self {
        Self::with_build(
            binding,
            Box::new(move |registry, cfg| {
                let ops = resolve_ops::<T>(registry)?;
                Ok(Transform::Tween {
                    cycle_duration: sanitize_duration(duration_secs),
                    loops: LoopState::new(cfg.loop_mode, cfg.loop_budget),
                    pipe: PercentPipe::new(
                        PercentTarget::TwoPoint { from, to, ops },
                        cfg.clamp,
                        cfg.ease,
                    ),
                })
            }),
        )
    }

    /// Duration-based tween along `path`; needs a coordinate adapter for `T`.
    pub fn tween_path(
        binding: TargetBinding<T>,
        path: impl PathSample + 'static,
        duration_secs: f64,
    ) -> Self {
        Self::with_build(
            binding,
            Box::new(move |registry, cfg| {
                let coord = resolve_coord::<T>(registry)?;
                Ok(Transform::Tween {
                    cycle_duration: sanitize_duration(duration_secs),
                    loops: LoopState::new(cfg.loop_mode, cfg.loop_budget),
                    pipe: PercentPipe::new(
                        PercentTarget::Path {
                            path: Box::new(path),
                            coord,
                        },
                        cfg.clamp,
                        cfg.ease,
                    ),
                })
            }),
        )
    }

    /// Percent-mapped transform: the drive value's position between
    /// `map_from` and `map_to` selects the point between `from` and `to`.
    pub fn mapped<D: 'static>(
        binding: TargetBinding<T>,
        mut source: impl FnMut() -> D + 'static,
        map_from: D,
        map_to: D,
        from: T,
        to: T,
    ) -> Self {
        Self::with_build(
            binding,
            Box::new(move |registry, cfg| {
                let drive_ops = resolve_ops::<D>(registry)?;
                let ops = resolve_ops::<T>(registry)?;
                let inverse = Arc::clone(&drive_ops.inverse_lerp);
                Ok(Transform::Mapped {
                    drive_pct: Box::new(move || inverse(&map_from, &map_to, &source())),
                    pipe: PercentPipe::new(
                        PercentTarget::TwoPoint { from, to, ops },
                        cfg.clamp,
                        cfg.ease,
                    ),
                })
            }),
        )
    }

    /// Percent-mapped transform resolving along `path`.
    pub fn mapped_path<D: 'static>(
        binding: TargetBinding<T>,
        mut source: impl FnMut() -> D + 'static,
        map_from: D,
        map_to: D,
        path: impl PathSample + 'static,
    ) -> Self {
        Self::with_build(
            binding,
            Box::new(move |registry, cfg| {
                let drive_ops = resolve_ops::<D>(registry)?;
                let coord = resolve_coord::<T>(registry)?;
                let inverse = Arc::clone(&drive_ops.inverse_lerp);
                Ok(Transform::Mapped {
                    drive_pct: Box::new(move || inverse(&map_from, &map_to, &source())),
                    pipe: PercentPipe::new(
                        PercentTarget::Path {
                            path: Box::new(path),
                            coord,
                        },
                        cfg.clamp,
                        cfg.ease,
                    ),
                })
            }),
        )
    }

    /// Per-second additive nudge: target := lerp(zero, drive value, dt).
    pub fn rate(binding: TargetBinding<T>, mut source: impl FnMut() -> T + 'static) -> Self {
        Self::with_build(
            binding,
            Box::new(move |registry, _| {
                let ops = resolve_ops::<T>(registry)?;
                Ok(Transform::Rate {
                    source: Box::new(move || source()),
                    ops,
                })
            }),
        )
    }

    /// Accumulating nudge: target := acc := add(acc, lerp(zero, drive, dt)),
    /// seeded from `start` on the first tick. Needs `Clone` to emit the
    /// stored accumulator each tick.
    pub fn step(
        binding: TargetBinding<T>,
        mut source: impl FnMut() -> T + 'static,
        mut start: impl FnMut() -> T + 'static,
    ) -> Self
    where
        T: Clone,
    {
        Self::with_build(
            binding,
            Box::new(move |registry, _| {
                let ops = resolve_ops::<T>(registry)?;
                Ok(Transform::Step {
                    source: Box::new(move || source()),
                    start: Box::new(move || start()),
                    accumulator: None,
                    dup: Box::new(T::clone),
                    ops,
                })
            }),
        )
    }

    /// Distance-based traversal between `from` and `to` at the instantaneous
    /// scalar speed returned by `speed` (units per second).
    pub fn speed(
        binding: TargetBinding<T>,
        mut speed: impl FnMut() -> f64 + 'static,
        from: T,
        to: T,
    ) -> Self {
        Self::with_build(
            binding,
            Box::new(move |registry, cfg| {
                let ops = resolve_ops::<T>(registry)?;
                Ok(Transform::Speed {
                    speed: Box::new(move || speed()),
                    loops: LoopState::new(cfg.loop_mode, cfg.loop_budget),
                    pipe: PercentPipe::new(
                        PercentTarget::TwoPoint { from, to, ops },
                        cfg.clamp,
                        cfg.ease,
                    ),
                })
            }),
        )
    }

    /// Distance-based traversal along `path`.
    pub fn speed_path(
        binding: TargetBinding<T>,
        mut speed: impl FnMut() -> f64 + 'static,
        path: impl PathSample + 'static,
    ) -> Self {
        Self::with_build(
            binding,
            Box::new(move |registry, cfg| {
                let coord = resolve_coord::<T>(registry)?;
                Ok(Transform::Speed {
                    speed: Box::new(move || speed()),
                    loops: LoopState::new(cfg.loop_mode, cfg.loop_budget),
                    pipe: PercentPipe::new(
                        PercentTarget::Path {
                            path: Box::new(path),
                            coord,
                        },
                        cfg.clamp,
                        cfg.ease,
                    ),
                })
            }),
        )
    }

    /// Unique name; auto-generated when unset.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Non-unique grouping tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    pub fn with_policy(mut self, policy: ConflictPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Seconds to wait before the transform starts accruing time.
    pub fn with_delay(mut self, delay_secs: f64) -> Self {
        self.delay = delay_secs.max(0.0);
        self
    }

    /// Hard lifetime cap in seconds; the driver finishes when elapsed time
    /// reaches it. Open-ended by default.
    pub fn with_duration(mut self, duration_secs: f64) -> Self {
        self.duration = duration_secs;
        self
    }

    /// Local timescale multiplied into every frame delta.
    pub fn with_time_scale(mut self, scale: f64) -> Self {
        self.time_scale = Some(scale);
        self
    }

    /// Easing applied to the clamped percent.
    pub fn with_ease(mut self, ease: impl Into<Ease>) -> Self {
        self.ease = ease.into();
        self
    }

    /// Percent clamp range; unbounded by default.
    pub fn with_clamp(mut self, min: f64, max: f64) -> Self {
        self.clamp = (min, max);
        self
    }

    /// Repeat for `budget` cycles (fractional allowed, `f64::INFINITY` for
    /// endless).
    pub fn loop_repeat(mut self, budget: f64) -> Self {
        self.loop_mode = LoopMode::Repeat;
        self.loop_budget = budget;
        self
    }

    /// Ping-pong for `budget` cycles (fractional allowed).
    pub fn loop_pingpong(mut self, budget: f64) -> Self {
        self.loop_mode = LoopMode::PingPong;
        self.loop_budget = budget;
        self
    }

    pub fn on_start(mut self, f: impl FnMut() + 'static) -> Self {
        self.callbacks.on_start = Some(Box::new(f));
        self
    }

    pub fn on_after_delay(mut self, f: impl FnMut() + 'static) -> Self {
        self.callbacks.on_after_delay = Some(Box::new(f));
        self
    }

    pub fn before_step(mut self, f: impl FnMut() + 'static) -> Self {
        self.callbacks.before_step = Some(Box::new(f));
        self
    }

    pub fn after_step(mut self, f: impl FnMut() + 'static) -> Self {
        self.callbacks.after_step = Some(Box::new(f));
        self
    }

    pub fn on_finish(mut self, f: impl FnMut() + 'static) -> Self {
        self.callbacks.on_finish = Some(Box::new(f));
        self
    }

    pub fn on_cancel(mut self, f: impl FnMut() + 'static) -> Self {
        self.callbacks.on_cancel = Some(Box::new(f));
        self
    }

    pub fn on_cycle(mut self, f: impl FnMut() + 'static) -> Self {
        self.callbacks.on_cycle = Some(Box::new(f));
        self
    }

    pub fn on_forward_complete(mut self, f: impl FnMut() + 'static) -> Self {
        self.callbacks.on_forward_complete = Some(Box::new(f));
        self
    }

    pub fn on_backward_complete(mut self, f: impl FnMut() + 'static) -> Self {
        self.callbacks.on_backward_complete = Some(Box::new(f));
        self
    }

    /// Resolve against the registry into a runnable driver. A failed
    /// resolution (unregistered type, missing coordinate adapter) is logged
    /// and yields a destroy-pending driver that the scheduler discards
    /// without callbacks.
    pub(crate) fn into_driver(
        self,
        id: DriverId,
        registry: &AdapterRegistry,
        debug_trace: bool,
    ) -> Driver<T> {
        let cfg = TransformCfg {
            clamp: self.clamp,
            ease: self.ease,
            loop_mode: self.loop_mode,
            loop_budget: self.loop_budget,
        };
        let transform = match (self.build)(registry, cfg) {
            Ok(transform) => Some(transform),
            Err(reason) => {
                log::error!("driver cannot be built: {reason}; it will be discarded");
                None
            }
        };
        let name = self
            .name
            .unwrap_or_else(|| format!("driver-{}", uuid::Uuid::new_v4()));
        let status = DriverStatus {
            started: true,
            destroy_pending: transform.is_none() || self.binding.broken,
            ..DriverStatus::default()
        };
        Driver {
            id,
            name,
            tag: self.tag,
            domain: self.binding.domain,
            policy: self.policy,
            setter: self.binding.setter,
            status,
            elapsed: 0.0,
            delay_remaining: self.delay,
            duration: self.duration,
            pause_remaining: None,
            time_scale: self.time_scale.unwrap_or(1.0),
            time_scale_enabled: self.time_scale.is_some(),
            after_delay_fired: self.delay <= 0.0,
            debug_trace,
            callbacks: self.callbacks,
            transform,
        }
    }
}

/// A live driver: the resolved strategy plus timing and lifecycle state.
pub(crate) struct Driver<T: 'static> {
    id: DriverId,
    name: String,
    tag: String,
    domain: ConflictDomain,
    policy: ConflictPolicy,
    setter: Box<dyn FnMut(T)>,
    status: DriverStatus,
    elapsed: f64,
    delay_remaining: f64,
    duration: f64,
    pause_remaining: Option<f64>,
    time_scale: f64,
    time_scale_enabled: bool,
    after_delay_fired: bool,
    debug_trace: bool,
    callbacks: DriverCallbacks,
    transform: Option<Transform<T>>,
}

impl<T: 'static> Driver<T> {
    fn step_inner(&mut self, frame_dt: f64) {
        if self.status.paused {
            // A timed pause burns wall time without accruing elapsed time.
            if let Some(remaining) = &mut self.pause_remaining {
                *remaining -= frame_dt;
                if *remaining <= 0.0 {
                    self.pause_remaining = None;
                    self.status.paused = false;
                }
            }
            return;
        }

        let mut dt = if self.time_scale_enabled {
            frame_dt * self.time_scale
        } else {
            frame_dt
        };

        if self.delay_remaining > 0.0 {
            self.delay_remaining -= dt;
            if self.delay_remaining > 0.0 {
                return;
            }
            // Carry the part of the tick that spilled past the delay.
            dt = -self.delay_remaining;
            self.delay_remaining = 0.0;
        }
        if !self.after_delay_fired {
            self.after_delay_fired = true;
            if let Some(cb) = &mut self.callbacks.on_after_delay {
                cb();
            }
        }

        self.elapsed += dt;
        if self.elapsed >= self.duration {
            self.status.finished = true;
            return;
        }

        if let Some(cb) = &mut self.callbacks.before_step {
            cb();
        }
        let Some(transform) = &mut self.transform else {
            self.status.destroy_pending = true;
            return;
        };
        let outcome = transform.apply(
            dt,
            self.debug_trace,
            &mut self.callbacks,
            &mut *self.setter,
        );
        match outcome {
            StepOutcome::Running => {}
            StepOutcome::Finished => self.status.finished = true,
            StepOutcome::Failed => {
                self.status.destroy_pending = true;
                return;
            }
        }
        if let Some(cb) = &mut self.callbacks.after_step {
            cb();
        }
    }
}

/// Type-erased surface the scheduler holds drivers through.
pub(crate) trait AnyDriver {
    fn id(&self) -> DriverId;
    fn name(&self) -> &str;
    fn set_name(&mut self, name: String);
    fn tag(&self) -> &str;
    fn domain(&self) -> &ConflictDomain;
    fn policy(&self) -> ConflictPolicy;
    fn status(&self) -> DriverStatus;
    /// Run one tick with the globally-scaled frame delta.
    fn step(&mut self, frame_dt: f64);
    fn fire_start(&mut self);
    /// Fire the single terminal callback owed at dispose (none when
    /// destroy-pending).
    fn fire_terminal(&mut self);
    /// Returns false (already terminal) without changing state.
    fn mark_finished(&mut self) -> bool;
    /// Returns false (already terminal) without changing state.
    fn mark_cancelled(&mut self) -> bool;
    fn mark_destroyed(&mut self);
    /// Pause, optionally auto-resuming after `for_secs` of wall time.
    fn pause(&mut self, for_secs: Option<f64>);
    fn resume(&mut self);
    fn set_time_scale(&mut self, scale: f64);
    /// Latest debug percent trace, when tracing is on and the strategy has a
    /// percent pipeline.
    fn last_trace(&self) -> Option<PercentTrace>;
}

impl<T: 'static> AnyDriver for Driver<T> {
    fn id(&self) -> DriverId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: String) {
        self.name = name;
    }

    fn tag(&self) -> &str {
        &self.tag
    }

    fn domain(&self) -> &ConflictDomain {
        &self.domain
    }

    fn policy(&self) -> ConflictPolicy {
        self.policy
    }

    fn status(&self) -> DriverStatus {
        self.status
    }

    fn step(&mut self, frame_dt: f64) {
        self.step_inner(frame_dt);
    }

    fn fire_start(&mut self) {
        if let Some(cb) = &mut self.callbacks.on_start {
            cb();
        }
    }

    fn fire_terminal(&mut self) {
        if self.status.destroy_pending {
            return;
        }
        if self.status.cancelled {
            if let Some(cb) = &mut self.callbacks.on_cancel {
                cb();
            }
        } else if self.status.finished {
            if let Some(cb) = &mut self.callbacks.on_finish {
                cb();
            }
        }
    }

    fn mark_finished(&mut self) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status.finished = true;
        true
    }

    fn mark_cancelled(&mut self) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status.cancelled = true;
        true
    }

    fn mark_destroyed(&mut self) {
        self.status.destroy_pending = true;
    }

    fn pause(&mut self, for_secs: Option<f64>) {
        self.status.paused = true;
        self.pause_remaining = for_secs;
    }

    fn resume(&mut self) {
        self.status.paused = false;
        self.pause_remaining = None;
    }

    fn set_time_scale(&mut self, scale: f64) {
        if scale.is_finite() && scale >= 0.0 {
            self.time_scale = scale;
            self.time_scale_enabled = true;
        } else {
            log::error!("invalid driver timescale {scale}; keeping current");
        }
    }

    fn last_trace(&self) -> Option<PercentTrace> {
        self.transform.as_ref().and_then(Transform::last_trace)
    }
}
