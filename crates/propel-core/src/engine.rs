//! The engine: registries, the live-driver table and the frame pump.
//!
//! All scheduling state lives on an explicit [`Engine`] value; there are no
//! process-wide tables, so isolated instances can coexist (and be tested)
//! freely. The host calls [`Engine::pump`] once per logical frame; every
//! other mutation happens synchronously inside that call or inside the
//! registration methods, on the single thread the engine is contracted to
//! run on.

use crate::adapter::AdapterRegistry;
use crate::bind::OwnerKey;
use crate::config::EngineConfig;
use crate::driver::{AnyDriver, ConflictPolicy, Drive, DriverStatus, PercentTrace};
use crate::event::{EventManager, ManagedEvent};
use crate::ids::{DriverId, EventId, IdAllocator};
use crate::math::VecN;
use crate::path::{BezierPath, CubicSplinePath};
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

/// Owns the adapter registry, the event table and the live drivers, and
/// advances them once per [`pump`](Self::pump).
pub struct Engine {
    config: EngineConfig,
    adapters: AdapterRegistry,
    events: EventManager,
    ids: IdAllocator,
    /// Live drivers in id order; iteration order is stable across pumps.
    drivers: BTreeMap<DriverId, Box<dyn AnyDriver>>,
    by_name: HashMap<String, DriverId>,
    by_owner: HashMap<OwnerKey, Vec<DriverId>>,
    by_tag: HashMap<String, Vec<DriverId>>,
    pending: Vec<Box<dyn AnyDriver>>,
    last_timestamp: Option<Instant>,
    /// Accumulated scaled time in seconds; the clock events are swept against.
    clock: f64,
    on_pump: Option<Box<dyn FnMut(f64)>>,
}

impl Engine {
    /// An engine with default configuration and the primitive adapters
    /// (`f64`, `f32`, `VecN`) pre-registered.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let mut adapters = AdapterRegistry::new();
        adapters.register_primitives();
        Self {
            config: config.sanitized(),
            adapters,
            events: EventManager::new(),
            ids: IdAllocator::new(),
            drivers: BTreeMap::new(),
            by_name: HashMap::new(),
            by_owner: HashMap::new(),
            by_tag: HashMap::new(),
            pending: Vec::new(),
            last_timestamp: None,
            clock: 0.0,
            on_pump: None,
        }
    }

    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Replace the global timescale, sanitizing invalid values.
    pub fn set_time_scale(&mut self, scale: f64) {
        if scale.is_finite() && scale >= 0.0 {
            self.config.time_scale = scale;
        } else {
            log::error!("invalid global timescale {scale}; keeping current");
        }
    }

    #[inline]
    pub fn adapters(&self) -> &AdapterRegistry {
        &self.adapters
    }

    #[inline]
    pub fn adapters_mut(&mut self) -> &mut AdapterRegistry {
        &mut self.adapters
    }

    #[inline]
    pub fn events(&self) -> &EventManager {
        &self.events
    }

    #[inline]
    pub fn events_mut(&mut self) -> &mut EventManager {
        &mut self.events
    }

    /// Accumulated scaled engine time in seconds.
    #[inline]
    pub fn now(&self) -> f64 {
        self.clock
    }

    /// Install the global per-pump notification, fired with the scaled
    /// frame delta before events and driver updates.
    pub fn on_pump(&mut self, f: impl FnMut(f64) + 'static) {
        self.on_pump = Some(Box::new(f));
    }

    /// A Bezier path whose build timeout follows the engine configuration.
    pub fn bezier_path(&self, waypoints: Vec<VecN>) -> BezierPath {
        let mut path = BezierPath::new(waypoints);
        path.set_build_timeout(self.config.spline_build_timeout);
        path
    }

    /// A natural cubic spline path whose build timeout follows the engine
    /// configuration.
    pub fn cubic_path(&self, waypoints: Vec<VecN>) -> CubicSplinePath {
        let mut path = CubicSplinePath::new(waypoints);
        path.set_build_timeout(self.config.spline_build_timeout);
        path
    }

    /// Register a one-shot action firing `delay_secs` of engine time from
    /// now.
    pub fn after(&mut self, delay_secs: f64, action: impl FnMut() + 'static) -> EventId {
        self.events
            .register(ManagedEvent::timed(self.clock + delay_secs, action))
    }

    /// Start a driver: resolve it against the adapter registry, fire its
    /// start callback synchronously, and queue it for promotion at the end
    /// of the next pump. The returned id is valid immediately for control
    /// calls, but the driver only joins the live set (and conflict
    /// resolution only runs) at promotion.
    pub fn start<T: 'static>(&mut self, drive: Drive<T>) -> DriverId {
        let id = self.ids.alloc_driver();
        let mut driver = drive.into_driver(id, &self.adapters, self.config.debug_trace);
        driver.fire_start();
        self.pending.push(Box::new(driver));
        id
    }

    /// Advance one frame using the wall clock.
    pub fn pump(&mut self) {
        self.pump_at(Instant::now());
    }

    /// Advance one frame as if the current instant were `now`. Hosts with
    /// their own clock (and tests) drive the engine deterministically
    /// through this.
    pub fn pump_at(&mut self, now: Instant) {
        let raw = match self.last_timestamp {
            None => Duration::ZERO,
            Some(last) => match now.checked_duration_since(last) {
                Some(elapsed) => elapsed,
                None => {
                    log::error!("frame clock went backwards; clamping delta to zero");
                    Duration::ZERO
                }
            },
        };
        if self.last_timestamp.is_some() && self.config.max_update_frequency > 0.0 {
            let min_interval = 1.0 / self.config.max_update_frequency;
            if raw.as_secs_f64() < min_interval {
                // Frame skipped; the timestamp is left alone so the skipped
                // time is not lost.
                return;
            }
        }
        let dt = raw.as_secs_f64() * self.config.time_scale;
        self.clock += dt;

        if let Some(cb) = &mut self.on_pump {
            cb(dt);
        }
        self.events.sweep(self.clock);

        let ids: Vec<DriverId> = self.drivers.keys().copied().collect();
        let mut terminal = Vec::new();
        for id in ids {
            let Some(driver) = self.drivers.get_mut(&id) else {
                continue;
            };
            let status = driver.status();
            if status.is_terminal() || status.destroy_pending {
                terminal.push(id);
                continue;
            }
            driver.step(dt);
            let status = driver.status();
            if status.is_terminal() || status.destroy_pending {
                terminal.push(id);
            }
        }

        self.last_timestamp = Some(now);

        for id in terminal {
            self.dispose(id);
        }
        let pending = std::mem::take(&mut self.pending);
        for driver in pending {
            self.promote(driver);
        }
    }

    /// Declare that no time has passed, e.g. after the host resumes from a
    /// pause. The next pump sees a zero delta.
    pub fn reset_timestamp(&mut self) {
        self.last_timestamp = None;
    }

    /// Request a clean finish; the driver is removed (firing its finish
    /// callback) at the next dispose phase.
    pub fn stop(&mut self, id: DriverId) {
        match self.driver_mut(id) {
            Some(driver) => {
                if !driver.mark_finished() {
                    log::warn!("stop on already-terminal driver {id:?}; ignoring");
                }
            }
            None => log::warn!("stop on unknown driver {id:?}; ignoring"),
        }
    }

    /// Request cancellation; the driver is removed (firing its cancel
    /// callback) at the next dispose phase.
    pub fn cancel(&mut self, id: DriverId) {
        match self.driver_mut(id) {
            Some(driver) => {
                if !driver.mark_cancelled() {
                    log::warn!("cancel on already-terminal driver {id:?}; ignoring");
                }
            }
            None => log::warn!("cancel on unknown driver {id:?}; ignoring"),
        }
    }

    /// Request destruction: removal at the next dispose phase with no
    /// terminal callback at all.
    pub fn destroy(&mut self, id: DriverId) {
        match self.driver_mut(id) {
            Some(driver) => driver.mark_destroyed(),
            None => log::warn!("destroy on unknown driver {id:?}; ignoring"),
        }
    }

    /// Pause a driver, optionally auto-resuming after `for_secs` of wall
    /// time.
    pub fn pause(&mut self, id: DriverId, for_secs: Option<f64>) {
        match self.driver_mut(id) {
            Some(driver) => driver.pause(for_secs),
            None => log::warn!("pause on unknown driver {id:?}; ignoring"),
        }
    }

    pub fn resume(&mut self, id: DriverId) {
        match self.driver_mut(id) {
            Some(driver) => driver.resume(),
            None => log::warn!("resume on unknown driver {id:?}; ignoring"),
        }
    }

    /// Replace a driver's local timescale.
    pub fn set_driver_time_scale(&mut self, id: DriverId, scale: f64) {
        match self.driver_mut(id) {
            Some(driver) => driver.set_time_scale(scale),
            None => log::warn!("set_driver_time_scale on unknown driver {id:?}; ignoring"),
        }
    }

    /// Whether `id` is in the live set (queued drivers are not).
    #[inline]
    pub fn contains(&self, id: DriverId) -> bool {
        self.drivers.contains_key(&id)
    }

    /// Number of live drivers.
    #[inline]
    pub fn live_count(&self) -> usize {
        self.drivers.len()
    }

    pub fn find_by_name(&self, name: &str) -> Option<DriverId> {
        self.by_name.get(name).copied()
    }

    pub fn ids_by_tag(&self, tag: &str) -> Vec<DriverId> {
        self.by_tag.get(tag).cloned().unwrap_or_default()
    }

    /// Lifecycle flags of a live or queued driver.
    pub fn status(&self, id: DriverId) -> Option<DriverStatus> {
        self.drivers
            .get(&id)
            .map(|d| d.status())
            .or_else(|| self.pending.iter().find(|d| d.id() == id).map(|d| d.status()))
    }

    pub fn name_of(&self, id: DriverId) -> Option<&str> {
        self.drivers.get(&id).map(|d| d.name())
    }

    /// Latest debug percent trace of a live driver (requires
    /// `debug_trace` in the config and a percent-based strategy).
    pub fn trace(&self, id: DriverId) -> Option<PercentTrace> {
        self.drivers.get(&id).and_then(|d| d.last_trace())
    }

    fn driver_mut(&mut self, id: DriverId) -> Option<&mut Box<dyn AnyDriver>> {
        if self.drivers.contains_key(&id) {
            return self.drivers.get_mut(&id);
        }
        self.pending.iter_mut().find(|d| d.id() == id)
    }

    /// Remove a live driver: purge every index, fire its single terminal
    /// callback (none when destroy-pending) and drop events grouped under
    /// it.
    fn dispose(&mut self, id: DriverId) {
        let Some(mut driver) = self.drivers.remove(&id) else {
            return;
        };
        if self.by_name.get(driver.name()).copied() == Some(id) {
            self.by_name.remove(driver.name());
        }
        let owner = driver.domain().owner.clone();
        if !owner.is_none() {
            if let Some(ids) = self.by_owner.get_mut(&owner) {
                ids.retain(|&d| d != id);
                if ids.is_empty() {
                    self.by_owner.remove(&owner);
                }
            }
        }
        if !driver.tag().is_empty() {
            if let Some(ids) = self.by_tag.get_mut(driver.tag()) {
                ids.retain(|&d| d != id);
                if ids.is_empty() {
                    let tag = driver.tag().to_string();
                    self.by_tag.remove(&tag);
                }
            }
        }
        driver.fire_terminal();
        self.events.remove_for_target(id);
    }

    /// Conflict resolution, run at promotion time only. Never fails: an
    /// abandoned driver is simply never tracked, its flags left as
    /// constructed.
    fn promote(&mut self, mut driver: Box<dyn AnyDriver>) {
        let status = driver.status();
        if status.destroy_pending {
            // Misconfigured at build; already logged.
            return;
        }
        if status.is_terminal() {
            // Stopped or cancelled while still queued; it owes its terminal
            // callback but never joins the live set.
            driver.fire_terminal();
            return;
        }

        loop {
            if let Some(existing) = self.by_name.get(driver.name()).copied() {
                match driver.policy() {
                    ConflictPolicy::Ignore => {
                        let base = driver.name().to_string();
                        let mut n = 2;
                        let mut candidate = format!("{base}#{n}");
                        while self.by_name.contains_key(&candidate) {
                            n += 1;
                            candidate = format!("{base}#{n}");
                        }
                        log::debug!("renaming driver '{base}' to '{candidate}'");
                        driver.set_name(candidate);
                        continue;
                    }
                    ConflictPolicy::Replace => {
                        if let Some(old) = self.drivers.get_mut(&existing) {
                            old.mark_cancelled();
                        }
                        self.dispose(existing);
                        continue;
                    }
                    ConflictPolicy::Cancel => {
                        log::debug!(
                            "abandoning driver '{}': name already live",
                            driver.name()
                        );
                        return;
                    }
                }
            }

            if !driver.domain().owner.is_none() {
                let matching = self
                    .by_owner
                    .get(&driver.domain().owner)
                    .and_then(|ids| {
                        ids.iter().copied().find(|id| {
                            self.drivers
                                .get(id)
                                .is_some_and(|d| d.domain() == driver.domain())
                        })
                    });
                if let Some(existing) = matching {
                    match driver.policy() {
                        ConflictPolicy::Ignore => break,
                        ConflictPolicy::Replace => {
                            if let Some(old) = self.drivers.get_mut(&existing) {
                                old.mark_cancelled();
                            }
                            self.dispose(existing);
                            continue;
                        }
                        ConflictPolicy::Cancel => {
                            log::debug!(
                                "abandoning driver '{}': target {} already driven",
                                driver.name(),
                                driver.domain()
                            );
                            return;
                        }
                    }
                }
            }
            break;
        }

        let id = driver.id();
        self.by_name.insert(driver.name().to_string(), id);
        let owner = driver.domain().owner.clone();
        if !owner.is_none() {
            self.by_owner.entry(owner).or_default().push(id);
        }
        if !driver.tag().is_empty() {
            self.by_tag.entry(driver.tag().to_string()).or_default().push(id);
        }
        self.drivers.insert(id, driver);
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bind::TargetBinding;
    use std::cell::Cell;
    use std::rc::Rc;

    fn slot() -> (Rc<Cell<f64>>, TargetBinding<f64>) {
        let slot = Rc::new(Cell::new(0.0));
        let sink = Rc::clone(&slot);
        (slot, TargetBinding::detached(move |v| sink.set(v)))
    }

    #[test]
    fn queued_drivers_only_go_live_after_a_pump() {
        let mut engine = Engine::new();
        let (_, binding) = slot();
        let id = engine.start(Drive::rate(binding, || 1.0));
        assert!(!engine.contains(id));
        engine.pump_at(Instant::now());
        assert!(engine.contains(id));
    }

    #[test]
    fn start_fires_its_callback_synchronously() {
        let mut engine = Engine::new();
        let fired = Rc::new(Cell::new(false));
        let flag = Rc::clone(&fired);
        let (_, binding) = slot();
        engine.start(Drive::rate(binding, || 1.0).on_start(move || flag.set(true)));
        assert!(fired.get());
    }

    #[test]
    fn global_time_scale_stretches_deltas() {
        let mut engine = Engine::with_config(EngineConfig {
            time_scale: 2.0,
            ..Default::default()
        });
        let (slot, binding) = slot();
        engine.start(Drive::tween(binding, 0.0, 10.0, 1.0));
        let t0 = Instant::now();
        engine.pump_at(t0);
        engine.pump_at(t0 + Duration::from_millis(250));
        assert!((slot.get() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn frames_below_min_interval_are_skipped_without_losing_time() {
        let mut engine = Engine::with_config(EngineConfig {
            max_update_frequency: 10.0,
            ..Default::default()
        });
        let (slot, binding) = slot();
        engine.start(Drive::tween(binding, 0.0, 10.0, 1.0));
        let t0 = Instant::now();
        engine.pump_at(t0);
        // 50 ms < the 100 ms minimum interval: skipped entirely.
        engine.pump_at(t0 + Duration::from_millis(50));
        assert_eq!(slot.get(), 0.0);
        // The next frame measures from t0, not from the skipped frame.
        engine.pump_at(t0 + Duration::from_millis(100));
        assert!((slot.get() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn clock_regression_clamps_to_zero() {
        let mut engine = Engine::new();
        let (slot, binding) = slot();
        engine.start(Drive::tween(binding, 0.0, 10.0, 1.0));
        let t0 = Instant::now() + Duration::from_secs(1);
        engine.pump_at(t0);
        engine.pump_at(t0 - Duration::from_millis(500));
        assert_eq!(slot.get(), 0.0);
    }

    #[test]
    fn reset_timestamp_declares_no_time_passed() {
        let mut engine = Engine::new();
        let (slot, binding) = slot();
        engine.start(Drive::tween(binding, 0.0, 10.0, 1.0));
        let t0 = Instant::now();
        engine.pump_at(t0);
        engine.reset_timestamp();
        engine.pump_at(t0 + Duration::from_secs(5));
        assert_eq!(slot.get(), 0.0);
    }

    #[test]
    fn destroy_skips_terminal_callbacks() {
        let mut engine = Engine::new();
        let fired = Rc::new(Cell::new(false));
        let finish = Rc::clone(&fired);
        let cancel = Rc::clone(&fired);
        let (_, binding) = slot();
        let id = engine.start(
            Drive::rate(binding, || 1.0)
                .on_finish(move || finish.set(true))
                .on_cancel(move || cancel.set(true)),
        );
        let t0 = Instant::now();
        engine.pump_at(t0);
        engine.destroy(id);
        engine.pump_at(t0 + Duration::from_millis(16));
        assert!(!engine.contains(id));
        assert!(!fired.get());
    }

    #[test]
    fn pump_callback_sees_the_scaled_delta() {
        let mut engine = Engine::new();
        let seen = Rc::new(Cell::new(-1.0));
        let sink = Rc::clone(&seen);
        engine.on_pump(move |dt| sink.set(dt));
        let t0 = Instant::now();
        engine.pump_at(t0);
        engine.pump_at(t0 + Duration::from_millis(250));
        assert!((seen.get() - 0.25).abs() < 1e-9);
    }
}
