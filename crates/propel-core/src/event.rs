//! Priority-ordered table of condition→action bindings.
//!
//! The manager is independent of any single driver: it backs user-visible
//! timed/conditional callbacks and the timed sub-events drivers register
//! internally. Conditions are re-evaluated every sweep (level-triggered);
//! an event whose condition stays true keeps firing until its fire count is
//! exhausted. A fire count of 1 therefore behaves edge-triggered, which is
//! exactly what internal one-shot events rely on.

use crate::error::{DriveError, Result};
use crate::ids::{DriverId, EventId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Condition predicate; receives the engine's accumulated time in seconds.
pub type Condition = Box<dyn FnMut(f64) -> bool>;

/// Action fired when the condition holds.
pub type Action = Box<dyn FnMut()>;

/// How many more times an event may fire.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FireCount {
    Infinite,
    Remaining(u32),
}

impl FireCount {
    #[inline]
    fn is_exhausted(self) -> bool {
        matches!(self, Self::Remaining(0))
    }
}

/// A condition→action binding awaiting registration.
pub struct ManagedEvent {
    pub(crate) target: Option<DriverId>,
    pub(crate) condition: Condition,
    pub(crate) action: Action,
    pub(crate) priority: u32,
    pub(crate) remaining: FireCount,
    pub(crate) enabled: bool,
}

impl ManagedEvent {
    /// A new always-enabled event with priority 0 and infinite fire count.
    pub fn new(condition: impl FnMut(f64) -> bool + 'static, action: impl FnMut() + 'static) -> Self {
        Self {
            target: None,
            condition: Box::new(condition),
            action: Box::new(action),
            priority: 0,
            remaining: FireCount::Infinite,
            enabled: true,
        }
    }

    /// A one-shot event firing once `now` reaches `at` seconds.
    pub fn timed(at: f64, action: impl FnMut() + 'static) -> Self {
        Self::new(move |now| now >= at, action).with_fire_count(FireCount::Remaining(1))
    }

    /// A one-shot conditional event.
    pub fn once(
        condition: impl FnMut(f64) -> bool + 'static,
        action: impl FnMut() + 'static,
    ) -> Self {
        Self::new(condition, action).with_fire_count(FireCount::Remaining(1))
    }

    /// Group this event under a driver so it is dropped when that driver is
    /// disposed.
    #[inline]
    pub fn with_target(mut self, target: DriverId) -> Self {
        self.target = Some(target);
        self
    }

    /// Set the priority; lower priorities fire first.
    #[inline]
    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    /// Set the remaining fire count.
    #[inline]
    pub fn with_fire_count(mut self, remaining: FireCount) -> Self {
        self.remaining = remaining;
        self
    }

    /// Register the event disabled.
    #[inline]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

impl fmt::Debug for ManagedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedEvent")
            .field("target", &self.target)
            .field("priority", &self.priority)
            .field("remaining", &self.remaining)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

/// Table of managed events with a by-priority index (ascending) and a
/// by-target index for bulk removal.
#[derive(Default)]
pub struct EventManager {
    table: HashMap<EventId, ManagedEvent>,
    /// Priority buckets; ids within a bucket keep registration order.
    by_priority: BTreeMap<u32, Vec<EventId>>,
    by_target: HashMap<DriverId, Vec<EventId>>,
    next_id: u64,
}

impl EventManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered events.
    #[inline]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    #[inline]
    pub fn contains(&self, id: EventId) -> bool {
        self.table.contains_key(&id)
    }

    /// Register an event under a freshly minted id.
    pub fn register(&mut self, event: ManagedEvent) -> EventId {
        let id = EventId(self.next_id);
        self.next_id += 1;
        self.insert(id, event);
        id
    }

    /// Register an event under a caller-supplied id. Fails (logged, no-op)
    /// if the id is already present.
    pub fn register_with_id(&mut self, id: EventId, event: ManagedEvent) -> Option<EventId> {
        if self.table.contains_key(&id) {
            log::error!("event id {id:?} already registered; ignoring registration");
            return None;
        }
        self.next_id = self.next_id.max(id.0 + 1);
        self.insert(id, event);
        Some(id)
    }

    fn insert(&mut self, id: EventId, event: ManagedEvent) {
        self.by_priority.entry(event.priority).or_default().push(id);
        if let Some(target) = event.target {
            self.by_target.entry(target).or_default().push(id);
        }
        self.table.insert(id, event);
    }

    /// Remove an event. Removing an unknown id is a lifecycle bug in the
    /// caller and fails hard.
    pub fn remove(&mut self, id: EventId) -> Result<()> {
        if !self.table.contains_key(&id) {
            return Err(DriveError::UnknownEvent(id));
        }
        self.purge(id);
        Ok(())
    }

    /// Drop every event grouped under `target`. Used when a driver is
    /// disposed; absence of events is not an error.
    pub fn remove_for_target(&mut self, target: DriverId) {
        if let Some(ids) = self.by_target.remove(&target) {
            for id in ids {
                if let Some(event) = self.table.remove(&id) {
                    Self::unindex_priority(&mut self.by_priority, event.priority, id);
                }
            }
        }
    }

    /// Move an event to a new priority; it joins the end of the new bucket.
    pub fn set_priority(&mut self, id: EventId, priority: u32) -> Result<()> {
        let old = self
            .table
            .get(&id)
            .map(|e| e.priority)
            .ok_or(DriveError::UnknownEvent(id))?;
        if old == priority {
            return Ok(());
        }
        Self::unindex_priority(&mut self.by_priority, old, id);
        self.by_priority.entry(priority).or_default().push(id);
        if let Some(event) = self.table.get_mut(&id) {
            event.priority = priority;
        }
        Ok(())
    }

    /// Change the remaining fire count.
    pub fn set_fire_count(&mut self, id: EventId, remaining: FireCount) -> Result<()> {
        let event = self.table.get_mut(&id).ok_or(DriveError::UnknownEvent(id))?;
        event.remaining = remaining;
        Ok(())
    }

    /// Enable or disable an event without removing it.
    pub fn set_enabled(&mut self, id: EventId, enabled: bool) -> Result<()> {
        let event = self.table.get_mut(&id).ok_or(DriveError::UnknownEvent(id))?;
        event.enabled = enabled;
        Ok(())
    }

    /// Evaluate every enabled event in ascending priority order (registration
    /// order within a bucket). Events whose condition holds with an exhausted
    /// fire count are marked and dropped after the sweep instead of firing.
    pub fn sweep(&mut self, now: f64) {
        let order: Vec<EventId> = self
            .by_priority
            .values()
            .flat_map(|ids| ids.iter().copied())
            .collect();

        let mut exhausted: Vec<EventId> = Vec::new();
        for id in order {
            let Some(event) = self.table.get_mut(&id) else {
                continue;
            };
            if !event.enabled {
                continue;
            }
            if !(event.condition)(now) {
                continue;
            }
            if event.remaining.is_exhausted() {
                exhausted.push(id);
                continue;
            }
            (event.action)();
            if let FireCount::Remaining(n) = event.remaining {
                event.remaining = FireCount::Remaining(n - 1);
                if event.remaining.is_exhausted() {
                    exhausted.push(id);
                }
            }
        }

        for id in exhausted {
            self.purge(id);
        }
    }

    fn purge(&mut self, id: EventId) {
        if let Some(event) = self.table.remove(&id) {
            Self::unindex_priority(&mut self.by_priority, event.priority, id);
            if let Some(target) = event.target {
                if let Some(ids) = self.by_target.get_mut(&target) {
                    ids.retain(|&e| e != id);
                    if ids.is_empty() {
                        self.by_target.remove(&target);
                    }
                }
            }
        }
    }

    fn unindex_priority(buckets: &mut BTreeMap<u32, Vec<EventId>>, priority: u32, id: EventId) {
        if let Some(ids) = buckets.get_mut(&priority) {
            ids.retain(|&e| e != id);
            if ids.is_empty() {
                buckets.remove(&priority);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn recorder() -> (Rc<RefCell<Vec<&'static str>>>, impl Fn(&'static str) -> Action) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let make = {
            let log = Rc::clone(&log);
            move |label: &'static str| -> Action {
                let log = Rc::clone(&log);
                Box::new(move || log.borrow_mut().push(label))
            }
        };
        (log, make)
    }

    #[test]
    fn fires_in_ascending_priority_order() {
        let (log, make) = recorder();
        let mut events = EventManager::new();
        events.register(ManagedEvent {
            target: None,
            condition: Box::new(|_| true),
            action: make("high"),
            priority: 5,
            remaining: FireCount::Infinite,
            enabled: true,
        });
        events.register(ManagedEvent {
            target: None,
            condition: Box::new(|_| true),
            action: make("low"),
            priority: 1,
            remaining: FireCount::Infinite,
            enabled: true,
        });
        events.sweep(0.0);
        assert_eq!(*log.borrow(), vec!["low", "high"]);
    }

    #[test]
    fn registration_order_breaks_priority_ties() {
        let (log, make) = recorder();
        let mut events = EventManager::new();
        for label in ["first", "second", "third"] {
            events.register(ManagedEvent {
                target: None,
                condition: Box::new(|_| true),
                action: make(label),
                priority: 3,
                remaining: FireCount::Infinite,
                enabled: true,
            });
        }
        events.sweep(0.0);
        assert_eq!(*log.borrow(), vec!["first", "second", "third"]);
    }

    #[test]
    fn fire_count_exhaustion_removes_event() {
        let (log, make) = recorder();
        let mut events = EventManager::new();
        let id = events.register(ManagedEvent {
            target: None,
            condition: Box::new(|_| true),
            action: make("tick"),
            priority: 0,
            remaining: FireCount::Remaining(2),
            enabled: true,
        });
        events.sweep(0.0);
        events.sweep(0.0);
        assert_eq!(log.borrow().len(), 2);
        assert!(!events.contains(id));
        events.sweep(0.0);
        assert_eq!(log.borrow().len(), 2);
    }

    #[test]
    fn level_triggered_reevaluation() {
        let (log, make) = recorder();
        let mut events = EventManager::new();
        events.register(ManagedEvent {
            target: None,
            condition: Box::new(|now| now >= 1.0),
            action: make("late"),
            priority: 0,
            remaining: FireCount::Infinite,
            enabled: true,
        });
        events.sweep(0.5);
        assert!(log.borrow().is_empty());
        events.sweep(1.0);
        events.sweep(2.0);
        assert_eq!(log.borrow().len(), 2);
    }

    #[test]
    fn disabled_events_are_skipped_until_reenabled() {
        let (log, make) = recorder();
        let mut events = EventManager::new();
        let id = events.register(ManagedEvent {
            target: None,
            condition: Box::new(|_| true),
            action: make("tick"),
            priority: 0,
            remaining: FireCount::Infinite,
            enabled: true,
        });

        events.set_enabled(id, false).unwrap();
        events.sweep(0.0);
        assert!(log.borrow().is_empty());
        assert!(events.contains(id));

        events.set_enabled(id, true).unwrap();
        events.sweep(0.0);
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn fire_count_reset_extends_firing() {
        let (log, make) = recorder();
        let mut events = EventManager::new();
        let id = events.register(ManagedEvent {
            target: None,
            condition: Box::new(|_| true),
            action: make("tick"),
            priority: 0,
            remaining: FireCount::Remaining(1),
            enabled: true,
        });

        events.set_fire_count(id, FireCount::Remaining(3)).unwrap();
        for _ in 0..5 {
            events.sweep(0.0);
        }
        assert_eq!(log.borrow().len(), 3);
        assert!(!events.contains(id));
    }

    #[test]
    fn unknown_id_is_a_hard_failure() {
        let mut events = EventManager::new();
        let missing = EventId(99);
        assert_eq!(events.remove(missing), Err(DriveError::UnknownEvent(missing)));
        assert_eq!(
            events.set_priority(missing, 1),
            Err(DriveError::UnknownEvent(missing))
        );
        assert_eq!(
            events.set_fire_count(missing, FireCount::Infinite),
            Err(DriveError::UnknownEvent(missing))
        );
        assert_eq!(
            events.set_enabled(missing, true),
            Err(DriveError::UnknownEvent(missing))
        );
    }

    #[test]
    fn duplicate_registration_is_a_logged_noop() {
        let mut events = EventManager::new();
        let id = events.register(ManagedEvent::timed(0.0, || {}));
        assert!(events
            .register_with_id(id, ManagedEvent::timed(0.0, || {}))
            .is_none());
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn remove_for_target_drops_grouped_events() {
        let mut events = EventManager::new();
        let driver = DriverId(7);
        events.register(ManagedEvent::timed(10.0, || {}).with_target(driver));
        events.register(ManagedEvent::timed(10.0, || {}).with_target(driver));
        let kept = events.register(ManagedEvent::timed(10.0, || {}));
        events.remove_for_target(driver);
        assert_eq!(events.len(), 1);
        assert!(events.contains(kept));
    }

    #[test]
    fn priority_change_moves_to_end_of_new_bucket() {
        let (log, make) = recorder();
        let mut events = EventManager::new();
        let a = events.register(ManagedEvent {
            target: None,
            condition: Box::new(|_| true),
            action: make("a"),
            priority: 2,
            remaining: FireCount::Infinite,
            enabled: true,
        });
        events.register(ManagedEvent {
            target: None,
            condition: Box::new(|_| true),
            action: make("b"),
            priority: 5,
            remaining: FireCount::Infinite,
            enabled: true,
        });
        events.set_priority(a, 5).unwrap();
        events.sweep(0.0);
        assert_eq!(*log.borrow(), vec!["b", "a"]);
    }
}
