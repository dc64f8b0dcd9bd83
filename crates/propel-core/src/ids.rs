//! Identifiers and simple allocators for core entities.

use serde::{Deserialize, Serialize};

/// Identity of a driver within one engine. Opaque; only the engine mints these.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct DriverId(pub u64);

/// Identity of a managed event within one engine's event table.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct EventId(pub u64);

/// Monotonic allocator for DriverId. Ids are never reused within one
/// engine lifetime. Event ids are minted by the event table itself.
#[derive(Default, Debug)]
pub struct IdAllocator {
    next_driver: u64,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn alloc_driver(&mut self) -> DriverId {
        let id = DriverId(self.next_driver);
        self.next_driver = self.next_driver.wrapping_add(1);
        id
    }
}
