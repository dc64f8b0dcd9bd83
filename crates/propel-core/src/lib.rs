//! Tick-driven property driving: tweens, mapped inputs, rates and
//! path-following for arbitrary value types.
//!
//! The core pieces:
//! - [`AdapterRegistry`]: per-type numeric operations that make a type
//!   drivable, plus optional coordinate decomposition for path use.
//! - [`Drive`] / [`Engine::start`]: describe a driver (direct, mapped,
//!   tween, rate, step, speed), then hand it to the engine.
//! - [`Engine`]: the scheduler; owns the live-driver table, conflict
//!   resolution and the event table, and advances everything once per
//!   [`Engine::pump`].
//! - [`path`]: linear, cubic Bezier and natural cubic spline paths with
//!   arc-length-parameterized sampling.
//!
//! Everything runs synchronously on the host's frame loop; there is no
//! internal concurrency. Construct one [`Engine`] per independent world.
//!
//! ```
//! use propel_core::{Drive, Engine, TargetBinding};
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use std::time::{Duration, Instant};
//!
//! let mut engine = Engine::new();
//! let value = Rc::new(Cell::new(0.0f64));
//! let sink = Rc::clone(&value);
//! engine.start(Drive::tween(
//!     TargetBinding::detached(move |v| sink.set(v)),
//!     0.0,
//!     10.0,
//!     1.0,
//! ));
//! let t0 = Instant::now();
//! engine.pump_at(t0);
//! engine.pump_at(t0 + Duration::from_millis(500));
//! assert!((value.get() - 5.0).abs() < 1e-9);
//! ```

pub mod adapter;
pub mod bind;
pub mod config;
pub mod driver;
pub mod ease;
mod engine;
pub mod error;
pub mod event;
pub mod ids;
pub mod math;
pub mod path;

pub use adapter::{Adapter, AdapterRegistry, CoordinateAdapter};
pub use bind::{BindingError, ConflictDomain, OwnerKey, TargetBinding};
pub use config::EngineConfig;
pub use driver::{ConflictPolicy, Drive, DriverStatus, LoopMode, PercentTrace};
pub use ease::{Ease, EaseKind};
pub use engine::Engine;
pub use error::{DriveError, Result};
pub use event::{EventManager, FireCount, ManagedEvent};
pub use ids::{DriverId, EventId};
pub use math::VecN;
pub use path::{BezierControl, BezierPath, CubicSplinePath, Path, PathSample, SplineMode};
