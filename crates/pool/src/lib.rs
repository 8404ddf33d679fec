//! # Reservoir Pool
//!
//! A bounded pool of expensive, reusable resources such as database
//! connections. Callers acquire an exclusive [`Lease`], use the instance,
//! and hand it back by dropping the lease or calling [`Lease::release`].
//!
//! The pool never holds more than `max_size` live instances, admits blocked
//! callers in arrival order, validates idle instances before handing them
//! out, and refuses foreign or already-returned lease keys.

pub mod error;
pub mod events;
pub mod lease;
pub mod pool;
pub mod resource;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{Error, HandleRejection, Result};
pub use events::{DestroyReason, EventBus, PoolEvent};
pub use lease::{Lease, LeaseKey, PoolId, ResourceId};
pub use pool::{MaintenanceHandle, Pool, PoolConfig, PoolStats, PoolStrategy, WarmUp};
pub use resource::{Config, Resource};
