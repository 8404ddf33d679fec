//! Event broadcasting for pool lifecycle observability.
//!
//! Provides [`PoolEvent`] variants emitted by the pool and an [`EventBus`]
//! backed by `tokio::sync::broadcast`. The bus is the injected logging sink:
//! the pool never formats or writes log output itself beyond `tracing`.

use std::time::Duration;

use tokio::sync::broadcast;

use crate::lease::ResourceId;

// ---------------------------------------------------------------------------
// PoolEvent
// ---------------------------------------------------------------------------

/// Events emitted during pool operations.
///
/// All variants carry the `pool` identifier (the resource type's id).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolEvent {
    /// The factory produced a new instance.
    ResourceCreated {
        /// The pool identifier.
        pool: String,
        /// The new instance.
        resource: ResourceId,
    },
    /// An instance was permanently removed.
    ResourceDestroyed {
        /// The pool identifier.
        pool: String,
        /// The removed instance.
        resource: ResourceId,
        /// Why it was removed.
        reason: DestroyReason,
    },
    /// A caller found the pool at capacity and started waiting.
    AcquireBlocked {
        /// The pool identifier.
        pool: String,
        /// Callers waiting, including this one.
        waiters: usize,
    },
    /// A caller gave up waiting.
    AcquireTimeout {
        /// The pool identifier.
        pool: String,
        /// How long the caller waited.
        waited: Duration,
    },
    /// An instance was handed out.
    Acquired {
        /// The pool identifier.
        pool: String,
        /// The leased instance.
        resource: ResourceId,
        /// Time from the acquire call to hand-out.
        wait: Duration,
    },
    /// An instance was checked back in.
    Released {
        /// The pool identifier.
        pool: String,
        /// The returned instance.
        resource: ResourceId,
        /// How long the lease was held.
        held: Duration,
    },
    /// The pool was shut down.
    PoolClosed {
        /// The pool identifier.
        pool: String,
        /// Leases still outstanding when shutdown returned.
        outstanding: usize,
    },
}

impl PoolEvent {
    /// Stable snake_case event name, used as the `event` field in logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::ResourceCreated { .. } => "resource_created",
            Self::ResourceDestroyed { .. } => "resource_destroyed",
            Self::AcquireBlocked { .. } => "acquire_blocked",
            Self::AcquireTimeout { .. } => "acquire_timeout",
            Self::Acquired { .. } => "acquired",
            Self::Released { .. } => "released",
            Self::PoolClosed { .. } => "pool_closed",
        }
    }

    /// The pool identifier carried by every variant.
    #[must_use]
    pub fn pool(&self) -> &str {
        match self {
            Self::ResourceCreated { pool, .. }
            | Self::ResourceDestroyed { pool, .. }
            | Self::AcquireBlocked { pool, .. }
            | Self::AcquireTimeout { pool, .. }
            | Self::Acquired { pool, .. }
            | Self::Released { pool, .. }
            | Self::PoolClosed { pool, .. } => pool,
        }
    }
}

// ---------------------------------------------------------------------------
// DestroyReason
// ---------------------------------------------------------------------------

/// Reason an instance was permanently removed from the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestroyReason {
    /// Hand-out validation found the instance dead.
    ValidationFailed,
    /// The instance exceeded its maximum lifetime.
    Expired,
    /// The instance was idle longer than the configured timeout.
    IdleTimeout,
    /// The caller discarded the lease as broken.
    Discarded,
    /// The pool is shutting down.
    Shutdown,
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Broadcast-based event bus for pool events.
///
/// Emission is fire-and-forget: if no subscribers are listening or the
/// channel is full, events are dropped (no backpressure on the pool).
pub struct EventBus {
    sender: broadcast::Sender<PoolEvent>,
}

impl EventBus {
    /// Create a new event bus with the given buffer size.
    ///
    /// Subscribers that fall more than `buffer_size` events behind receive
    /// a `Lagged` error and skip ahead.
    #[must_use]
    pub fn new(buffer_size: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer_size);
        Self { sender }
    }

    /// Emit an event to all current subscribers. Never blocks.
    pub fn emit(&self, event: PoolEvent) {
        // No receivers is not an error for the emitter.
        let _ = self.sender.send(event);
    }

    /// Subscribe to events emitted after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.sender.receiver_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_without_subscribers_does_not_panic() {
        let bus = EventBus::new(16);
        bus.emit(PoolEvent::AcquireBlocked {
            pool: "db".to_string(),
            waiters: 1,
        });
    }

    #[test]
    fn event_names_are_snake_case() {
        let closed = PoolEvent::PoolClosed {
            pool: "db".to_string(),
            outstanding: 0,
        };
        assert_eq!(closed.name(), "pool_closed");
        assert_eq!(closed.pool(), "db");

        let destroyed = PoolEvent::ResourceDestroyed {
            pool: "db".to_string(),
            resource: ResourceId::new(3),
            reason: DestroyReason::ValidationFailed,
        };
        assert_eq!(destroyed.name(), "resource_destroyed");
    }

    #[tokio::test]
    async fn multiple_subscribers_all_receive() {
        let bus = EventBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.emit(PoolEvent::AcquireTimeout {
            pool: "redis".to_string(),
            waited: Duration::from_millis(5),
        });

        let e1 = rx1.recv().await.unwrap();
        let e2 = rx2.recv().await.unwrap();

        assert!(matches!(e1, PoolEvent::AcquireTimeout { .. }));
        assert_eq!(e1, e2);
    }
}
