//! Resource pool: a generic pool driven by the `Resource` trait.
//!
//! `Pool<R>` calls `R::create`, `R::is_valid` and `R::cleanup` directly.
//! Capacity and the wait queue are a fair `tokio` semaphore: a blocked
//! caller is admitted strictly in arrival order. All bookkeeping (idle set,
//! checked-out set, pending slots) lives behind one `parking_lot` mutex that
//! is never held across resource I/O.

pub mod config;

use std::collections::hash_map;
use std::collections::{HashMap, VecDeque};
use std::future::poll_fn;
use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{Notify, Semaphore, SemaphorePermit, TryAcquireError};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::{BoxError, Error, HandleRejection, Result};
use crate::events::{DestroyReason, EventBus, PoolEvent};
use crate::lease::{Lease, LeaseKey, PoolId, ResourceId};
use crate::resource::{Config, Resource};

pub use config::{PoolConfig, PoolStrategy, WarmUp};

// ---------------------------------------------------------------------------
// Pool internals
// ---------------------------------------------------------------------------

/// An idle instance waiting in the pool.
struct IdleEntry<T> {
    id: ResourceId,
    instance: T,
    created_at: Instant,
    last_used: Instant,
}

impl<T> IdleEntry<T> {
    fn expiry(&self, config: &PoolConfig, now: Instant) -> Option<DestroyReason> {
        if now.duration_since(self.created_at) > config.max_lifetime {
            Some(DestroyReason::Expired)
        } else if now.duration_since(self.last_used) > config.idle_timeout {
            Some(DestroyReason::IdleTimeout)
        } else {
            None
        }
    }
}

/// Bookkeeping for one checked-out instance.
struct Checkout {
    lease: u64,
    created_at: Instant,
    acquired_at: Instant,
}

/// Pool statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Instances available for checkout.
    pub idle: usize,
    /// Instances currently leased.
    pub in_use: usize,
    /// Instances being created, validated or destroyed outside the lock.
    pub pending: usize,
    /// Callers queued on the semaphore for capacity.
    pub waiters: usize,
    /// Total instances ever created.
    pub created: u64,
    /// Total instances ever destroyed.
    pub destroyed: u64,
    /// Total successful acquisitions.
    pub total_acquisitions: u64,
    /// Total check-ins.
    pub total_releases: u64,
    /// Acquires that gave up with `PoolExhausted`.
    pub timeouts: u64,
    /// Idle or fresh instances that failed hand-out validation.
    pub validation_failures: u64,
}

impl PoolStats {
    /// Live instances counted against `max_size`.
    #[must_use]
    pub fn live(&self) -> usize {
        self.idle + self.in_use + self.pending
    }
}

#[derive(Debug, Default)]
struct Counters {
    created: u64,
    destroyed: u64,
    total_acquisitions: u64,
    total_releases: u64,
    timeouts: u64,
    validation_failures: u64,
}

/// Mutable pool state, guarded by a single mutex.
struct State<T> {
    idle: VecDeque<IdleEntry<T>>,
    in_use: HashMap<ResourceId, Checkout>,
    pending: usize,
    closed: bool,
    next_lease: u64,
    counters: Counters,
}

impl<T> State<T> {
    fn live(&self) -> usize {
        self.idle.len() + self.in_use.len() + self.pending
    }

    fn pop_idle(&mut self, strategy: PoolStrategy) -> Option<IdleEntry<T>> {
        match strategy {
            PoolStrategy::Fifo => self.idle.pop_front(),
            PoolStrategy::Lifo => self.idle.pop_back(),
        }
    }
}

/// A capacity slot held while an instance is outside both the idle and the
/// checked-out set. Releases its `pending` count on drop, so a cancelled
/// acquire cannot leak capacity.
struct Reservation<'a, T> {
    state: &'a Mutex<State<T>>,
    armed: bool,
}

impl<'a, T> Reservation<'a, T> {
    /// Caller must have incremented `pending` under the lock.
    fn new(state: &'a Mutex<State<T>>) -> Self {
        Self { state, armed: true }
    }

    /// Caller decremented `pending` itself.
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl<T> Drop for Reservation<'_, T> {
    fn drop(&mut self) {
        if self.armed {
            let mut state = self.state.lock();
            state.pending = state.pending.saturating_sub(1);
        }
    }
}

/// Counts a caller in the wait queue for as long as it is alive.
struct Waiting<'a>(&'a AtomicUsize);

impl<'a> Waiting<'a> {
    fn enter(counter: &'a AtomicUsize) -> (Self, usize) {
        let waiters = counter.fetch_add(1, Ordering::SeqCst) + 1;
        (Self(counter), waiters)
    }
}

impl Drop for Waiting<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// The pending slot an acquire works in, and the instance it is validating.
///
/// If the acquire is dropped while the slot still holds an instance, the
/// instance goes back to the idle set (or is destroyed once the pool has
/// closed) instead of vanishing with the future.
struct InFlight<'a, R: Resource> {
    pool: &'a Pool<R>,
    entry: Option<IdleEntry<R::Instance>>,
    reservation: Reservation<'a, R::Instance>,
}

impl<R: Resource> Drop for InFlight<'_, R> {
    fn drop(&mut self) {
        let Some(entry) = self.entry.take() else {
            return;
        };
        let pool = self.pool;
        let mut state = pool.inner.state.lock();
        state.pending = state.pending.saturating_sub(1);
        self.reservation.disarm();
        if state.closed {
            drop(state);
            pool.destroy_detached(entry.id, entry.instance, DestroyReason::Shutdown);
            return;
        }
        let id = entry.id;
        match pool.inner.pool_config.strategy {
            PoolStrategy::Fifo => state.idle.push_front(entry),
            PoolStrategy::Lifo => state.idle.push_back(entry),
        }
        drop(state);
        tracing::debug!(pool = %pool.name(), resource = %id, "Acquire cancelled, resource returned to idle");
    }
}

/// Inner shared state for the pool.
struct PoolInner<R: Resource> {
    id: PoolId,
    resource: Arc<R>,
    config: R::Config,
    pool_config: PoolConfig,
    state: Mutex<State<R::Instance>>,
    /// Fair semaphore: one permit per unit of capacity not held by a lease
    /// or a pending slot. Its queue is the pool's FIFO wait queue.
    semaphore: Semaphore,
    waiters: AtomicUsize,
    next_resource: AtomicU64,
    /// Signalled when the last outstanding lease returns after shutdown.
    drained: Notify,
    events: Option<Arc<EventBus>>,
}

// ---------------------------------------------------------------------------
// Pool<R>
// ---------------------------------------------------------------------------

/// Generic resource pool.
///
/// Manages a bounded set of `R::Instance` objects. Cloning is cheap and
/// every clone refers to the same pool; construct one per process and pass
/// it to whoever needs resources.
pub struct Pool<R: Resource> {
    inner: Arc<PoolInner<R>>,
}

impl<R: Resource> Clone for Pool<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: Resource> std::fmt::Debug for Pool<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("id", &self.inner.id)
            .field("resource_id", &self.inner.resource.id())
            .field("stats", &self.stats())
            .finish()
    }
}

impl<R: Resource> Pool<R> {
    /// Create a lazily populated pool.
    ///
    /// # Errors
    /// Returns `Configuration` if `pool_config` or `config` is invalid.
    pub fn new(resource: R, config: R::Config, pool_config: PoolConfig) -> Result<Self> {
        Self::build(resource, config, pool_config, None)
    }

    /// Create a lazily populated pool that reports to `events`.
    pub fn with_event_bus(
        resource: R,
        config: R::Config,
        pool_config: PoolConfig,
        events: Arc<EventBus>,
    ) -> Result<Self> {
        Self::build(resource, config, pool_config, Some(events))
    }

    /// Create a pool and apply its [`WarmUp`] policy.
    ///
    /// With `WarmUp::Eager`, `min_size` instances are created before this
    /// returns and a factory failure is returned as `CreationFailed`.
    pub async fn start(
        resource: R,
        config: R::Config,
        pool_config: PoolConfig,
        events: Option<Arc<EventBus>>,
    ) -> Result<Self> {
        let pool = Self::build(resource, config, pool_config, events)?;
        if pool.inner.pool_config.warm_up == WarmUp::Eager {
            let created = pool.fill().await?;
            tracing::debug!(pool = %pool.name(), created, "Pool warmed up");
        }
        Ok(pool)
    }

    fn build(
        resource: R,
        config: R::Config,
        pool_config: PoolConfig,
        events: Option<Arc<EventBus>>,
    ) -> Result<Self> {
        pool_config.validate()?;
        config.validate()?;
        let max = pool_config.max_size;
        Ok(Self {
            inner: Arc::new(PoolInner {
                id: PoolId::new(),
                resource: Arc::new(resource),
                config,
                pool_config,
                state: Mutex::new(State {
                    idle: VecDeque::with_capacity(max),
                    in_use: HashMap::with_capacity(max),
                    pending: 0,
                    closed: false,
                    next_lease: 1,
                    counters: Counters::default(),
                }),
                semaphore: Semaphore::new(max),
                waiters: AtomicUsize::new(0),
                next_resource: AtomicU64::new(1),
                drained: Notify::new(),
                events,
            }),
        })
    }

    /// Identity of this pool instance; carried by every lease key it issues.
    #[must_use]
    pub fn id(&self) -> PoolId {
        self.inner.id
    }

    /// The resource type's id, used as the pool name in errors and events.
    #[must_use]
    pub fn name(&self) -> &str {
        self.inner.resource.id()
    }

    /// The pool settings.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.inner.pool_config
    }

    /// Whether `shutdown` has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// Get current pool statistics.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let state = self.inner.state.lock();
        PoolStats {
            idle: state.idle.len(),
            in_use: state.in_use.len(),
            pending: state.pending,
            waiters: self.inner.waiters.load(Ordering::SeqCst),
            created: state.counters.created,
            destroyed: state.counters.destroyed,
            total_acquisitions: state.counters.total_acquisitions,
            total_releases: state.counters.total_releases,
            timeouts: state.counters.timeouts,
            validation_failures: state.counters.validation_failures,
        }
    }

    // -- acquire ------------------------------------------------------------

    /// Acquire an instance, waiting up to `PoolConfig::acquire_timeout`.
    pub async fn acquire(&self) -> Result<Lease<R>> {
        self.acquire_timeout(self.inner.pool_config.acquire_timeout)
            .await
    }

    /// Acquire an instance only if one is available right now.
    pub async fn try_acquire(&self) -> Result<Lease<R>> {
        self.acquire_timeout(Some(Duration::ZERO)).await
    }

    /// Acquire an instance.
    ///
    /// `None` waits indefinitely, `Some(Duration::ZERO)` never waits.
    ///
    /// # Errors
    /// - `PoolExhausted` if no capacity frees up in time
    /// - `CreationFailed` if the factory fails; the pool does not retry
    /// - `PoolClosed` after shutdown, including for callers already waiting
    pub async fn acquire_timeout(&self, timeout: Option<Duration>) -> Result<Lease<R>> {
        let inner = &self.inner;
        let started = Instant::now();

        if inner.state.lock().closed {
            return Err(Error::closed(self.name()));
        }

        let permit = match inner.semaphore.try_acquire() {
            Ok(permit) => permit,
            Err(TryAcquireError::Closed) => return Err(Error::closed(self.name())),
            Err(TryAcquireError::NoPermits) => self.wait_for_permit(timeout, started).await?,
        };

        let lease = self.hand_out(started).await?;

        // The permit now belongs to the lease; check-in adds it back.
        permit.forget();
        Ok(lease)
    }

    async fn wait_for_permit(
        &self,
        timeout: Option<Duration>,
        started: Instant,
    ) -> Result<SemaphorePermit<'_>> {
        let inner = &self.inner;
        if timeout == Some(Duration::ZERO) {
            return Err(self.exhausted(started));
        }

        let acquired = match timeout {
            None => self.queue_for_permit().await,
            Some(limit) => {
                if let Ok(acquired) = tokio::time::timeout(limit, self.queue_for_permit()).await {
                    acquired
                } else {
                    return Err(self.exhausted(started));
                }
            }
        };
        acquired.map_err(|_| Error::closed(self.name()))
    }

    /// Wait on the semaphore queue. The caller is counted as a waiter from
    /// the poll that enqueues it until the future completes or is dropped.
    async fn queue_for_permit(
        &self,
    ) -> std::result::Result<SemaphorePermit<'_>, tokio::sync::AcquireError> {
        let inner = &self.inner;
        let mut acquire = pin!(inner.semaphore.acquire());
        let mut waiting = None;
        poll_fn(|cx| {
            let poll = acquire.as_mut().poll(cx);
            if poll.is_pending() && waiting.is_none() {
                let (guard, waiters) = Waiting::enter(&inner.waiters);
                waiting = Some(guard);
                tracing::debug!(pool = %self.name(), waiters, "Pool at capacity, waiting");
                self.emit(PoolEvent::AcquireBlocked {
                    pool: self.name().to_string(),
                    waiters,
                });
            }
            poll
        })
        .await
    }

    /// Record a failed acquire and build its error.
    fn exhausted(&self, started: Instant) -> Error {
        let waited = started.elapsed();
        let in_use = {
            let mut state = self.inner.state.lock();
            state.counters.timeouts += 1;
            state.in_use.len()
        };
        tracing::debug!(pool = %self.name(), waited_ms = waited.as_millis() as u64, "Acquire timed out");
        self.emit(PoolEvent::AcquireTimeout {
            pool: self.name().to_string(),
            waited,
        });
        Error::PoolExhausted {
            resource_id: self.name().to_string(),
            in_use,
            max_size: self.inner.pool_config.max_size,
            waiters: self.inner.waiters.load(Ordering::SeqCst),
            waited_ms: waited.as_millis() as u64,
        }
    }

    /// Open a pending slot, taking an idle instance into it if there is one.
    ///
    /// Runs with a capacity permit held. Every instance outside the idle set
    /// holds a permit too, so with the idle set empty there is room for a
    /// fresh instance.
    fn reserve(&self) -> Result<InFlight<'_, R>> {
        let inner = &self.inner;
        let mut state = inner.state.lock();
        if state.closed {
            return Err(Error::closed(self.name()));
        }
        let entry = state.pop_idle(inner.pool_config.strategy);
        debug_assert!(entry.is_some() || state.live() < inner.pool_config.max_size);
        state.pending += 1;
        Ok(InFlight {
            pool: self,
            entry,
            reservation: Reservation::new(&inner.state),
        })
    }

    /// After an invalid instance is destroyed, its slot goes to the next idle
    /// instance (while `use_idle`) or to a fresh one.
    fn refill_slot(&self, in_flight: &mut InFlight<'_, R>, use_idle: bool) -> Result<()> {
        let inner = &self.inner;
        let mut state = inner.state.lock();
        if state.closed {
            return Err(Error::closed(self.name()));
        }
        if use_idle {
            in_flight.entry = state.pop_idle(inner.pool_config.strategy);
        }
        Ok(())
    }

    /// Runs with a capacity permit held.
    async fn hand_out(&self, started: Instant) -> Result<Lease<R>> {
        let mut in_flight = self.reserve()?;
        let mut validation_budget = self.inner.pool_config.max_size;

        loop {
            let Some(entry) = &in_flight.entry else {
                return self.create_fresh(in_flight, started).await;
            };
            let id = entry.id;
            validation_budget = validation_budget.saturating_sub(1);
            match self.inner.resource.is_valid(&entry.instance).await {
                Ok(true) => return self.lease_out(in_flight, started),
                Ok(false) => {
                    tracing::warn!(pool = %self.name(), resource = %id, "Idle resource failed validation");
                }
                Err(e) => {
                    tracing::warn!(pool = %self.name(), resource = %id, error = %e, "Idle resource validation errored");
                }
            }
            if let Some(entry) = in_flight.entry.take() {
                self.destroy(entry.id, entry.instance, DestroyReason::ValidationFailed)
                    .await;
            }
            self.refill_slot(&mut in_flight, validation_budget > 0)?;
        }
    }

    async fn create_fresh(
        &self,
        mut in_flight: InFlight<'_, R>,
        started: Instant,
    ) -> Result<Lease<R>> {
        let (id, instance) = self.create_instance().await?;
        let now = Instant::now();
        let entry = in_flight.entry.insert(IdleEntry {
            id,
            instance,
            created_at: now,
            last_used: now,
        });

        let outcome = self.inner.resource.is_valid(&entry.instance).await;
        if matches!(outcome, Ok(true)) {
            return self.lease_out(in_flight, started);
        }
        if let Some(entry) = in_flight.entry.take() {
            self.destroy(entry.id, entry.instance, DestroyReason::ValidationFailed)
                .await;
        }
        drop(in_flight);
        Err(Error::CreationFailed {
            resource_id: self.name().to_string(),
            reason: "new resource failed validation".to_string(),
            source: outcome.err().map(|e| -> BoxError { Box::new(e) }),
        })
    }

    async fn create_instance(&self) -> Result<(ResourceId, R::Instance)> {
        let inner = &self.inner;
        let instance = inner
            .resource
            .create(&inner.config)
            .await
            .map_err(|e| {
                tracing::warn!(pool = %self.name(), error = %e, "Resource creation failed");
                Error::creation_failed(self.name(), e)
            })?;

        let id = ResourceId::new(inner.next_resource.fetch_add(1, Ordering::SeqCst));
        inner.state.lock().counters.created += 1;
        tracing::debug!(pool = %self.name(), resource = %id, "Created resource");
        self.emit(PoolEvent::ResourceCreated {
            pool: self.name().to_string(),
            resource: id,
        });
        Ok((id, instance))
    }

    /// Move a validated instance from its pending slot into the checked-out set.
    fn lease_out(&self, mut in_flight: InFlight<'_, R>, started: Instant) -> Result<Lease<R>> {
        let acquired_at = Instant::now();
        let checked_out = {
            let mut state = self.inner.state.lock();
            match in_flight.entry.take() {
                Some(entry) if !state.closed => {
                    state.pending -= 1;
                    in_flight.reservation.disarm();
                    let lease = state.next_lease;
                    state.next_lease += 1;
                    state.in_use.insert(
                        entry.id,
                        Checkout {
                            lease,
                            created_at: entry.created_at,
                            acquired_at,
                        },
                    );
                    state.counters.total_acquisitions += 1;
                    Some((entry, lease))
                }
                entry => {
                    in_flight.entry = entry;
                    None
                }
            }
        };

        let Some((entry, lease)) = checked_out else {
            // Shutdown won the race; dropping the slot destroys the instance.
            drop(in_flight);
            return Err(Error::closed(self.name()));
        };
        let IdleEntry {
            id,
            instance,
            created_at,
            ..
        } = entry;

        self.emit(PoolEvent::Acquired {
            pool: self.name().to_string(),
            resource: id,
            wait: started.elapsed(),
        });
        Ok(Lease::new(
            self.clone(),
            LeaseKey::new(self.inner.id, id, lease),
            instance,
            created_at,
            acquired_at,
        ))
    }

    // -- release ------------------------------------------------------------

    /// Return a lease to this pool.
    ///
    /// A lease from another pool is refused with `InvalidHandle`; it then
    /// drops and returns to the pool that issued it.
    pub fn release(&self, lease: Lease<R>) -> Result<()> {
        if lease.key().pool() != self.inner.id {
            tracing::warn!(pool = %self.name(), key = ?lease.key(), "Refused foreign lease");
            return Err(Error::invalid_handle(
                self.name(),
                HandleRejection::ForeignPool,
            ));
        }
        let (key, instance) = lease.into_parts();
        self.check_in(key, instance)
    }

    /// Return an instance taken out with [`Lease::into_parts`].
    ///
    /// Never blocks. The key must match the current checkout of that
    /// instance: a second check-in with the same key, a key from an earlier
    /// lease, or a foreign key is refused with `InvalidHandle` and the
    /// instance passed in is dropped without entering the pool.
    pub fn check_in(&self, key: LeaseKey, instance: R::Instance) -> Result<()> {
        let inner = &self.inner;
        if key.pool() != inner.id {
            tracing::warn!(pool = %self.name(), ?key, "Refused foreign lease key");
            return Err(Error::invalid_handle(
                self.name(),
                HandleRejection::ForeignPool,
            ));
        }

        let now = Instant::now();
        let (checkout, leftover, drained) = {
            let mut state = inner.state.lock();
            let checkout = match take_checkout(&mut state.in_use, key) {
                Ok(checkout) => checkout,
                Err(reason) => {
                    drop(state);
                    tracing::warn!(pool = %self.name(), ?key, %reason, "Refused lease check-in");
                    return Err(Error::invalid_handle(self.name(), reason));
                }
            };
            state.counters.total_releases += 1;
            if state.closed {
                (checkout, Some(instance), state.in_use.is_empty())
            } else {
                state.idle.push_back(IdleEntry {
                    id: key.resource(),
                    instance,
                    created_at: checkout.created_at,
                    last_used: now,
                });
                (checkout, None, false)
            }
        };

        // Hands the slot to the longest waiter, if any.
        inner.semaphore.add_permits(1);

        self.emit(PoolEvent::Released {
            pool: self.name().to_string(),
            resource: key.resource(),
            held: now.duration_since(checkout.acquired_at),
        });

        if let Some(instance) = leftover {
            self.destroy_detached(key.resource(), instance, DestroyReason::Shutdown);
            if drained {
                inner.drained.notify_waiters();
            }
        }
        Ok(())
    }

    /// Destroy a leased instance instead of returning it.
    pub async fn discard(&self, lease: Lease<R>) -> Result<()> {
        let inner = &self.inner;
        if lease.key().pool() != inner.id {
            return Err(Error::invalid_handle(
                self.name(),
                HandleRejection::ForeignPool,
            ));
        }
        let (key, instance) = lease.into_parts();

        let reservation = {
            let mut state = inner.state.lock();
            match take_checkout(&mut state.in_use, key) {
                Ok(_) => {
                    state.pending += 1;
                    Reservation::new(&inner.state)
                }
                Err(reason) => return Err(Error::invalid_handle(self.name(), reason)),
            }
        };

        self.destroy(key.resource(), instance, DestroyReason::Discarded)
            .await;
        drop(reservation);
        inner.semaphore.add_permits(1);

        let drained = {
            let state = inner.state.lock();
            state.closed && state.in_use.is_empty()
        };
        if drained {
            inner.drained.notify_waiters();
        }
        Ok(())
    }

    // -- destruction --------------------------------------------------------

    async fn destroy(&self, id: ResourceId, instance: R::Instance, reason: DestroyReason) {
        if let Err(e) = self.inner.resource.cleanup(instance).await {
            tracing::warn!(pool = %self.name(), resource = %id, error = %e, "Resource cleanup failed");
        }
        self.record_destroyed(id, reason);
    }

    /// Destroy from synchronous context: spawned onto the current runtime,
    /// or dropped in place when there is none.
    fn destroy_detached(&self, id: ResourceId, instance: R::Instance, reason: DestroyReason) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let pool = self.clone();
                drop(handle.spawn(async move {
                    pool.destroy(id, instance, reason).await;
                }));
            }
            Err(_) => {
                drop(instance);
                self.record_destroyed(id, reason);
            }
        }
    }

    fn record_destroyed(&self, id: ResourceId, reason: DestroyReason) {
        {
            let mut state = self.inner.state.lock();
            state.counters.destroyed += 1;
            if reason == DestroyReason::ValidationFailed {
                state.counters.validation_failures += 1;
            }
        }
        tracing::debug!(pool = %self.name(), resource = %id, ?reason, "Destroyed resource");
        self.emit(PoolEvent::ResourceDestroyed {
            pool: self.name().to_string(),
            resource: id,
            reason,
        });
    }

    // -- maintenance --------------------------------------------------------

    /// Create idle instances until `min_size` are live. Returns how many
    /// were created. Stops at the first factory failure.
    pub async fn fill(&self) -> Result<usize> {
        let inner = &self.inner;
        let mut created = 0;
        loop {
            // Hold capacity while creating, like any acquirer would.
            let Ok(permit) = inner.semaphore.try_acquire() else {
                break;
            };
            let mut reservation = {
                let mut state = inner.state.lock();
                if state.closed || state.live() >= inner.pool_config.min_size {
                    break;
                }
                state.pending += 1;
                Reservation::new(&inner.state)
            };

            let (id, instance) = self.create_instance().await?;
            let now = Instant::now();
            let accepted = {
                let mut state = inner.state.lock();
                state.pending -= 1;
                reservation.disarm();
                if state.closed {
                    Err(instance)
                } else {
                    state.idle.push_back(IdleEntry {
                        id,
                        instance,
                        created_at: now,
                        last_used: now,
                    });
                    Ok(())
                }
            };
            drop(permit);
            if let Err(instance) = accepted {
                self.destroy(id, instance, DestroyReason::Shutdown).await;
                break;
            }
            created += 1;
        }
        Ok(created)
    }

    /// Evict idle instances past `idle_timeout` or `max_lifetime`, then
    /// top the pool back up to `min_size`.
    ///
    /// # Errors
    /// Returns `PoolClosed` after shutdown. Refill failures are logged, not
    /// returned.
    pub async fn maintain(&self) -> Result<()> {
        let inner = &self.inner;
        let now = Instant::now();

        let mut evicted = Vec::new();
        {
            let mut state = inner.state.lock();
            if state.closed {
                return Err(Error::closed(self.name()));
            }
            let mut kept = VecDeque::with_capacity(state.idle.len());
            while let Some(entry) = state.idle.pop_front() {
                match entry.expiry(&inner.pool_config, now) {
                    // Each eviction keeps a permit and a pending slot until cleanup finishes.
                    Some(reason) => match inner.semaphore.try_acquire() {
                        Ok(permit) => {
                            state.pending += 1;
                            let reservation = Reservation::new(&inner.state);
                            evicted.push((entry, reason, reservation, permit));
                        }
                        Err(_) => kept.push_back(entry),
                    },
                    None => kept.push_back(entry),
                }
            }
            state.idle = kept;
        }

        if !evicted.is_empty() {
            tracing::debug!(pool = %self.name(), evicted = evicted.len(), "Evicting stale idle resources");
        }
        for (entry, reason, reservation, permit) in evicted {
            self.destroy(entry.id, entry.instance, reason).await;
            drop(reservation);
            drop(permit);
        }

        if let Err(e) = self.fill().await {
            tracing::warn!(pool = %self.name(), error = %e, "Pool refill failed");
        }
        Ok(())
    }

    /// Run [`Pool::maintain`] every `interval` until the handle is cancelled
    /// or the pool shuts down.
    pub fn spawn_maintenance(&self, interval: Duration) -> MaintenanceHandle {
        let token = CancellationToken::new();
        let pool = self.clone();
        let child = token.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = child.cancelled() => break,
                    _ = ticker.tick() => {
                        if pool.maintain().await.is_err() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!(pool = %pool.name(), "Maintenance task stopped");
        });
        MaintenanceHandle { token, task }
    }

    // -- shutdown -----------------------------------------------------------

    /// Close the pool.
    ///
    /// New acquires and current waiters fail with `PoolClosed`, idle
    /// instances are destroyed now, and instances still leased are destroyed
    /// as they come back. Waits up to `PoolConfig::shutdown_grace` for
    /// outstanding leases. Calling it again is a no-op.
    ///
    /// The teardown runs on its own task: dropping the returned future stops
    /// the wait, not the teardown.
    pub async fn shutdown(&self) -> Result<()> {
        let inner = &self.inner;
        let idle: Vec<_> = {
            let mut state = inner.state.lock();
            if state.closed {
                return Ok(());
            }
            state.closed = true;
            state.idle.drain(..).collect()
        };
        inner.semaphore.close();
        tracing::info!(pool = %self.name(), idle = idle.len(), "Shutting down pool");

        let pool = self.clone();
        let teardown = tokio::spawn(async move { pool.tear_down(idle).await });
        if let Err(e) = teardown.await {
            tracing::warn!(pool = %self.name(), error = %e, "Pool teardown task failed");
        }
        Ok(())
    }

    async fn tear_down(&self, idle: Vec<IdleEntry<R::Instance>>) {
        for entry in idle {
            self.destroy(entry.id, entry.instance, DestroyReason::Shutdown)
                .await;
        }

        let outstanding = self
            .await_outstanding(self.inner.pool_config.shutdown_grace)
            .await;
        if outstanding > 0 {
            tracing::warn!(
                pool = %self.name(),
                outstanding,
                "Pool closed with leases outstanding; they are destroyed on return"
            );
        }
        self.emit(PoolEvent::PoolClosed {
            pool: self.name().to_string(),
            outstanding,
        });
    }

    async fn await_outstanding(&self, grace: Duration) -> usize {
        let inner = &self.inner;
        if grace.is_zero() {
            return inner.state.lock().in_use.len();
        }
        let deadline = Instant::now() + grace;
        loop {
            let notified = inner.drained.notified();
            let remaining = inner.state.lock().in_use.len();
            if remaining == 0 {
                return 0;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return inner.state.lock().in_use.len();
            }
        }
    }

    fn emit(&self, event: PoolEvent) {
        tracing::trace!(event = event.name(), pool = event.pool(), "Pool event");
        if let Some(bus) = &self.inner.events {
            bus.emit(event);
        }
    }
}

fn take_checkout(
    in_use: &mut HashMap<ResourceId, Checkout>,
    key: LeaseKey,
) -> std::result::Result<Checkout, HandleRejection> {
    match in_use.entry(key.resource()) {
        hash_map::Entry::Occupied(entry) if entry.get().lease == key.sequence() => {
            Ok(entry.remove())
        }
        hash_map::Entry::Occupied(_) => Err(HandleRejection::StaleLease),
        hash_map::Entry::Vacant(_) => Err(HandleRejection::NotCheckedOut),
    }
}

// ---------------------------------------------------------------------------
// MaintenanceHandle
// ---------------------------------------------------------------------------

/// Handle to a background maintenance task.
#[derive(Debug)]
pub struct MaintenanceHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl MaintenanceHandle {
    /// Ask the task to stop after its current pass.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Cancel the task and wait for it to finish.
    pub async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Maintenance task panicked");
        }
    }
}
