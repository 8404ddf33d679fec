//! Leases: exclusive, RAII-backed ownership of one pooled instance.
//!
//! A [`Lease`] owns its instance for as long as the caller holds it, so two
//! callers can never reach the same instance. The [`LeaseKey`] inside it is
//! the token the pool checks on return: pool identity, instance identity,
//! and the sequence number of this particular checkout.

use std::fmt;

use tokio::time::Instant;
use uuid::Uuid;

use crate::error::Result;
use crate::pool::Pool;
use crate::resource::Resource;

/// Identity of one live instance, assigned by the pool at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(u64);

impl ResourceId {
    pub(crate) const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw numeric id.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identity of one pool instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolId(Uuid);

impl PoolId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Token proving a checkout was issued by a specific pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LeaseKey {
    pool: PoolId,
    resource: ResourceId,
    lease: u64,
}

impl LeaseKey {
    pub(crate) const fn new(pool: PoolId, resource: ResourceId, lease: u64) -> Self {
        Self {
            pool,
            resource,
            lease,
        }
    }

    /// The issuing pool.
    #[must_use]
    pub const fn pool(&self) -> PoolId {
        self.pool
    }

    /// The leased instance.
    #[must_use]
    pub const fn resource(&self) -> ResourceId {
        self.resource
    }

    /// Checkout sequence number; differs for every hand-out.
    #[must_use]
    pub const fn sequence(&self) -> u64 {
        self.lease
    }
}

/// Exclusive lease on a pooled instance.
///
/// Dropping the lease checks the instance back in. Use [`Lease::release`]
/// to observe the outcome, [`Lease::discard`] to destroy a broken instance,
/// or [`Lease::into_parts`] to take the instance out of RAII management and
/// return it later with [`Pool::check_in`].
pub struct Lease<R: Resource> {
    key: LeaseKey,
    instance: Option<R::Instance>,
    created_at: Instant,
    acquired_at: Instant,
    pool: Pool<R>,
}

impl<R: Resource> Lease<R> {
    pub(crate) fn new(
        pool: Pool<R>,
        key: LeaseKey,
        instance: R::Instance,
        created_at: Instant,
        acquired_at: Instant,
    ) -> Self {
        Self {
            key,
            instance: Some(instance),
            created_at,
            acquired_at,
            pool,
        }
    }

    /// The lease token.
    #[must_use]
    pub fn key(&self) -> LeaseKey {
        self.key
    }

    /// Identity of the leased instance.
    #[must_use]
    pub fn resource_id(&self) -> ResourceId {
        self.key.resource
    }

    /// When the underlying instance was created.
    #[must_use]
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// When this lease was handed out.
    #[must_use]
    pub fn acquired_at(&self) -> Instant {
        self.acquired_at
    }

    /// Return the instance to its pool.
    pub fn release(self) -> Result<()> {
        let pool = self.pool.clone();
        pool.release(self)
    }

    /// Destroy the instance instead of returning it, freeing its capacity.
    pub async fn discard(self) -> Result<()> {
        let pool = self.pool.clone();
        pool.discard(self).await
    }

    /// Take the instance out of the lease without returning it.
    ///
    /// The pool still counts the instance as in use until the key and
    /// instance are handed back through [`Pool::check_in`].
    #[must_use]
    pub fn into_parts(mut self) -> (LeaseKey, R::Instance) {
        let instance = self.instance.take().expect("lease used after into_parts");
        (self.key, instance)
    }
}

impl<R: Resource> std::ops::Deref for Lease<R> {
    type Target = R::Instance;

    fn deref(&self) -> &R::Instance {
        self.instance.as_ref().expect("lease used after into_parts")
    }
}

impl<R: Resource> std::ops::DerefMut for Lease<R> {
    fn deref_mut(&mut self) -> &mut R::Instance {
        self.instance.as_mut().expect("lease used after into_parts")
    }
}

impl<R: Resource> Drop for Lease<R> {
    fn drop(&mut self) {
        if let Some(instance) = self.instance.take()
            && let Err(e) = self.pool.check_in(self.key, instance)
        {
            tracing::warn!(key = ?self.key, error = %e, "Dropped lease was not accepted by its pool");
        }
    }
}

impl<R: Resource> fmt::Debug for Lease<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lease")
            .field("key", &self.key)
            .field("pool", &self.pool.name())
            .finish_non_exhaustive()
    }
}
