//! Core resource traits (bb8-style)
//!
//! The `Resource` trait defines how to create, validate, and clean up
//! resource instances. The pool treats instances as opaque handles and never
//! calls anything else on them.

use std::future::Future;

use crate::error::Result;

/// Configuration trait for resource creation parameters
/// (connection strings, hosts, credentials).
pub trait Config: Send + Sync + 'static {
    /// Validate the configuration, returning an error if invalid.
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

/// Core resource trait.
///
/// Each resource type has an associated `Config` (creation parameters) and
/// `Instance` (the handle handed out by the pool). Instances only need to be
/// `Send`: a lease grants exclusive access, so they are never shared between
/// threads.
pub trait Resource: Send + Sync + 'static {
    /// The creation parameters for this resource.
    type Config: Config;

    /// The instance type produced by this resource.
    type Instance: Send + 'static;

    /// Error raised by the factory. Surfaced to callers unmodified as the
    /// source of [`Error::CreationFailed`](crate::Error::CreationFailed).
    type Error: std::error::Error + Send + Sync + 'static;

    /// Unique string identifier for this resource type (e.g. "postgres").
    fn id(&self) -> &str;

    /// Create a new instance from config.
    fn create(
        &self,
        config: &Self::Config,
    ) -> impl Future<Output = std::result::Result<Self::Instance, Self::Error>> + Send;

    /// Check whether an instance is still usable before it is handed out.
    ///
    /// Both `Ok(false)` and `Err(_)` cause the instance to be destroyed.
    fn is_valid(
        &self,
        _instance: &Self::Instance,
    ) -> impl Future<Output = std::result::Result<bool, Self::Error>> + Send {
        async { Ok(true) }
    }

    /// Clean up an instance when it is permanently removed.
    fn cleanup(
        &self,
        instance: Self::Instance,
    ) -> impl Future<Output = std::result::Result<(), Self::Error>> + Send {
        async move {
            drop(instance);
            Ok(())
        }
    }
}
