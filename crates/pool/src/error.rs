//! Error types for pool operations
use std::fmt;

use thiserror::Error;

/// Result type for pool operations
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error produced by a resource factory.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Why a lease or lease key was refused on check-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleRejection {
    /// The lease was issued by a different pool instance.
    ForeignPool,
    /// The resource is not checked out (already released, discarded, or unknown).
    NotCheckedOut,
    /// The resource is checked out, but under a newer lease.
    StaleLease,
}

impl fmt::Display for HandleRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ForeignPool => "lease was issued by another pool",
            Self::NotCheckedOut => "resource is not checked out",
            Self::StaleLease => "lease has been superseded",
        };
        f.write_str(s)
    }
}

/// Errors returned by [`Pool`](crate::Pool) operations
#[derive(Error, Debug)]
pub enum Error {
    /// Pool or resource configuration is invalid
    #[error("Configuration error: {message}")]
    Configuration {
        /// The error message
        message: String,
    },

    /// No resource became available before the acquire timeout elapsed
    #[error(
        "Resource pool exhausted for '{resource_id}': {in_use}/{max_size} in use after {waited_ms}ms"
    )]
    PoolExhausted {
        /// The resource identifier
        resource_id: String,
        /// Number of resources checked out when the wait gave up
        in_use: usize,
        /// Maximum pool size
        max_size: usize,
        /// Number of other callers still waiting
        waiters: usize,
        /// How long this caller waited
        waited_ms: u64,
    },

    /// The resource factory failed, or a fresh resource failed its first validation
    #[error("Failed to create resource '{resource_id}': {reason}")]
    CreationFailed {
        /// The resource identifier
        resource_id: String,
        /// The failure reason
        reason: String,
        /// The factory's own error, unmodified
        #[source]
        source: Option<BoxError>,
    },

    /// A lease was foreign, already released, or superseded
    #[error("Invalid handle for pool '{resource_id}': {reason}")]
    InvalidHandle {
        /// The resource identifier
        resource_id: String,
        /// Why the handle was refused
        reason: HandleRejection,
    },

    /// The pool has been shut down
    #[error("Resource pool '{resource_id}' is closed")]
    PoolClosed {
        /// The resource identifier
        resource_id: String,
    },
}

impl Error {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub(crate) fn creation_failed<E>(resource_id: &str, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::CreationFailed {
            resource_id: resource_id.to_string(),
            reason: source.to_string(),
            source: Some(Box::new(source)),
        }
    }

    pub(crate) fn invalid_handle(resource_id: &str, reason: HandleRejection) -> Self {
        Self::InvalidHandle {
            resource_id: resource_id.to_string(),
            reason,
        }
    }

    pub(crate) fn closed(resource_id: &str) -> Self {
        Self::PoolClosed {
            resource_id: resource_id.to_string(),
        }
    }

    /// Check if this error is retryable
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::PoolExhausted { .. })
    }

    /// Get the resource ID associated with this error (if any)
    #[must_use]
    pub fn resource_id(&self) -> Option<&str> {
        match self {
            Self::Configuration { .. } => None,
            Self::PoolExhausted { resource_id, .. }
            | Self::CreationFailed { resource_id, .. }
            | Self::InvalidHandle { resource_id, .. }
            | Self::PoolClosed { resource_id } => Some(resource_id),
        }
    }
}
