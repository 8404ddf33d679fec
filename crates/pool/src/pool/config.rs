//! Pool configuration types

use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Order in which idle resources are handed out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum PoolStrategy {
    /// Oldest returned resource first; spreads use across the set.
    #[default]
    Fifo,
    /// Most recently returned resource first; keeps a hot working set.
    Lifo,
}

/// When the pool creates its first `min_size` resources.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum WarmUp {
    /// Create on demand only.
    #[default]
    Lazy,
    /// Create `min_size` resources when the pool starts.
    Eager,
}

/// Configuration for resource pooling
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PoolConfig {
    /// Minimum number of resources maintenance keeps alive
    pub min_size: usize,
    /// Maximum number of live resources (idle + in use)
    pub max_size: usize,
    /// Default wait for [`Pool::acquire`](crate::Pool::acquire).
    /// `None` waits indefinitely, zero never waits.
    pub acquire_timeout: Option<Duration>,
    /// Idle resources older than this are evicted by maintenance
    pub idle_timeout: Duration,
    /// Resources older than this are evicted by maintenance
    pub max_lifetime: Duration,
    /// Idle hand-out order
    pub strategy: PoolStrategy,
    /// Whether `Pool::start` pre-populates `min_size` resources
    pub warm_up: WarmUp,
    /// How long `shutdown` waits for outstanding leases to come back
    pub shutdown_grace: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_size: 1,
            max_size: 10,
            acquire_timeout: Some(Duration::from_secs(30)),
            idle_timeout: Duration::from_secs(600),
            max_lifetime: Duration::from_secs(3600),
            strategy: PoolStrategy::default(),
            warm_up: WarmUp::default(),
            shutdown_grace: Duration::ZERO,
        }
    }
}

impl PoolConfig {
    /// Validate pool configuration, returning an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(Error::configuration("max_size must be greater than 0"));
        }
        if self.min_size > self.max_size {
            return Err(Error::configuration(format!(
                "min_size ({}) must not exceed max_size ({})",
                self.min_size, self.max_size
            )));
        }
        Ok(())
    }
}
