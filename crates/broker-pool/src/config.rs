//! Pool configuration.

use std::time::Duration;

use crate::error::PoolError;

/// Configuration for a connection pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Number of long-lived connections kept warm in the idle store.
    pub base_size: u32,

    /// Additional connections allowed beyond `base_size` under load.
    ///
    /// Overflow connections are closed as soon as they are released.
    pub overflow: u32,

    /// Maximum time a caller waits for a connection.
    pub acquire_timeout: Duration,

    /// Maximum lifetime of a connection since creation.
    ///
    /// `None` disables age-based recycling.
    pub recycle_after: Option<Duration>,

    /// Maximum idle time of a connection since it was last released.
    ///
    /// `None` disables staleness eviction.
    pub stale_after: Option<Duration>,

    /// Probe idle connections for liveness before handing them out.
    ///
    /// Applies to [`Pool::get`](crate::Pool::get) and
    /// [`Pool::get_timeout`](crate::Pool::get_timeout).
    /// [`Pool::try_get`](crate::Pool::try_get) cannot await a probe and
    /// hands idle connections out unprobed.
    pub probe_on_acquire: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            base_size: 10,
            overflow: 10,
            acquire_timeout: Duration::from_secs(30),
            recycle_after: None,
            stale_after: None,
            probe_on_acquire: false,
        }
    }
}

impl PoolConfig {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of base connections.
    #[must_use]
    pub fn base_size(mut self, size: u32) -> Self {
        self.base_size = size;
        self
    }

    /// Set the overflow capacity.
    #[must_use]
    pub fn overflow(mut self, overflow: u32) -> Self {
        self.overflow = overflow;
        self
    }

    /// Set the acquisition timeout.
    #[must_use]
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Set the maximum connection lifetime.
    #[must_use]
    pub fn recycle_after(mut self, lifetime: Duration) -> Self {
        self.recycle_after = Some(lifetime);
        self
    }

    /// Set the maximum idle time.
    #[must_use]
    pub fn stale_after(mut self, idle: Duration) -> Self {
        self.stale_after = Some(idle);
        self
    }

    /// Enable or disable the liveness probe on acquire.
    #[must_use]
    pub fn probe_on_acquire(mut self, enabled: bool) -> Self {
        self.probe_on_acquire = enabled;
        self
    }

    /// Maximum number of connections alive at once.
    #[must_use]
    pub fn max_connections(&self) -> u32 {
        self.base_size.saturating_add(self.overflow)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.max_connections() == 0 {
            return Err(PoolError::Config(
                "base_size + overflow must be greater than 0".into(),
            ));
        }

        if self.recycle_after == Some(Duration::ZERO) {
            return Err(PoolError::Config(
                "recycle_after must be greater than 0".into(),
            ));
        }

        if self.stale_after == Some(Duration::ZERO) {
            return Err(PoolError::Config("stale_after must be greater than 0".into()));
        }

        Ok(())
    }
}
