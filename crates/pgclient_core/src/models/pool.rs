//! Pool tuning parameters and pool status.

use super::options::Options;
use crate::error::{PgClientError, Result};

use std::time::Duration;

/// Connections older than this are dropped once idle.
pub const DEFAULT_MAX_LIFETIME: Duration = Duration::from_secs(60 * 60);

/// Connections idle for longer than this are dropped.
pub const DEFAULT_MAX_IDLE_TIME: Duration = Duration::from_secs(30 * 60);

/// How often idle connections are inspected.
pub const DEFAULT_HEALTH_CHECK_PERIOD: Duration = Duration::from_secs(60);

/// How long opening a single connection may take.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// The six knobs handed to the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolTuning {
    /// Maximum pool capacity
    pub max_size: usize,
    /// Connections kept open even when idle
    pub min_size: usize,
    /// Age after which an idle connection is closed
    pub max_lifetime: Duration,
    /// Idle time after which a connection is closed
    pub max_idle_time: Duration,
    /// Interval of the maintenance pass
    pub health_check_period: Duration,
    /// Timeout for opening a connection and for waiting on a full pool
    pub connect_timeout: Duration,
}

impl PoolTuning {
    /// Defaults with `max_size` taken from the options.
    pub fn from_options(options: &Options) -> Self {
        Self { max_size: options.max_pool_size, ..Self::default() }
    }

    /// Set the minimum number of open connections.
    pub fn with_min_size(mut self, min_size: usize) -> Self {
        self.min_size = min_size;
        self
    }

    /// Set the maximum connection lifetime.
    pub fn with_max_lifetime(mut self, max_lifetime: Duration) -> Self {
        self.max_lifetime = max_lifetime;
        self
    }

    /// Set the maximum idle time.
    pub fn with_max_idle_time(mut self, max_idle_time: Duration) -> Self {
        self.max_idle_time = max_idle_time;
        self
    }

    /// Set the maintenance interval.
    pub fn with_health_check_period(mut self, period: Duration) -> Self {
        self.health_check_period = period;
        self
    }

    /// Set the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Validate the tuning.
    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(PgClientError::config("Max pool size must be at least 1"));
        }
        if self.min_size > self.max_size {
            return Err(PgClientError::config(format!(
                "Min pool size {} exceeds max pool size {}",
                self.min_size, self.max_size
            )));
        }
        if self.health_check_period.is_zero() {
            return Err(PgClientError::config("Health check period must be non-zero"));
        }
        Ok(())
    }

    /// Whether an idle connection with these metrics should be kept.
    pub fn keeps(&self, age: Duration, idle: Duration) -> bool {
        age < self.max_lifetime && idle < self.max_idle_time
    }
}

impl Default for PoolTuning {
    fn default() -> Self {
        Self {
            max_size: super::options::DEFAULT_MAX_POOL_SIZE,
            min_size: 0,
            max_lifetime: DEFAULT_MAX_LIFETIME,
            max_idle_time: DEFAULT_MAX_IDLE_TIME,
            health_check_period: DEFAULT_HEALTH_CHECK_PERIOD,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

/// Connection pool status.
#[derive(Debug, Clone, Copy)]
pub struct PoolStatus {
    /// Maximum pool capacity
    pub max_size: usize,
    /// Current connections (idle + active)
    pub size: usize,
    /// Idle connections
    pub available: usize,
    /// Tasks waiting for connections
    pub waiting: usize,
}

impl PoolStatus {
    /// Check if the pool is healthy.
    pub fn is_healthy(&self) -> bool {
        self.waiting == 0
    }

    /// Get the number of active (in-use) connections.
    pub fn active(&self) -> usize {
        self.size.saturating_sub(self.available)
    }

    /// Get pool utilization as a percentage.
    pub fn utilization(&self) -> f64 {
        if self.max_size == 0 {
            0.0
        } else {
            (self.active() as f64 / self.max_size as f64) * 100.0
        }
    }
}
