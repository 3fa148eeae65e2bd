//! Polling budget configuration.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("poll interval must be greater than zero")]
    ZeroInterval,
    #[error("max duration {max_duration:?} is shorter than the poll interval {interval:?}")]
    BudgetShorterThanInterval {
        interval: Duration,
        max_duration: Duration,
    },
}

/// Polling budget for one job, fixed when its poller is constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Time between status queries.
    pub interval: Duration,
    /// Consecutive polls without progress after which the job is presumed stalled.
    pub idle_cap: u32,
    /// Wall-clock budget measured from the start of polling.
    pub max_duration: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            idle_cap: 120,
            max_duration: Duration::from_secs(30 * 60),
        }
    }
}

impl PollConfig {
    /// Build a validated config from second-granularity settings.
    pub fn from_secs(
        interval_secs: u64,
        idle_cap: u32,
        max_duration_secs: u64,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            interval: Duration::from_secs(interval_secs),
            idle_cap,
            max_duration: Duration::from_secs(max_duration_secs),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval.is_zero() {
            return Err(ConfigError::ZeroInterval);
        }
        if self.max_duration < self.interval {
            return Err(ConfigError::BudgetShorterThanInterval {
                interval: self.interval,
                max_duration: self.max_duration,
            });
        }
        Ok(())
    }
}
