//! Configuration types

use crate::error::{ConfigError, StrataResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Resource cache configuration.
/// ALL values are required - no defaults anywhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Maximum allowed resource body size in bytes.
    pub max_size: usize,
    /// Interval of the background reconciliation sweep.
    pub sync_period: Duration,
    /// Per-key debounce between a mutation and its sync eligibility, so
    /// write bursts coalesce into one blob write.
    pub sync_delay: Duration,
    /// Maximum number of keys reconciled per sweep tick.
    pub sync_batch: usize,
    /// TTL applied to cache entries once they are synced.
    pub cache_expiration: Duration,
    /// Minimum body size in bytes at which gzip is applied.
    pub compression_min_size: usize,
}

impl ResourceConfig {
    /// Validate the configuration.
    /// Returns Ok(()) if valid, Err(StrataError::Config) if invalid.
    pub fn validate(&self) -> StrataResult<()> {
        if self.max_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_size".to_string(),
                value: self.max_size.to_string(),
                reason: "max_size must be greater than 0".to_string(),
            }
            .into());
        }

        if self.sync_period.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "sync_period".to_string(),
                value: format!("{:?}", self.sync_period),
                reason: "sync_period must be positive".to_string(),
            }
            .into());
        }

        if self.sync_batch == 0 {
            return Err(ConfigError::InvalidValue {
                field: "sync_batch".to_string(),
                value: self.sync_batch.to_string(),
                reason: "sync_batch must be greater than 0".to_string(),
            }
            .into());
        }

        if self.cache_expiration.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "cache_expiration".to_string(),
                value: format!("{:?}", self.cache_expiration),
                reason: "cache_expiration must be positive".to_string(),
            }
            .into());
        }

        Ok(())
    }

    /// Create a configuration from environment variables.
    ///
    /// Every variable is required:
    /// - `STRATA_MAX_SIZE`: max resource body size in bytes
    /// - `STRATA_SYNC_PERIOD_MS`: sweep interval in milliseconds
    /// - `STRATA_SYNC_DELAY_MS`: per-key debounce in milliseconds
    /// - `STRATA_SYNC_BATCH`: max keys reconciled per tick
    /// - `STRATA_CACHE_EXPIRATION_MS`: synced-entry TTL in milliseconds
    /// - `STRATA_COMPRESSION_MIN_SIZE`: gzip threshold in bytes
    pub fn from_env() -> StrataResult<Self> {
        let config = Self {
            max_size: required_env("STRATA_MAX_SIZE")?,
            sync_period: Duration::from_millis(required_env("STRATA_SYNC_PERIOD_MS")?),
            sync_delay: Duration::from_millis(required_env("STRATA_SYNC_DELAY_MS")?),
            sync_batch: required_env("STRATA_SYNC_BATCH")?,
            cache_expiration: Duration::from_millis(required_env("STRATA_CACHE_EXPIRATION_MS")?),
            compression_min_size: required_env("STRATA_COMPRESSION_MIN_SIZE")?,
        };
        config.validate()?;
        Ok(config)
    }
}

fn required_env<T: std::str::FromStr>(name: &str) -> Result<T, ConfigError> {
    let raw = std::env::var(name).map_err(|_| ConfigError::MissingRequired {
        field: name.to_string(),
    })?;
    raw.parse().map_err(|_| ConfigError::InvalidValue {
        field: name.to_string(),
        value: raw.clone(),
        reason: "not a valid number".to_string(),
    })
}
