//! Provisioner configuration
//!
//! Loaded from TOML. Every field has a default, so an empty file yields a
//! provisioner that retries three times and drives all targets live.
//!
//! ```toml
//! kpi_enabled = true
//!
//! [retry]
//! max_attempts = 5
//! initial_backoff_ms = 250
//!
//! [targets]
//! index = "dry_run"
//! ```

use crate::error::ConfigError;
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// How a downstream target is driven
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetMode {
    /// Real client calls, wrapped in retries
    #[default]
    Live,
    /// Calls are logged, local bookkeeping still happens
    DryRun,
    /// Target step replaced by a logging no-op
    Disabled,
}

/// Per-target modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetModes {
    pub augmentation: TargetMode,
    pub kpi: TargetMode,
    pub index: TargetMode,
}

/// Retry settings as written in the config file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first call
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub multiplier: f64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            multiplier: 2.0,
            max_backoff_ms: 10_000,
        }
    }
}

impl RetryConfig {
    /// Convert to a runtime policy
    #[must_use]
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            multiplier: self.multiplier,
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }
}

/// Top-level provisioner configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionerConfig {
    /// Master switch for the KPI target; `false` behaves like `kpi = "disabled"`
    pub kpi_enabled: bool,
    pub retry: RetryConfig,
    pub targets: TargetModes,
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            kpi_enabled: true,
            retry: RetryConfig::default(),
            targets: TargetModes::default(),
        }
    }
}

impl ProvisionerConfig {
    /// Parse and validate TOML text
    ///
    /// # Errors
    /// Returns [`ConfigError`] on malformed TOML or out-of-range values.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    ///
    /// # Errors
    /// Returns [`ConfigError`] when the file cannot be read or is invalid.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::info!(path = %path.display(), "provisioner configuration loaded");
        Ok(config)
    }

    /// Check value ranges
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        if self.retry.multiplier.is_nan() || self.retry.multiplier < 1.0 {
            return Err(ConfigError::Invalid(
                "retry.multiplier must be >= 1.0".into(),
            ));
        }
        if self.retry.max_backoff_ms < self.retry.initial_backoff_ms {
            return Err(ConfigError::Invalid(
                "retry.max_backoff_ms must not be below retry.initial_backoff_ms".into(),
            ));
        }
        Ok(())
    }

    /// KPI mode after applying the `kpi_enabled` switch
    #[inline]
    #[must_use]
    pub fn kpi_mode(&self) -> TargetMode {
        if self.kpi_enabled {
            self.targets.kpi
        } else {
            TargetMode::Disabled
        }
    }

    /// Set the KPI switch
    #[inline]
    #[must_use]
    pub fn with_kpi_enabled(mut self, enabled: bool) -> Self {
        self.kpi_enabled = enabled;
        self
    }

    /// Replace all target modes
    #[inline]
    #[must_use]
    pub fn with_targets(mut self, targets: TargetModes) -> Self {
        self.targets = targets;
        self
    }

    /// Replace retry settings
    #[inline]
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}
