//! Ingestion configuration.
//!
//! Loaded from YAML, then overridden from the environment:
//!
//! | Variable | Effect |
//! |----------|--------|
//! | `FERROINGEST_HOME` | Root for the default error-file directory |
//! | `FERROINGEST_KEEP_SAMPLES` | `validation.keep_samples` |
//! | `FERROINGEST_FAIL_ON_EMPTY` | `fail_on_empty` (`true`/`false`/`1`/`0`) |
//!
//! ```yaml
//! fail_on_empty: false
//! retry:
//!   max_attempts: 3
//!   min_wait_ms: 1000
//!   max_wait_ms: 30000
//!   factor: 2.0
//! sources:
//!   - name: nse
//!     failure_threshold: 3
//!     recovery_timeout_ms: 300000
//!   - name: bse
//!     retry:
//!       max_attempts: 5
//! validation:
//!   keep_samples: 100
//!   output_dir: /var/lib/ferroingest/errors
//! ```

use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::circuit_breaker::CircuitBreakerConfig;
use crate::error::ConfigError;
use crate::error_stream::DEFAULT_KEEP_SAMPLES;
use crate::retry::{Backoff, RetryPolicy};

/// Top-level ingestion settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IngestConfig {
    /// Known upstream sources, one circuit breaker each.
    pub sources: Vec<SourceSettings>,
    /// Retry policy shared by sources without an override.
    pub retry: RetrySettings,
    pub validation: ValidationSettings,
    /// Raise instead of returning an empty resolution when no source has data.
    pub fail_on_empty: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            retry: RetrySettings::default(),
            validation: ValidationSettings::default(),
            fail_on_empty: false,
        }
    }
}

/// Per-source breaker settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceSettings {
    pub name: String,
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_recovery_timeout_ms")]
    pub recovery_timeout_ms: u64,
    /// Overrides the shared retry policy for this source.
    #[serde(default)]
    pub retry: Option<RetrySettings>,
}

impl SourceSettings {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            failure_threshold: default_failure_threshold(),
            recovery_timeout_ms: default_recovery_timeout_ms(),
            retry: None,
        }
    }

    pub fn breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            recovery_timeout: Duration::from_millis(self.recovery_timeout_ms),
        }
    }
}

fn default_failure_threshold() -> u32 {
    CircuitBreakerConfig::default().failure_threshold
}

fn default_recovery_timeout_ms() -> u64 {
    CircuitBreakerConfig::default().recovery_timeout.as_millis() as u64
}

/// Serializable form of [`RetryPolicy`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub min_wait_ms: u64,
    pub max_wait_ms: u64,
    pub factor: f64,
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            min_wait_ms: 1_000,
            max_wait_ms: 30_000,
            factor: 2.0,
            jitter: false,
        }
    }
}

impl RetrySettings {
    pub fn to_policy(&self) -> RetryPolicy {
        let min = Duration::from_millis(self.min_wait_ms);
        RetryPolicy::new(
            self.max_attempts,
            Backoff::Exponential {
                base: min,
                factor: self.factor,
                min,
                max: Duration::from_millis(self.max_wait_ms),
                jitter: self.jitter,
            },
        )
    }

    fn validate(&self, prefix: &str) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::invalid(
                format!("{prefix}.max_attempts"),
                "must be at least 1",
            ));
        }
        if !self.factor.is_finite() || self.factor < 1.0 {
            return Err(ConfigError::invalid(
                format!("{prefix}.factor"),
                "must be a finite number >= 1.0",
            ));
        }
        if self.min_wait_ms > self.max_wait_ms {
            return Err(ConfigError::invalid(
                format!("{prefix}.min_wait_ms"),
                "must not exceed max_wait_ms",
            ));
        }
        Ok(())
    }
}

/// Streaming validator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ValidationSettings {
    pub keep_samples: usize,
    pub output_dir: PathBuf,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            keep_samples: DEFAULT_KEEP_SAMPLES,
            output_dir: resolve_ferroingest_home().join("errors"),
        }
    }
}

impl IngestConfig {
    /// Read and validate a YAML config file, then apply env overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_yaml_str(&raw)?;
        config.apply_env_overrides_from(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(raw)?)
    }

    /// Apply `FERROINGEST_*` overrides using `lookup` to read variables.
    pub fn apply_env_overrides_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("FERROINGEST_KEEP_SAMPLES") {
            self.validation.keep_samples = raw.trim().parse().map_err(|_| {
                ConfigError::invalid("FERROINGEST_KEEP_SAMPLES", format!("not a number: '{raw}'"))
            })?;
        }

        if let Some(raw) = lookup("FERROINGEST_FAIL_ON_EMPTY") {
            self.fail_on_empty = parse_bool(&raw).ok_or_else(|| {
                ConfigError::invalid("FERROINGEST_FAIL_ON_EMPTY", format!("not a boolean: '{raw}'"))
            })?;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for source in &self.sources {
            if source.name.trim().is_empty() {
                return Err(ConfigError::invalid("sources.name", "must not be empty"));
            }
            if !seen.insert(source.name.as_str()) {
                return Err(ConfigError::DuplicateSource {
                    name: source.name.clone(),
                });
            }
            if source.failure_threshold == 0 {
                return Err(ConfigError::invalid(
                    format!("sources.{}.failure_threshold", source.name),
                    "must be at least 1",
                ));
            }
            if let Some(retry) = &source.retry {
                retry.validate(&format!("sources.{}.retry", source.name))?;
            }
        }

        self.retry.validate("retry")?;

        if self.validation.keep_samples == 0 {
            return Err(ConfigError::invalid(
                "validation.keep_samples",
                "must be at least 1",
            ));
        }

        Ok(())
    }

    pub fn source(&self, name: &str) -> Option<&SourceSettings> {
        self.sources.iter().find(|source| source.name == name)
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

fn resolve_ferroingest_home() -> PathBuf {
    if let Some(path) = env::var_os("FERROINGEST_HOME") {
        let path = PathBuf::from(path);
        if !path.as_os_str().is_empty() {
            return path;
        }
    }

    if let Some(home) = env::var_os("HOME") {
        return PathBuf::from(home).join(".ferroingest");
    }

    PathBuf::from(".ferroingest")
}
