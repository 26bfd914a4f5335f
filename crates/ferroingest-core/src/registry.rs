//! Named set of circuit breakers, one per upstream source.
//!
//! The registry is built once during process bootstrap and shared behind an
//! `Arc`. After construction its key set never changes; only the breakers'
//! internal state moves, through [`CircuitBreaker::call`] and
//! [`CircuitBreaker::call_async`].

use std::collections::HashMap;
use std::sync::Arc;

use crate::circuit_breaker::{BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig};
use crate::config::IngestConfig;
use crate::error::ConfigError;

/// Registry of per-source circuit breakers.
#[derive(Debug, Default)]
pub struct CircuitBreakerRegistry {
    breakers: HashMap<String, Arc<CircuitBreaker>>,
}

impl CircuitBreakerRegistry {
    pub fn builder() -> CircuitBreakerRegistryBuilder {
        CircuitBreakerRegistryBuilder::default()
    }

    /// Build one breaker per configured source.
    pub fn from_config(config: &IngestConfig) -> Result<Self, ConfigError> {
        config
            .sources
            .iter()
            .fold(Self::builder(), |builder, source| {
                builder.source_with(source.name.clone(), source.breaker_config())
            })
            .build()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<CircuitBreaker>> {
        self.breakers.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.breakers.contains_key(name)
    }

    /// Registered source names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names = self.breakers.keys().map(String::as_str).collect::<Vec<_>>();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    /// Metrics view of every breaker, sorted by source name.
    pub fn snapshots(&self) -> Vec<BreakerSnapshot> {
        self.names()
            .into_iter()
            .filter_map(|name| self.breakers.get(name))
            .map(|breaker| breaker.snapshot())
            .collect()
    }

    pub fn reset_all(&self) {
        for breaker in self.breakers.values() {
            breaker.reset();
        }
    }
}

/// Builder collecting source names and their breaker settings.
#[derive(Debug, Default)]
pub struct CircuitBreakerRegistryBuilder {
    defaults: CircuitBreakerConfig,
    entries: Vec<(String, CircuitBreakerConfig)>,
}

impl CircuitBreakerRegistryBuilder {
    /// Settings used by [`Self::source`].
    pub fn with_defaults(mut self, defaults: CircuitBreakerConfig) -> Self {
        self.defaults = defaults;
        self
    }

    /// Register a source with the default breaker settings.
    pub fn source(self, name: impl Into<String>) -> Self {
        let defaults = self.defaults;
        self.source_with(name, defaults)
    }

    /// Register a source with explicit breaker settings.
    pub fn source_with(mut self, name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        self.entries.push((name.into(), config));
        self
    }

    pub fn build(self) -> Result<CircuitBreakerRegistry, ConfigError> {
        let mut breakers = HashMap::with_capacity(self.entries.len());
        for (name, config) in self.entries {
            if name.trim().is_empty() {
                return Err(ConfigError::invalid("sources.name", "must not be empty"));
            }
            if config.failure_threshold == 0 {
                return Err(ConfigError::invalid(
                    format!("sources.{name}.failure_threshold"),
                    "must be at least 1",
                ));
            }
            if breakers.contains_key(&name) {
                return Err(ConfigError::DuplicateSource { name });
            }

            let breaker = Arc::new(CircuitBreaker::new(name.clone(), config));
            breakers.insert(name, breaker);
        }

        Ok(CircuitBreakerRegistry { breakers })
    }
}
