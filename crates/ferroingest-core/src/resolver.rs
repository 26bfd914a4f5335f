//! Priority-ordered source fallback.
//!
//! Each source in the priority list is attempted strictly in order through
//! its circuit breaker, with the retry policy running *inside* the breaker:
//!
//! ```text
//! breaker(source).call_async(|| retry.run(|| fetch(source)))
//! ```
//!
//! so a call that needed three attempts still counts as one breaker outcome.
//! The first source returning a non-empty payload wins.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::IngestConfig;
use crate::dataset::Payload;
use crate::error::{BreakerError, ConfigError, FetchError, ResolveError};
use crate::metrics::{InternalEvent, SourceResolved};
use crate::registry::CircuitBreakerRegistry;
use crate::retry::RetryPolicy;

/// Outcome of one source attempt.
#[derive(Debug)]
pub enum FetchOutcome<D> {
    /// Non-empty payload; resolution stops here.
    Found(D),
    /// Successful fetch with nothing in it.
    Empty,
    /// Fetch failed after retries, or the breaker rejected it.
    Failed(BreakerError<FetchError>),
}

impl<D: Payload> FetchOutcome<D> {
    fn from_result(result: Result<D, BreakerError<FetchError>>) -> Self {
        match result {
            Ok(data) if data.is_empty() => Self::Empty,
            Ok(data) => Self::Found(data),
            Err(error) => Self::Failed(error),
        }
    }
}

/// Recorded status of one attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AttemptStatus {
    Found,
    Empty,
    Failed { code: String, message: String },
    Rejected { retry_in_ms: u64 },
    UnknownSource,
}

impl AttemptStatus {
    fn of<D>(outcome: &FetchOutcome<D>) -> Self {
        match outcome {
            FetchOutcome::Found(_) => Self::Found,
            FetchOutcome::Empty => Self::Empty,
            FetchOutcome::Failed(BreakerError::Open { retry_in, .. }) => Self::Rejected {
                retry_in_ms: retry_in.as_millis().min(u128::from(u64::MAX)) as u64,
            },
            FetchOutcome::Failed(BreakerError::Inner(error)) => Self::Failed {
                code: error.code().to_owned(),
                message: error.message().to_owned(),
            },
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceAttempt {
    pub source: String,
    #[serde(flatten)]
    pub status: AttemptStatus,
    pub latency_ms: u64,
}

/// Result of a fallback resolution.
#[derive(Debug, Clone)]
pub struct Resolution<D> {
    /// Winning payload, or `D::default()` when no source had data.
    pub data: D,
    pub selected_source: Option<String>,
    /// Every attempted source, in order.
    pub attempts: Vec<SourceAttempt>,
    pub warnings: Vec<String>,
    pub latency_ms: u64,
}

impl<D> Resolution<D> {
    pub fn is_resolved(&self) -> bool {
        self.selected_source.is_some()
    }

    /// Attempted sources, in order.
    pub fn source_chain(&self) -> Vec<&str> {
        self.attempts.iter().map(|a| a.source.as_str()).collect()
    }
}

/// Sequential, breaker-guarded fallback across registered sources.
#[derive(Debug, Clone)]
pub struct SourceFallbackResolver {
    registry: Arc<CircuitBreakerRegistry>,
    retry: RetryPolicy,
    overrides: HashMap<String, RetryPolicy>,
    fail_on_empty: bool,
}

impl SourceFallbackResolver {
    pub fn new(registry: Arc<CircuitBreakerRegistry>, retry: RetryPolicy) -> Self {
        Self {
            registry,
            retry,
            overrides: HashMap::new(),
            fail_on_empty: false,
        }
    }

    /// Build the registry and retry policies from `config`.
    pub fn from_config(config: &IngestConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let registry = Arc::new(CircuitBreakerRegistry::from_config(config)?);
        let overrides = config
            .sources
            .iter()
            .filter_map(|source| {
                source
                    .retry
                    .as_ref()
                    .map(|retry| (source.name.clone(), retry.to_policy()))
            })
            .collect();

        Ok(Self {
            registry,
            retry: config.retry.to_policy(),
            overrides,
            fail_on_empty: config.fail_on_empty,
        })
    }

    /// Return [`ResolveError::SourceExhausted`] instead of an empty resolution.
    pub fn with_fail_on_empty(mut self, fail_on_empty: bool) -> Self {
        self.fail_on_empty = fail_on_empty;
        self
    }

    pub fn with_source_retry(mut self, source: impl Into<String>, retry: RetryPolicy) -> Self {
        self.overrides.insert(source.into(), retry);
        self
    }

    pub fn registry(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.registry
    }

    pub fn retry_policy_for(&self, source: &str) -> &RetryPolicy {
        self.overrides.get(source).unwrap_or(&self.retry)
    }

    /// Try `sources` in priority order until one yields a non-empty payload.
    ///
    /// Duplicate names are attempted once. Failures, open breakers and
    /// unregistered sources are logged and skipped.
    pub async fn resolve<D, S, F, Fut>(
        &self,
        sources: &[S],
        mut fetch: F,
    ) -> Result<Resolution<D>, ResolveError>
    where
        D: Payload + Default,
        S: AsRef<str>,
        F: FnMut(&str) -> Fut,
        Fut: Future<Output = Result<D, FetchError>>,
    {
        let started = Instant::now();
        let chain = dedupe_chain(sources);
        let mut attempts = Vec::with_capacity(chain.len());
        let mut warnings = Vec::new();

        for source in chain {
            let attempt_started = Instant::now();
            let Some(breaker) = self.registry.get(source) else {
                warn!(source, "no circuit breaker registered for source, skipping");
                attempts.push(SourceAttempt {
                    source: source.to_owned(),
                    status: AttemptStatus::UnknownSource,
                    latency_ms: 0,
                });
                continue;
            };

            let retry = self.retry_policy_for(source);
            let fetch = &mut fetch;
            let result = breaker
                .call_async(move || retry.run(move || fetch(source)))
                .await;
            let outcome = FetchOutcome::from_result(result);
            let latency_ms = elapsed_ms(attempt_started);
            attempts.push(SourceAttempt {
                source: source.to_owned(),
                status: AttemptStatus::of(&outcome),
                latency_ms,
            });

            match outcome {
                FetchOutcome::Found(data) => {
                    let unsuccessful = attempts.len() - 1;
                    if unsuccessful > 0 {
                        warnings.push(format!(
                            "source fallback succeeded with '{source}' after {unsuccessful} unsuccessful attempt(s)"
                        ));
                    }
                    let latency_ms = elapsed_ms(started);
                    info!(source, attempts = attempts.len(), latency_ms, "source resolved");
                    SourceResolved {
                        selected: Some(source),
                        attempts: attempts.len(),
                        latency_ms,
                    }
                    .emit();

                    return Ok(Resolution {
                        data,
                        selected_source: Some(source.to_owned()),
                        attempts,
                        warnings,
                        latency_ms,
                    });
                }
                FetchOutcome::Empty => {
                    debug!(source, latency_ms, "source returned no data, trying next");
                }
                FetchOutcome::Failed(error) => {
                    warn!(source, latency_ms, error = %error, "source failed, trying next");
                }
            }
        }

        let latency_ms = elapsed_ms(started);
        SourceResolved {
            selected: None,
            attempts: attempts.len(),
            latency_ms,
        }
        .emit();

        if self.fail_on_empty {
            return Err(ResolveError::SourceExhausted { attempts });
        }

        warn!(attempts = attempts.len(), "no source produced data");
        warnings.push(format!(
            "no source produced data after {} attempt(s)",
            attempts.len()
        ));
        Ok(Resolution {
            data: D::default(),
            selected_source: None,
            attempts,
            warnings,
            latency_ms,
        })
    }
}

fn dedupe_chain<S: AsRef<str>>(sources: &[S]) -> Vec<&str> {
    let mut seen = HashSet::new();
    sources
        .iter()
        .map(AsRef::as_ref)
        .filter(|source| seen.insert(*source))
        .collect()
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::CircuitBreakerConfig;
    use std::time::Duration;

    fn resolver(names: &[&str]) -> SourceFallbackResolver {
        let defaults = CircuitBreakerRegistry::builder().with_defaults(CircuitBreakerConfig {
            failure_threshold: 2,
            recovery_timeout: Duration::from_secs(60),
        });
        let registry = names
            .iter()
            .fold(defaults, |builder, name| builder.source(*name))
            .build()
            .expect("valid registry");
        SourceFallbackResolver::new(Arc::new(registry), RetryPolicy::no_retry())
    }

    #[test]
    fn dedupe_keeps_first_occurrence() {
        assert_eq!(dedupe_chain(&["a", "b", "a", "c", "b"]), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn first_non_empty_source_wins() {
        let resolver = resolver(&["a", "b"]);

        let resolution = resolver
            .resolve(&["a", "b"], |source| {
                let data = if source == "a" { vec![1, 2] } else { vec![3] };
                async move { Ok::<_, FetchError>(data) }
            })
            .await
            .expect("resolves");

        assert_eq!(resolution.data, vec![1, 2]);
        assert_eq!(resolution.selected_source.as_deref(), Some("a"));
        assert_eq!(resolution.source_chain(), vec!["a"]);
        assert!(resolution.warnings.is_empty());
    }

    #[tokio::test]
    async fn unregistered_source_is_skipped() {
        let resolver = resolver(&["b"]);

        let resolution = resolver
            .resolve(&["ghost", "b"], |_| async { Ok::<_, FetchError>(vec![7]) })
            .await
            .expect("resolves");

        assert_eq!(resolution.selected_source.as_deref(), Some("b"));
        assert_eq!(resolution.attempts[0].status, AttemptStatus::UnknownSource);
        assert_eq!(resolution.warnings.len(), 1);
    }

    #[tokio::test]
    async fn per_source_retry_override_is_used() {
        let resolver = resolver(&["a"]).with_source_retry(
            "a",
            RetryPolicy::fixed(Duration::from_millis(1), 3),
        );
        let mut calls = 0;

        let resolution = resolver
            .resolve(&["a"], |_| {
                calls += 1;
                let result = if calls < 3 {
                    Err(FetchError::timeout("slow upstream"))
                } else {
                    Ok(vec![1])
                };
                async move { result }
            })
            .await
            .expect("resolves");

        assert_eq!(calls, 3);
        assert_eq!(resolution.data, vec![1]);
        let breaker = resolver.registry().get("a").expect("registered");
        assert_eq!(breaker.failure_count(), 0);
    }

    #[test]
    fn attempt_status_serializes_with_tag() {
        let attempt = SourceAttempt {
            source: String::from("a"),
            status: AttemptStatus::Rejected { retry_in_ms: 10 },
            latency_ms: 0,
        };

        let encoded = serde_json::to_value(&attempt).expect("serializable");

        assert_eq!(
            encoded,
            serde_json::json!({
                "source": "a",
                "status": "rejected",
                "retry_in_ms": 10,
                "latency_ms": 0
            })
        );
    }
}
