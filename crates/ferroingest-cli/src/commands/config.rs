use ferroingest_core::{BreakerSnapshot, IngestConfig, SourceFallbackResolver};
use serde::Serialize;
use serde_json::Value;

use crate::cli::ConfigCheckArgs;
use crate::error::CliError;

#[derive(Debug, Serialize)]
struct SourceRow {
    name: String,
    failure_threshold: u32,
    recovery_timeout_ms: u64,
    max_attempts: u32,
    state: &'static str,
}

#[derive(Debug, Serialize)]
struct ConfigCheckResponse {
    valid: bool,
    fail_on_empty: bool,
    keep_samples: usize,
    output_dir: String,
    sources: Vec<SourceRow>,
}

pub async fn check(args: &ConfigCheckArgs) -> Result<Value, CliError> {
    if !args.file.exists() {
        return Err(CliError::NotFound(args.file.clone()));
    }

    let path = args.file.clone();
    let config = tokio::task::spawn_blocking(move || IngestConfig::load(path)).await??;
    let resolver = SourceFallbackResolver::from_config(&config)?;

    let mut snapshots = resolver.registry().snapshots();
    snapshots.sort_by(|a, b| a.name.cmp(&b.name));
    let sources = snapshots
        .into_iter()
        .map(|snapshot| source_row(&resolver, snapshot))
        .collect();

    let response = ConfigCheckResponse {
        valid: true,
        fail_on_empty: config.fail_on_empty,
        keep_samples: config.validation.keep_samples,
        output_dir: config.validation.output_dir.display().to_string(),
        sources,
    };
    Ok(serde_json::to_value(response)?)
}

fn source_row(resolver: &SourceFallbackResolver, snapshot: BreakerSnapshot) -> SourceRow {
    SourceRow {
        max_attempts: resolver.retry_policy_for(&snapshot.name).max_attempts,
        failure_threshold: snapshot.failure_threshold,
        recovery_timeout_ms: snapshot.recovery_timeout_ms,
        state: snapshot.state.as_str(),
        name: snapshot.name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[tokio::test]
    async fn lists_sources_with_effective_retry() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("ingest.yaml");
        fs::write(
            &file,
            "retry:\n  max_attempts: 4\nsources:\n  - name: nse\n    failure_threshold: 2\n  - name: bse\n    retry:\n      max_attempts: 1\n",
        )
        .expect("writable");

        let output = check(&ConfigCheckArgs { file }).await.expect("valid config");

        assert_eq!(output["valid"], true);
        assert_eq!(output["sources"][0]["name"], "bse");
        assert_eq!(output["sources"][0]["max_attempts"], 1);
        assert_eq!(output["sources"][1]["name"], "nse");
        assert_eq!(output["sources"][1]["failure_threshold"], 2);
        assert_eq!(output["sources"][1]["max_attempts"], 4);
        assert_eq!(output["sources"][1]["state"], "closed");
    }

    #[tokio::test]
    async fn invalid_config_maps_to_usage_exit_code() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("ingest.yaml");
        fs::write(&file, "sources:\n  - name: nse\n  - name: nse\n").expect("writable");

        let error = check(&ConfigCheckArgs { file }).await.expect_err("duplicate source");

        assert_eq!(error.exit_code(), 2);
    }
}
