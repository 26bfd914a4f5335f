//! CLI argument definitions for ferroingest.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `id` | Print the idempotent event id for a source and keys |
//! | `errors summary` | Totals of an NDJSON error file by rule and severity |
//! | `errors head` | First records of an NDJSON error file |
//! | `config check` | Load and validate an ingestion config |
//!
//! # Examples
//!
//! ```bash
//! ferroingest id --source nse 2024-01-02 RELIANCE
//! ferroingest errors summary /var/lib/ferroingest/errors/validation-errors-3f2a.ndjson --pretty
//! ferroingest errors head errors.ndjson -n 5
//! ferroingest config check ingest.yaml
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Operator tooling for ferroingest pipelines.
#[derive(Debug, Parser)]
#[command(
    name = "ferroingest",
    author,
    version,
    about = "Operator tooling for ferroingest ingestion pipelines"
)]
pub struct Cli {
    /// Log filter used when `RUST_LOG` is not set.
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    /// Pretty-print JSON output.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the deterministic event id for a source and ordered keys.
    ///
    ///   ferroingest id --source nse 2024-01-02 RELIANCE
    Id(IdArgs),

    /// Inspect validation error files.
    Errors(ErrorsArgs),

    /// Inspect ingestion configuration.
    Config(ConfigArgs),
}

#[derive(Debug, Args)]
pub struct IdArgs {
    /// Source the event was fetched from.
    #[arg(long)]
    pub source: String,

    /// Ordered idempotency keys.
    #[arg(required = true, num_args = 1..)]
    pub keys: Vec<String>,
}

#[derive(Debug, Args)]
pub struct ErrorsArgs {
    #[command(subcommand)]
    pub command: ErrorsCommand,
}

#[derive(Debug, Subcommand)]
pub enum ErrorsCommand {
    /// Count records by severity and rule.
    Summary(ErrorFileArgs),

    /// Print the first records of an error file.
    Head(ErrorsHeadArgs),
}

#[derive(Debug, Args)]
pub struct ErrorFileArgs {
    /// NDJSON error file written by a validation run.
    pub file: PathBuf,
}

#[derive(Debug, Args)]
pub struct ErrorsHeadArgs {
    pub file: PathBuf,

    /// Number of records to print.
    #[arg(short = 'n', long, default_value_t = 10)]
    pub count: usize,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Load, apply env overrides and validate a YAML config.
    Check(ConfigCheckArgs),
}

#[derive(Debug, Args)]
pub struct ConfigCheckArgs {
    pub file: PathBuf,
}
