mod config;
mod errors;
mod id;

use serde_json::Value;

use crate::cli::{Cli, Command, ConfigCommand, ErrorsCommand};
use crate::error::CliError;

pub async fn run(cli: &Cli) -> Result<Value, CliError> {
    match &cli.command {
        Command::Id(args) => id::run(args),
        Command::Errors(args) => match &args.command {
            ErrorsCommand::Summary(args) => errors::summary(args),
            ErrorsCommand::Head(args) => errors::head(args),
        },
        Command::Config(args) => match &args.command {
            ConfigCommand::Check(args) => config::check(args).await,
        },
    }
}
