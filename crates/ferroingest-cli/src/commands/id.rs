use ferroingest_core::EventId;
use serde::Serialize;
use serde_json::Value;

use crate::cli::IdArgs;
use crate::error::CliError;

#[derive(Debug, Serialize)]
struct IdResponse<'a> {
    source: &'a str,
    keys: &'a [String],
    event_id: EventId,
}

pub fn run(args: &IdArgs) -> Result<Value, CliError> {
    let response = IdResponse {
        source: &args.source,
        keys: &args.keys,
        event_id: EventId::derive(&args.source, &args.keys),
    };
    Ok(serde_json::to_value(response)?)
}
