use log::{debug, info};

use open_poll::builder::PollServiceBuilder;
use open_poll::*;
use snafu::{prelude::*, Snafu};

use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use serde_json::Value as JSValue;

use crate::args::{Args, Command};
use crate::openpoll::config_reader::*;
use crate::openpoll::io_store::JsonFileStore;

pub mod config_reader;
mod io_csv;
pub mod io_store;

pub const DEFAULT_STORE: &str = "polls.json";

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CliError {
    #[snafu(display("Error opening file {path}"))]
    OpeningJson {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing JSON file {path}"))]
    ParsingJson {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("Error serializing the output"))]
    WritingJson { source: serde_json::Error },
    #[snafu(display("Error reading input file {path}"))]
    ReadingInput {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error writing CSV output {path}"))]
    WritingCsv { source: csv::Error, path: String },
    #[snafu(display("Error locking the store {path}"))]
    LockingStore {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error writing output {path}"))]
    WritingOutput {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Not a poll id: {id:?}"))]
    InvalidId { id: String },
    #[snafu(display("{source}"))]
    Poll { source: PollError },
    #[snafu(display("{source}"))]
    Summary { source: SummaryError },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type CliResult<T> = Result<T, CliError>;

fn parse_id(id: &str) -> CliResult<PollId> {
    id.parse::<PollId>()
        .ok()
        .context(InvalidIdSnafu { id: id.to_string() })
}

fn print_json<T: Serialize>(value: &T) -> CliResult<()> {
    let pretty = serde_json::to_string_pretty(value).context(WritingJsonSnafu {})?;
    println!("{}", pretty);
    Ok(())
}

/// The admin password expected from callers. The environment value wins over the file.
fn expected_password(config: &OpenPollConfig, from_env: Option<String>) -> String {
    match from_env {
        Some(p) if !p.is_empty() => p,
        _ => config.admin_password.clone().unwrap_or_default(),
    }
}

pub fn build_service(config: &OpenPollConfig, store: Arc<dyn PollRepository>) -> CliResult<PollService> {
    let password = expected_password(config, std::env::var("ADMIN_PASSWORD").ok());
    build_service_with_password(config, store, &password)
}

fn build_service_with_password(
    config: &OpenPollConfig,
    store: Arc<dyn PollRepository>,
    password: &str,
) -> CliResult<PollService> {
    let service_config = validate_config(config)?;
    let summaries = build_summary_provider(config.summary.as_ref(), &service_config)?;
    if password.is_empty() {
        debug!("No admin password configured, admin commands are disabled");
    }
    PollServiceBuilder::new(&service_config)
        .repository(store)
        .summaries(summaries)
        .access(Arc::new(PasswordAccess::new(password)))
        .build()
        .context(PollSnafu {})
}

fn run_aggregate(input: &str, config: &OpenPollConfig) -> CliResult<()> {
    let service_config = validate_config(config)?;
    let texts = io_csv::read_text_responses(input)?;
    info!("Ranking {} responses from {}", texts.len(), input);
    let ranked = aggregate_responses(&texts, &service_config.aggregation);
    print_json(&json!({
        "responses": texts.len(),
        "wordFrequencies": ranked,
    }))
}

pub fn run(args: &Args) -> CliResult<()> {
    let config = read_config(args.config.as_deref())?;
    debug!("config: {:?}", config);

    // Ranking a plain file does not need the store.
    if let Command::Aggregate { input } = &args.command {
        return run_aggregate(input, &config);
    }

    let store_path = args
        .store
        .clone()
        .or_else(|| config.store.clone())
        .unwrap_or_else(|| DEFAULT_STORE.to_string());
    let store = Arc::new(JsonFileStore::open(&store_path)?);
    debug!("store: {}", store.path().display());
    let service = build_service(&config, store)?;

    let ctx = match &args.admin_password {
        Some(p) => RequestContext::with_token(p),
        None => RequestContext::anonymous(),
    };

    match &args.command {
        Command::Create { question } => {
            let poll = service.create_poll(&ctx, question).context(PollSnafu {})?;
            print_json(&poll)
        }
        Command::List => {
            let polls = service.list_polls(&ctx).context(PollSnafu {})?;
            print_json(&polls)
        }
        Command::Show { id } => {
            let detail = service
                .poll_detail(&ctx, parse_id(id)?)
                .context(PollSnafu {})?;
            print_json(&detail)
        }
        Command::Lookup { code } => {
            let summary = service.find_by_code(code).context(PollSnafu {})?;
            print_json(&summary)
        }
        Command::Submit { code, text } => {
            let response = service.submit_response(code, text).context(PollSnafu {})?;
            print_json(&response)
        }
        Command::Close { id } => {
            let poll = service
                .close_poll(&ctx, parse_id(id)?)
                .context(PollSnafu {})?;
            print_json(&poll)
        }
        Command::Reopen { id } => {
            let poll = service
                .reopen_poll(&ctx, parse_id(id)?)
                .context(PollSnafu {})?;
            print_json(&poll)
        }
        Command::Edit { id, question } => {
            let poll = service
                .edit_poll(&ctx, parse_id(id)?, question)
                .context(PollSnafu {})?;
            print_json(&poll)
        }
        Command::Delete { id } => {
            let pid = parse_id(id)?;
            service.delete_poll(&ctx, pid).context(PollSnafu {})?;
            print_json(&json!({ "deleted": pid }))
        }
        Command::Export { id, out } => {
            let detail = service
                .poll_detail(&ctx, parse_id(id)?)
                .context(PollSnafu {})?;
            io_csv::export_poll(&detail, out.as_deref())
        }
        Command::Aggregate { .. } => Ok(()),
    }
}

/// Exit status for an error. Caller mistakes are told apart from failures of the program.
pub fn exit_code(err: &CliError) -> i32 {
    match err {
        CliError::Poll { source } => match source {
            PollError::Exhausted { .. } | PollError::Storage { .. } => 1,
            PollError::Unauthorized { .. } => 3,
            _ => 2,
        },
        CliError::InvalidId { .. } => 2,
        _ => 1,
    }
}

pub fn error_json(err: &CliError) -> JSValue {
    let kind = match err {
        CliError::Poll { source } => match source {
            PollError::Validation { .. } => "VALIDATION_ERROR",
            PollError::NotFound { .. } => "NOT_FOUND",
            PollError::InvalidState { .. } => "INVALID_STATE",
            PollError::ClosedPoll { .. } => "POLL_CLOSED",
            PollError::Exhausted { .. } => "CODE_SPACE_EXHAUSTED",
            PollError::Unauthorized { .. } => "UNAUTHORIZED",
            PollError::Storage { .. } => "STORAGE_ERROR",
        },
        CliError::InvalidId { .. } => "VALIDATION_ERROR",
        _ => "INTERNAL_ERROR",
    };
    json!({ "error": kind, "message": err.to_string() })
}
