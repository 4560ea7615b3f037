mod logging;
mod manifest_cmd;
mod query_cmd;

use clap::{Parser, Subcommand};
use haven_hybrid_retrieval::RetrievalError;

pub use logging::{LogFormat, init_logging};
pub use manifest_cmd::ManifestArgs;
pub use query_cmd::QueryArgs;

/// Hybrid lexical + vector retrieval with parallel renditions
#[derive(Debug, Parser)]
#[command(name = "haven", version)]
pub struct Cli {
    /// Log output format (level via RUST_LOG)
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run one retrieval against a manifest and a passage corpus
    Query(QueryArgs),

    /// Validate a manifest and print the resolved fusion configuration
    Manifest(ManifestArgs),
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Query(args) => query_cmd::run_query(args).await,
            Command::Manifest(args) => manifest_cmd::run_manifest(args),
        }
    }
}

/// Exit code for a failed run: 2 when the caller's input was at fault,
/// 1 for everything else.
pub fn exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<RetrievalError>() {
        Some(err) if err.is_client_fault() => 2,
        _ => 1,
    }
}

/// What to show the user for a failed run. Retrieval server faults are
/// reduced to their public message; the detail goes to the log.
pub fn user_message(err: &anyhow::Error) -> String {
    match err.downcast_ref::<RetrievalError>() {
        Some(err) => err.public_message(),
        None => format!("{err:#}"),
    }
}
