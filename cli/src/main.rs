use clap::Parser;
use haven_cli::{Cli, exit_code, init_logging, user_message};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_format);

    match cli.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err:#}");
            eprintln!("error: {}", user_message(&err));
            ExitCode::from(exit_code(&err))
        }
    }
}
