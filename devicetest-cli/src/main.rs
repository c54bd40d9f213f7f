//! `devicetest` binary entry point.
//!
//! Never returns an error from `main`: every failure becomes a diagnostic
//! line and an exit code (0 success, 1 failed run, 2 configuration error).

mod cli;
mod error;
mod logging;
mod metrics_export;
mod run;

use std::process::ExitCode;

use clap::Parser;

use crate::cli::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let prepared = match run::prepare(&cli).await {
        Ok(prepared) => prepared,
        Err(e) => {
            eprintln!("ERROR: {e}");
            return ExitCode::from(e.exit_code());
        }
    };
    run::init_logging(&prepared.config);

    match run::execute(prepared).await {
        Ok(verdict) if verdict.is_success() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!(error = %e, "devicetest aborted");
            eprintln!("ERROR: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}
