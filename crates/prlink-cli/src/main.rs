mod action_outputs;
mod action_run;
mod bootstrap_helpers;
mod cli_args;

use std::process::ExitCode;

use clap::Parser;

use crate::action_run::run_action;
use crate::bootstrap_helpers::init_tracing;
use crate::cli_args::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    match run_action(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!("{error:#}");
            ExitCode::FAILURE
        }
    }
}
