use std::process::ExitCode;

use clap::Parser;
use pulse_cli::cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    pulse_cli::init_logging(cli.verbose);
    pulse_cli::run(cli).await
}
