mod args;
mod output;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use mailprobe_lib::{BatchVerifier, FixedWindowLimiter, Verifier};
use tracing_subscriber::EnvFilter;

use crate::args::Cli;

fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    let request = cli.request()?;
    if request.emails.is_empty() {
        Cli::command().print_help()?;
        println!();
        return Ok(());
    }

    let config = cli.verifier_config()?;
    let verifier = Verifier::from_config(&config).context("build verifier")?;
    let batch = BatchVerifier::new(verifier, FixedWindowLimiter::new(config.quota))
        .with_max_concurrency(config.max_concurrency);

    let results = batch
        .verify_request(&cli.caller, request)
        .await
        .context("batch refused")?;

    output::write_reports(&results, &cli)?;

    // codes de sortie : 0 OK, 2 invalids, 1 fatal
    if output::any_invalid(&results) {
        std::process::exit(2);
    }
    Ok(())
}
