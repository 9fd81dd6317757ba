//! Morpho CLI - Simulate operations and plan Bundler3 bundles.

#![expect(clippy::print_stdout, reason = "the CLI writes its results to stdout")]

mod cli;
mod commands;
mod output;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cli::{Cli, Commands};
use commands::{run_addresses, run_plan, run_simulate};

/// Logs go to stderr so stdout stays machine readable.
fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "morpho={level},morpho_rs_sim={level},morpho_rs_bundler={level}"
        ))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Simulate(args) => run_simulate(&args, cli.format).await?,
        Commands::Plan(args) => run_plan(&args, cli.format).await?,
        Commands::Addresses(args) => run_addresses(&args, cli.format)?,
    }

    Ok(())
}
