//! lit-runner - discovers and runs lit-style tests
//!
//! Test files carry `RUN:` lines; each suite's `lit.toml` says which files
//! are tests and how `%`-tokens in those lines map to tools.

use clap::Parser;
use commands::Commands;
use lit_runner::common::logging;
use lit_runner::{cli, commands};

#[derive(Parser)]
#[command(name = "lit-runner", about = "Discover and run lit-style test suites")]
#[command(version, long_about = None)]
struct Cli {
    /// Show failing test output and debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init_cli(cli.verbose);

    match cli::dispatch(cli.command, cli.verbose).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            if e.is_configuration() {
                eprintln!("Configuration error: {e}");
            } else {
                eprintln!("Error: {e}");
            }
            std::process::exit(2);
        }
    }
}
