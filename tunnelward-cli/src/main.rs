//! Tunnelward CLI
//!
//! Runs the tunnel-client daemon: a set of supervised subsystems that start
//! in order and shut down together.

// Use mimalloc as the global allocator for better performance
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

mod commands;
mod config;
mod readiness;
mod signals;
mod subsystems;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "tunnelward",
    author,
    version,
    about = "Supervised tunnel-client daemon",
    long_about = "Tunnelward runs the local side of a tunnel: it starts the metrics endpoint, \
                  DNS proxy, test origins and bridge listener, keeps the edge connections up, \
                  and shuts everything down together with a grace period.",
    propagate_version = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon
    Run(config::RunArgs),

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => {
            let code = commands::run::run(args).await?;
            // A pending stdin read cannot be cancelled, so don't wait for the
            // runtime to wind down.
            std::process::exit(code);
        }
        Commands::Version => {
            commands::version::run();
            Ok(())
        }
    }
}
