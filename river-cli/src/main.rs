//! River reference CLI: the server and harness client used to exercise the
//! transport end-to-end (spec.md §6 external interfaces).

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

mod commands;
mod handlers;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "river",
    author,
    version,
    about = "River RPC transport: reference server and harness client",
    propagate_version = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the reference server with the demonstration `kv`, `repeat`, and `upload` services
    Serve,

    /// Run the reference harness client, driven by newline-delimited JSON actions on stdin
    Harness,

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    river_observability::init_logging();

    match cli.command {
        Commands::Serve => commands::serve::run().await,
        Commands::Harness => commands::harness::run().await,
        Commands::Version => {
            commands::version::run();
            Ok(())
        }
    }
}
