//! Arena CLI - Command-line interface
//!
//! Commands:
//! - evaluate: Run tournament evaluation over a demo population

mod evaluate;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use evaluate::EvaluateArgs;

#[derive(Parser)]
#[command(name = "arena")]
#[command(about = "Parallel tournament fitness evaluation")]
struct Cli {
    /// Random seed for reproducibility
    #[arg(long, global = true)]
    seed: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a population over several generations
    Evaluate(EvaluateArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging; RUST_LOG overrides the default level
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Evaluate(args) => evaluate::run(args, cli.seed).await,
    }
}
