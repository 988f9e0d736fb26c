//! testforge CLI - Main Entry Point
//!
//! Runs declarative API and UI test suites and manages the persisted
//! variable registry.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod output;

use commands::{run, vars};

/// testforge - declarative API and browser test runner
#[derive(Parser)]
#[command(name = "testforge")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Engine configuration file (TOML)
    #[arg(short, long, env = "TESTFORGE_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a target, or every suite in the suites directory
    Run(run::RunArgs),

    /// Manage persisted variables
    #[command(subcommand)]
    Vars(vars::VarsCommands),

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .init();

    let config = testforge_engine::EngineConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run(args) => {
            let success = run::execute(args, config, cli.format).await?;
            if !success {
                std::process::exit(1);
            }
        }
        Commands::Vars(cmd) => vars::execute(cmd, &config, cli.format)?,
        Commands::Version => {
            println!("testforge v{}", testforge_common::VERSION);
        }
    }

    Ok(())
}
