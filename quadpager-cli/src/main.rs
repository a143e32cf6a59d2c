//! QuadPager CLI - Command-line harness
//!
//! Inspects coverage decisions and drives the tile scheduler against a
//! synthetic tile source.

mod commands;
mod error;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use quadpager::logging::{self, LoggingConfig};

use commands::config::ConfigCommands;
use commands::coverage::CoverageArgs;
use commands::simulate::SimulateArgs;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "quadpager", version, about = "Quad-tree tile paging engine harness")]
struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show the tiles chosen for a synthetic top-down view
    Coverage(CoverageArgs),

    /// Run the scheduler along a scripted camera path
    Simulate(SimulateArgs),

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn run(cli: Cli) -> Result<(), CliError> {
    let mut logging_config = LoggingConfig::default().with_ansi(true);
    if cli.verbose {
        logging_config = logging_config.with_filter("quadpager=debug");
    }
    if let Some(path) = cli.log_file {
        logging_config = logging_config.with_log_file(path);
    }
    let _guard = logging::init(&logging_config)?;

    match cli.command {
        Commands::Coverage(args) => commands::coverage::run(args),
        Commands::Simulate(args) => commands::simulate::run(args),
        Commands::Config { command } => commands::config::run(command),
    }
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
