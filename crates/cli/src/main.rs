// geoalign CLI - align a local store with central administrative-division data

mod align;
mod exit_codes;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use geoalign_recon::TableKind;

use align::RunArgs;
use exit_codes::EXIT_SUCCESS;

#[derive(Parser)]
#[command(name = "geoalign")]
#[command(about = "Align a local store with central administrative-division data")]
#[command(version)]
struct Cli {
    /// Only log warnings and errors (RUST_LOG still wins)
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Align every table, continent down to community
    #[command(after_help = "\
Examples:
  geoalign align --input ./data --db local.db
  geoalign align -c geoalign.toml --dry-run
  geoalign align -c geoalign.toml --archive-on-conflict --json
  geoalign align -c geoalign.toml --output report.json --error-log run-errors.log")]
    Align {
        #[command(flatten)]
        run: RunArgs,

        /// Where to write the diagnostic lines
        #[arg(long, default_value = "errors.log")]
        error_log: PathBuf,

        /// Print the run report as JSON to stdout
        #[arg(long)]
        json: bool,

        /// Write the run report as JSON to file
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Check that every central record of one table exists locally
    #[command(after_help = "\
Examples:
  geoalign verify -c geoalign.toml
  geoalign verify -c geoalign.toml --table district --insert
  geoalign verify -c geoalign.toml --insert --dry-run --json")]
    Verify {
        #[command(flatten)]
        run: RunArgs,

        /// Table to verify
        #[arg(long, default_value = "community")]
        table: TableKind,

        /// Insert missing records as new centrally managed rows
        #[arg(long)]
        insert: bool,

        /// Print the verify report as JSON to stdout
        #[arg(long)]
        json: bool,
    },

    /// Validate a config file without running
    Validate {
        /// Path to the TOML config file
        config: PathBuf,
    },

    /// Create an empty local store with the expected schema
    InitStore {
        /// Path of the SQLite file to create
        path: PathBuf,
    },
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

fn init_logging(quiet: bool) {
    let default_filter = if quiet { "warn" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp_secs()
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.quiet);

    let result = match cli.command {
        Commands::Align { run, error_log, json, output } => align::cmd_align(run, error_log, json, output),
        Commands::Verify { run, table, insert, json } => align::cmd_verify(run, table, insert, json),
        Commands::Validate { config } => align::cmd_validate(config),
        Commands::InitStore { path } => align::cmd_init_store(path),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}
