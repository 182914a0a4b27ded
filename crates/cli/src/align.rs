//! `geoalign align` / `verify` / `validate` / `init-store`.

use std::path::{Path, PathBuf};

use clap::Args;

use geoalign_io::SqliteStore;
use geoalign_recon::{AlignConfig, RunReport, TableKind, VerifyOptions};

use crate::exit_codes::{recon_exit_code, EXIT_ABORTED, EXIT_INVALID_CONFIG, EXIT_IO, EXIT_UNRESOLVED, EXIT_USAGE};
use crate::CliError;

/// Options shared by every command that touches central data and the store.
/// Flags win over the config file.
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// TOML config file
    #[arg(long, short = 'c', env = "GEOALIGN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Root directory of the central snapshot files
    #[arg(long, env = "GEOALIGN_INPUT")]
    pub input: Option<PathBuf>,

    /// SQLite local store
    #[arg(long, env = "GEOALIGN_DB")]
    pub db: Option<PathBuf>,

    /// Simulate every write; the store is not modified
    #[arg(long, env = "GEOALIGN_DRY_RUN")]
    pub dry_run: bool,

    /// Record manual-cleanup collisions instead of aborting
    #[arg(long, env = "GEOALIGN_ARCHIVE_ON_CONFLICT")]
    pub archive_on_conflict: bool,

    /// Settle community collisions by attached facilities
    #[arg(long, env = "GEOALIGN_ADJACENCY")]
    pub adjacency: bool,
}

fn cli_err(code: u8, msg: impl Into<String>) -> CliError {
    CliError { code, message: msg.into(), hint: None }
}

fn read_config(path: &Path) -> Result<AlignConfig, CliError> {
    let input = std::fs::read_to_string(path)
        .map_err(|e| cli_err(EXIT_USAGE, format!("cannot read config {}: {e}", path.display())))?;
    log::debug!("loaded config {}", path.display());
    AlignConfig::from_toml(&input).map_err(|e| cli_err(EXIT_INVALID_CONFIG, e.to_string()))
}

/// Config file (or defaults) with command-line overrides applied.
pub fn resolve_config(args: &RunArgs) -> Result<AlignConfig, CliError> {
    let mut config = match &args.config {
        Some(path) => read_config(path)?,
        None => AlignConfig::default(),
    };

    if let Some(input) = &args.input {
        config.snapshot.root = input.display().to_string();
    }
    if let Some(db) = &args.db {
        config.store.path = db.display().to_string();
    }
    config.options.dry_run |= args.dry_run;
    config.options.archive_on_conflict |= args.archive_on_conflict;
    config.options.adjacency_resolution |= args.adjacency;

    config
        .validate()
        .map_err(|e| cli_err(EXIT_INVALID_CONFIG, e.to_string()))?;
    Ok(config)
}

fn open_store(config: &AlignConfig) -> Result<SqliteStore, CliError> {
    let path = Path::new(&config.store.path);
    if !path.exists() {
        return Err(cli_err(EXIT_USAGE, format!("local store not found: {}", path.display()))
            .with_hint("create one with `geoalign init-store <path>` or pass --db"));
    }
    SqliteStore::open(path).map_err(|e| cli_err(EXIT_IO, e.to_string()))
}

fn write_json<T: serde::Serialize>(value: &T, json_output: bool, output_file: Option<&Path>) -> Result<(), CliError> {
    if !json_output && output_file.is_none() {
        return Ok(());
    }
    let json_str = serde_json::to_string_pretty(value)
        .map_err(|e| cli_err(EXIT_IO, format!("JSON serialization error: {e}")))?;

    if let Some(path) = output_file {
        std::fs::write(path, &json_str)
            .map_err(|e| cli_err(EXIT_IO, format!("cannot write output: {e}")))?;
        eprintln!("wrote {}", path.display());
    }
    if json_output {
        println!("{json_str}");
    }
    Ok(())
}

fn write_error_log(path: &Path, lines: &[String]) -> Result<(), CliError> {
    let mut body = lines.join("\n");
    if !body.is_empty() {
        body.push('\n');
    }
    std::fs::write(path, body)
        .map_err(|e| cli_err(EXIT_IO, format!("cannot write error log {}: {e}", path.display())))
}

fn print_summary(report: &RunReport) {
    for s in &report.tables {
        eprintln!(
            "{}: {} central, {} aligned, {} unchanged, {} by adjacency, {} unresolved",
            s.table, s.central_records, s.aligned, s.unchanged, s.adjacency_resolved, s.unresolved,
        );
    }
    if report.meta.dry_run {
        eprintln!("dry run: the local store was not modified");
    }
}

// ============================================================================
// align
// ============================================================================

pub fn cmd_align(
    args: RunArgs,
    error_log: PathBuf,
    json_output: bool,
    output_file: Option<PathBuf>,
) -> Result<(), CliError> {
    let config = resolve_config(&args)?;
    let snapshot = geoalign_io::load_snapshot(&config.snapshot)
        .map_err(|e| cli_err(recon_exit_code(&e), e.to_string()))?;
    let mut store = open_store(&config)?;
    log::info!("Aligning {} against {}", config.store.path, config.snapshot.root);

    let (report, fatal) = match geoalign_recon::run(&mut store, &snapshot, &config.options) {
        Ok(report) => (report, None),
        Err(aborted) => (aborted.report, Some(aborted.cause)),
    };

    write_error_log(&error_log, &report.lines())?;
    write_json(&report, json_output, output_file.as_deref())?;
    print_summary(&report);

    if let Some(cause) = fatal {
        return Err(cli_err(EXIT_ABORTED, cause.to_string())
            .with_hint("clean up the duplicates, or rerun with --archive-on-conflict"));
    }

    let errors = report.errors().count();
    if errors > 0 {
        return Err(cli_err(
            EXIT_UNRESOLVED,
            format!("{errors} unresolved records, see {}", error_log.display()),
        ));
    }
    Ok(())
}

// ============================================================================
// verify
// ============================================================================

pub fn cmd_verify(args: RunArgs, table: TableKind, insert: bool, json_output: bool) -> Result<(), CliError> {
    let config = resolve_config(&args)?;
    let entries = geoalign_io::load_table(&config.snapshot, table)
        .map_err(|e| cli_err(recon_exit_code(&e), e.to_string()))?;
    let mut store = open_store(&config)?;

    let options = VerifyOptions {
        insert_missing: insert,
        dry_run: config.options.dry_run,
    };
    let report = geoalign_recon::verify_presence(&mut store, table, &entries, &options);

    write_json(&report, json_output, None)?;
    eprintln!(
        "{table}: {} present, {} missing, {} inserted",
        report.present,
        report.missing.len(),
        report.inserted.len(),
    );

    let errors = report.errors().count();
    if errors > 0 {
        return Err(cli_err(
            EXIT_UNRESOLVED,
            format!("{errors} {table} records could not be verified"),
        ));
    }
    let missing = report.missing.len() - report.inserted.len();
    if missing > 0 {
        return Err(cli_err(EXIT_UNRESOLVED, format!("{missing} {table} records missing locally")));
    }
    Ok(())
}

// ============================================================================
// validate / init-store
// ============================================================================

pub fn cmd_validate(config_path: PathBuf) -> Result<(), CliError> {
    let config = read_config(&config_path)?;
    eprintln!(
        "valid: snapshot root {}, store {}, dry_run={}, archive_on_conflict={}, adjacency_resolution={}",
        config.snapshot.root,
        config.store.path,
        config.options.dry_run,
        config.options.archive_on_conflict,
        config.options.adjacency_resolution,
    );
    Ok(())
}

pub fn cmd_init_store(path: PathBuf) -> Result<(), CliError> {
    SqliteStore::create(&path).map_err(|e| cli_err(EXIT_IO, e.to_string()))?;
    eprintln!("created {}", path.display());
    Ok(())
}
