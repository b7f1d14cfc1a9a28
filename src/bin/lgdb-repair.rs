//! Standalone repair CLI: parses flags with `clap` and wires up
//! `tracing-subscriber` before touching the database.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use lgdb::config::RepairConfig;
use lgdb::repair;

/// Rebuild a locality-group LSM database's descriptor from surviving
/// write-ahead logs and tables.
#[derive(Debug, Parser)]
#[command(name = "lgdb-repair", version, about)]
struct Cli {
    /// Path to the database directory to repair.
    #[arg(long)]
    db: Option<PathBuf>,

    /// Locality group id to repair. May be repeated; defaults to `{0}` when
    /// omitted and no `--config` supplies one.
    #[arg(long = "lg")]
    lg: Vec<u32>,

    /// Load db/lg/tunables from a TOML config file. CLI flags override
    /// whatever it sets.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Emit debug-level logging in addition to info/warn.
    #[arg(long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = match &cli.config {
        Some(path) => match RepairConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("lgdb-repair: {e}");
                return ExitCode::FAILURE;
            }
        },
        None => RepairConfig::new(PathBuf::new()),
    };

    if let Some(db) = cli.db {
        config.db = db;
    }
    if config.db.as_os_str().is_empty() {
        eprintln!("lgdb-repair: --db or a config file naming `db` is required");
        return ExitCode::FAILURE;
    }
    if !cli.lg.is_empty() {
        config.lg = cli.lg;
    }

    let dbname = config.db.clone();
    let options = config.into_options();

    let summary = repair(&dbname, &options);
    for (lg_id, result) in &summary.per_lg {
        if let Err(e) = result {
            eprintln!("lgdb-repair: locality group {lg_id} failed: {e}");
        }
    }

    match summary.result {
        Ok(()) => {
            println!(
                "repaired {}: {} tables recovered, {} bytes",
                dbname.display(),
                summary.recovered_tables,
                summary.recovered_bytes
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("lgdb-repair: {e}");
            ExitCode::FAILURE
        }
    }
}
