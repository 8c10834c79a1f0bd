//! sqlsalvage - WAL recovery pass for damaged SQLite databases
//!
//! Reads `<database>-wal` directly, rebuilds the page index from every frame
//! that still verifies, checks that each recovered page can be read back, and
//! prints a JSON report. A WAL that cannot be trusted at all is reported and
//! recovery falls back to the main database file.

mod config;

use config::Config;
use serde::Serialize;
use sqlsalvage_repair::{ErrorRecord, Pager, WalReader, WalSummary};
use tracing_subscriber::EnvFilter;

/// Outcome of one recovery pass.
#[derive(Debug, Serialize)]
struct RecoveryReport {
    database: std::path::PathBuf,
    wal: WalSummary,
    /// Pages in the index whose image could be read back.
    recovered_pages: usize,
    /// Pages that were indexed but failed to read.
    corrupted_pages: Vec<u32>,
    /// Whether the caller must rely on the main database file only.
    fallback_to_main_file: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_error: Option<ErrorRecord>,
}

fn run(config: &Config) -> Result<RecoveryReport, Box<dyn std::error::Error>> {
    let recovery = &config.recovery;
    let pager = Pager::new(recovery.database.clone(), recovery.page_size)?;
    let mut wal = WalReader::new(&pager);
    if let Some(max_frame) = recovery.max_frame {
        wal.set_max_frame(max_frame)?;
    }

    let fallback = match wal.initialize() {
        Ok(()) => false,
        Err(e) => {
            tracing::warn!(
                "WAL {} is unusable, falling back to the main database file: {}",
                wal.path().display(),
                e
            );
            true
        }
    };

    let pages: Vec<u32> = wal.page_numbers().collect();
    let mut recovered = 0;
    for page in pages {
        match wal.acquire_page_data(page) {
            Ok(_) => recovered += 1,
            Err(e) => tracing::warn!("Page {} could not be recovered: {}", page, e),
        }
    }

    Ok(RecoveryReport {
        database: recovery.database.clone(),
        wal: wal.summary(),
        recovered_pages: recovered,
        corrupted_pages: pager.corrupted_pages(),
        fallback_to_main_file: fallback,
        last_error: pager.last_error(),
    })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging; stdout carries the report
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // Load configuration (from file if SQLSALVAGE_CONFIG is set, then env overrides)
    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Failed to load config: {}", e);
            return Err(e.into());
        }
    };
    if let Err(e) = config.validate() {
        tracing::error!("{}", e);
        return Err(e.into());
    }

    tracing::info!("Starting WAL recovery");
    tracing::info!("  Database: {}", config.recovery.database.display());
    tracing::info!("  Page size: {}", config.recovery.page_size);
    match config.recovery.max_frame {
        Some(max) => tracing::info!("  Frame cap: {}", max),
        None => tracing::info!("  Frame cap: none"),
    }

    let report = run(&config)?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    tracing::info!(
        "Recovery finished: {} pages recovered, {} corrupted",
        report.recovered_pages,
        report.corrupted_pages.len()
    );
    Ok(())
}
