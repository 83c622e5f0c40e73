//! RMS CDR Loader
//!
//! Walks the configured export tree once, loads new call detail records into
//! PostgreSQL and exits with a code describing how the run ended.

use anyhow::Context;
use rms_core::config::LoggingConfig;
use rms_core::traits::CdrStore;
use rms_core::LoaderConfig;
use rms_db::{connect_with_retry, PgCdrStore};
use rms_ingest::{FileAuditLog, Pipeline, RunOutcome};
use std::env;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing/logging
fn init_tracing(logging: &LoggingConfig) {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| logging.level.clone());

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "rms_loader={},rms_ingest={},rms_db={},rms_core={},sqlx=warn",
            log_level, log_level, log_level, log_level
        ))
    });

    let registry = tracing_subscriber::registry().with(env_filter);

    if logging.json {
        registry
            .with(fmt::layer().json().with_target(true).with_current_span(true))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .init();
    }
}

/// Cancel `token` on Ctrl-C or SIGTERM
fn spawn_shutdown_listener(token: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Cannot listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    error!("Cannot listen for SIGTERM: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }

        warn!("Shutdown requested, stopping after the current step");
        token.cancel();
    });
}

async fn load(config: &LoaderConfig) -> anyhow::Result<RunOutcome> {
    std::fs::create_dir_all(&config.paths.temp_storage).with_context(|| {
        format!(
            "Cannot create temp storage {}",
            config.paths.temp_storage.display()
        )
    })?;

    let mut audit = FileAuditLog::open(&config.paths.analysis_log)?;
    info!("Analysis log: {}", audit.path().display());

    let pool = connect_with_retry(&config.database)
        .await
        .context("Database unavailable")?;
    let store = PgCdrStore::new(pool, &config.database.table)?;

    let pipeline = Pipeline::new(&config.ingest)?;

    let cancel = CancellationToken::new();
    spawn_shutdown_listener(cancel.clone());

    info!("Scanning {}", config.scan_root().display());
    let outcome = pipeline
        .run(config.scan_root(), &store, &mut audit, &cancel)
        .await;

    match store.count().await {
        Ok(total) => info!("Table {} holds {} records", config.database.table, total),
        Err(e) => warn!("Cannot count stored records: {}", e),
    }

    Ok(outcome)
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = match LoaderConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    init_tracing(&config.logging);

    info!("Starting RMS loader v{}", env!("CARGO_PKG_VERSION"));

    let outcome = match load(&config).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("Loader failed to start: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    let summary = outcome.summary();
    for failed in &summary.files_failed {
        warn!("Failed file {}: {}", failed.path.display(), failed.cause);
    }

    match &outcome {
        RunOutcome::NoFilesFound(_) => info!("No files found, nothing loaded"),
        RunOutcome::Completed(summary) => info!(
            "Loaded {} records from {} files ({} duplicates, {} batches)",
            summary.inserted, summary.files_parsed, summary.duplicates, summary.batches
        ),
        RunOutcome::Aborted { summary, cause } => error!(
            "Run aborted after {} records: {}",
            summary.inserted, cause
        ),
        RunOutcome::Cancelled(summary) => warn!(
            "Run cancelled after {} records",
            summary.inserted
        ),
    }

    ExitCode::from(outcome.exit_code() as u8)
}
