//! One loader run
//!
//! Discovery, parsing, duplicate filtering and batch loading in strict
//! sequence. The pipeline is where results are observed and logged; the
//! components it drives stay quiet.

use crate::dedup::DuplicateFilter;
use crate::discovery::{DiscoveryReport, FileDiscovery};
use crate::loader::BatchLoader;
use crate::normalize::CdrNormalizer;
use crate::parser::{ParsedFile, RecordParser, RowSkipReason};
use rms_core::config::IngestConfig;
use rms_core::models::AuditEntry;
use rms_core::traits::{AuditSink, CdrStore};
use rms_core::{AppResult, LoaderError};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

const AUDIT_SOURCE: &str = "FileDiscovery";

/// A file that produced no records because of an error
#[derive(Debug, Clone, Serialize)]
pub struct FailedFile {
    pub path: PathBuf,
    pub cause: String,
}

/// Counters for one run
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub files_discovered: usize,
    pub files_parsed: usize,
    pub files_failed: Vec<FailedFile>,
    pub rows_parsed: usize,
    pub rows_skipped: usize,
    pub duplicates: usize,
    pub inserted: u64,
    pub batches: u64,
}

/// How a run ended
#[derive(Debug)]
pub enum RunOutcome {
    /// Discovery found nothing to parse
    NoFilesFound(RunSummary),
    Completed(RunSummary),
    /// Stopped on an unrecovered error; committed batches stay committed
    Aborted { summary: RunSummary, cause: LoaderError },
    /// Stopped on request; the unflushed buffer was dropped
    Cancelled(RunSummary),
}

impl RunOutcome {
    pub fn summary(&self) -> &RunSummary {
        match self {
            RunOutcome::NoFilesFound(summary)
            | RunOutcome::Completed(summary)
            | RunOutcome::Cancelled(summary) => summary,
            RunOutcome::Aborted { summary, .. } => summary,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::NoFilesFound(_) | RunOutcome::Completed(_))
    }

    /// Process exit code for this outcome
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::NoFilesFound(_) | RunOutcome::Completed(_) => 0,
            RunOutcome::Aborted { .. } => 1,
            RunOutcome::Cancelled(_) => 130,
        }
    }
}

/// Why the file loop stopped early
enum Halt {
    Abort(LoaderError),
    Cancel,
}

impl From<LoaderError> for Halt {
    fn from(err: LoaderError) -> Self {
        Halt::Abort(err)
    }
}

/// Sequential CDR loading pipeline
pub struct Pipeline {
    discovery: FileDiscovery,
    parser: RecordParser,
    batch_size: usize,
    continue_on_conversion_error: bool,
}

impl Pipeline {
    /// Build a pipeline from ingest settings
    pub fn new(config: &IngestConfig) -> AppResult<Self> {
        let zone = config.zone()?;
        Ok(Self {
            discovery: FileDiscovery::from_config(config),
            parser: RecordParser::new(CdrNormalizer::new(zone)),
            batch_size: config.batch_size,
            continue_on_conversion_error: config.continue_on_conversion_error,
        })
    }

    /// Load every export below `root` into `store`
    ///
    /// Never fails as a whole; the outcome carries the error that stopped
    /// the run, if any.
    #[instrument(skip(self, store, audit, cancel), fields(root = %root.display()))]
    pub async fn run<S, A>(
        &self,
        root: &Path,
        store: &S,
        audit: &mut A,
        cancel: &CancellationToken,
    ) -> RunOutcome
    where
        S: CdrStore + ?Sized,
        A: AuditSink + ?Sized,
    {
        let mut summary = RunSummary::default();

        let report = match self.discover(root).await {
            Ok(report) => report,
            Err(cause) => {
                error!("Discovery failed: {}", cause);
                return RunOutcome::Aborted { summary, cause };
            }
        };

        self.observe_discovery(&report, audit);
        summary.files_discovered = report.candidates.len();

        if report.candidates.is_empty() {
            info!("No files found under {}", root.display());
            return RunOutcome::NoFilesFound(summary);
        }

        info!("Discovered {} candidate files", summary.files_discovered);

        match store.ensure_table().await {
            Ok(true) => info!("Created CDR table"),
            Ok(false) => debug!("CDR table present"),
            Err(cause) => {
                error!("Schema check failed: {}", cause);
                return RunOutcome::Aborted { summary, cause };
            }
        }

        let mut filter = DuplicateFilter::new();
        let mut loader = BatchLoader::new(store, self.batch_size);

        let halt = self
            .load_files(&report.candidates, store, &mut filter, &mut loader, &mut summary, cancel)
            .await;

        let outcome = match halt {
            Ok(()) => match loader.flush().await {
                Ok(_) => None,
                Err(cause) => Some(Halt::Abort(cause)),
            },
            Err(halt) => Some(halt),
        };

        summary.inserted = loader.total_inserted();
        summary.batches = loader.batches();

        match outcome {
            None => {
                info!(
                    files = summary.files_parsed,
                    inserted = summary.inserted,
                    duplicates = summary.duplicates,
                    batches = summary.batches,
                    "Run completed"
                );
                RunOutcome::Completed(summary)
            }
            Some(Halt::Cancel) => {
                let dropped = loader.discard();
                warn!(
                    "Run cancelled, {} buffered records dropped, {} inserted",
                    dropped, summary.inserted
                );
                RunOutcome::Cancelled(summary)
            }
            Some(Halt::Abort(cause)) => {
                error!(
                    code = cause.error_code(),
                    inserted = summary.inserted,
                    "Run aborted: {}",
                    cause
                );
                RunOutcome::Aborted { summary, cause }
            }
        }
    }

    async fn discover(&self, root: &Path) -> AppResult<DiscoveryReport> {
        let discovery = self.discovery.clone();
        let root = root.to_path_buf();

        tokio::task::spawn_blocking(move || discovery.discover(&root))
            .await
            .map_err(|e| LoaderError::FileSystem(format!("Discovery task failed: {}", e)))?
    }

    fn observe_discovery<A: AuditSink + ?Sized>(&self, report: &DiscoveryReport, audit: &mut A) {
        for skipped in &report.skipped {
            if !skipped.reason.is_audited() {
                debug!("Skipping {}: {}", skipped.path.display(), skipped.reason);
                continue;
            }

            info!("Skipping {}: {}", skipped.path.display(), skipped.reason);
            let entry = AuditEntry::new(
                AUDIT_SOURCE,
                skipped.path.display().to_string(),
                skipped.reason.to_string(),
            );
            if let Err(e) = audit.record(&entry) {
                error!("Cannot write audit entry for {}: {}", skipped.path.display(), e);
            }
        }

        if let Err(e) = audit.flush() {
            error!("Cannot flush audit log: {}", e);
        }

        for (path, cause) in &report.walk_errors {
            match path {
                Some(path) => warn!("Cannot walk {}: {}", path.display(), cause),
                None => warn!("Walk error: {}", cause),
            }
        }
    }

    async fn load_files<S: CdrStore + ?Sized>(
        &self,
        candidates: &[PathBuf],
        store: &S,
        filter: &mut DuplicateFilter,
        loader: &mut BatchLoader<'_, S>,
        summary: &mut RunSummary,
        cancel: &CancellationToken,
    ) -> Result<(), Halt> {
        for path in candidates {
            if cancel.is_cancelled() {
                return Err(Halt::Cancel);
            }

            debug!("Reading file: {}", path.display());

            let parsed = match self.parser.parse_file(path).await {
                Ok(parsed) => parsed,
                Err(cause) => {
                    // An unreadable entry only costs that path; bad contents
                    // stop the run unless configured otherwise
                    if cause.is_file_scoped() && !self.continue_on_conversion_error {
                        error!("Aborting on {}: {}", path.display(), cause);
                        // Records of completed files are kept
                        loader.flush().await?;
                        return Err(Halt::Abort(cause));
                    }
                    warn!("Skipping {}: {}", path.display(), cause);
                    summary.files_failed.push(FailedFile {
                        path: path.clone(),
                        cause: cause.to_string(),
                    });
                    continue;
                }
            };

            self.observe_rows(path, &parsed);
            summary.files_parsed += 1;
            summary.rows_parsed += parsed.records.len();
            summary.rows_skipped += parsed.short_rows().count();

            let admission = filter.admit(store, parsed.records).await?;
            for duplicate in &admission.duplicates {
                debug!(
                    "Duplicate CDR {} in {}, skipped",
                    duplicate.identity_key(),
                    path.display()
                );
            }
            summary.duplicates += admission.duplicates.len();

            info!(
                "{}: {} admitted, {} duplicates",
                path.display(),
                admission.admitted.len(),
                admission.duplicates.len()
            );

            for record in admission.admitted {
                let flushed = loader.push(record).await?;
                if flushed && cancel.is_cancelled() {
                    return Err(Halt::Cancel);
                }
            }
        }

        Ok(())
    }

    fn observe_rows(&self, path: &Path, parsed: &ParsedFile) {
        for skip in &parsed.skipped_rows {
            match skip.reason {
                RowSkipReason::Header => {}
                RowSkipReason::TooFewColumns { .. } => {
                    warn!("Skipping line {} of {}: {}", skip.line, path.display(), skip.reason)
                }
            }
        }
    }
}
