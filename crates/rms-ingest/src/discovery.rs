//! Export file discovery
//!
//! A fresh recursive walk of the scan root on every run. Discovery only
//! reports what it saw; the pipeline decides what to log and audit.

use rms_core::config::IngestConfig;
use rms_core::{AppResult, LoaderError};
use std::fmt;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Why an entry is not a candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Name starts with `.`
    Hidden,
    /// Name lacks the configured extension marker
    WrongExtension,
    /// Name longer than the persisted column allows
    NameTooLong { len: usize },
    /// Numbered top-level folder below the configured start folder
    BelowStartFolder,
}

impl SkipReason {
    /// Whether the skip belongs in the analysis log
    pub fn is_audited(&self) -> bool {
        matches!(self, SkipReason::WrongExtension | SkipReason::NameTooLong { .. })
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Hidden => write!(f, "hidden entry"),
            SkipReason::WrongExtension => write!(f, "wrong extension"),
            SkipReason::NameTooLong { len } => write!(f, "file name too long ({} characters)", len),
            SkipReason::BelowStartFolder => write!(f, "folder below start folder"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    pub path: PathBuf,
    pub reason: SkipReason,
}

/// Everything one walk produced
#[derive(Debug, Default)]
pub struct DiscoveryReport {
    /// Files to parse, in file-name order per directory
    pub candidates: Vec<PathBuf>,
    pub skipped: Vec<SkippedEntry>,
    /// Paths the walk could not read, with the cause
    pub walk_errors: Vec<(Option<PathBuf>, String)>,
}

/// Candidate filter for the export tree
#[derive(Debug, Clone)]
pub struct FileDiscovery {
    extension: String,
    max_name_len: usize,
    start_folder: Option<u32>,
}

impl FileDiscovery {
    pub fn new(extension: impl Into<String>, max_name_len: usize, start_folder: Option<u32>) -> Self {
        Self {
            extension: extension.into(),
            max_name_len,
            start_folder,
        }
    }

    pub fn from_config(config: &IngestConfig) -> Self {
        Self::new(
            config.extension.clone(),
            config.max_file_name_len,
            config.start_folder,
        )
    }

    /// Walk `root` and classify every entry
    ///
    /// Fails only when the root itself cannot be listed; unreadable paths
    /// further down are collected in `walk_errors`.
    pub fn discover(&self, root: &Path) -> AppResult<DiscoveryReport> {
        std::fs::read_dir(root).map_err(|e| {
            LoaderError::FileSystem(format!("Cannot read scan root {}: {}", root.display(), e))
        })?;

        let mut report = DiscoveryReport::default();
        let mut walker = WalkDir::new(root).sort_by_file_name().into_iter();

        while let Some(next) = walker.next() {
            let entry = match next {
                Ok(entry) => entry,
                Err(e) => {
                    report
                        .walk_errors
                        .push((e.path().map(Path::to_path_buf), e.to_string()));
                    continue;
                }
            };

            let name = entry.file_name().to_string_lossy().into_owned();

            if entry.file_type().is_dir() {
                if entry.depth() == 1 && self.below_start_folder(&name) {
                    walker.skip_current_dir();
                    report.skipped.push(SkippedEntry {
                        path: entry.into_path(),
                        reason: SkipReason::BelowStartFolder,
                    });
                }
                continue;
            }

            match self.classify(&name) {
                Some(reason) => report.skipped.push(SkippedEntry {
                    path: entry.into_path(),
                    reason,
                }),
                None => report.candidates.push(entry.into_path()),
            }
        }

        Ok(report)
    }

    /// Reason a file name is refused, if any
    pub fn classify(&self, name: &str) -> Option<SkipReason> {
        if name.starts_with('.') {
            return Some(SkipReason::Hidden);
        }

        if !name.contains(&self.extension) {
            return Some(SkipReason::WrongExtension);
        }

        let len = name.chars().count();
        if len > self.max_name_len {
            return Some(SkipReason::NameTooLong { len });
        }

        None
    }

    fn below_start_folder(&self, name: &str) -> bool {
        match (self.start_folder, name.parse::<u32>()) {
            (Some(start), Ok(number)) => number < start,
            _ => false,
        }
    }
}
