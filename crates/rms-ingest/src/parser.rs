//! CDR export parser
//!
//! Turns the bytes of one export file into normalized records. The parser
//! does not log; skipped rows are returned alongside the records so the
//! pipeline can report them.

use crate::constants::{DELIMITER, HEADER_MARKER, MIN_COLUMNS};
use crate::normalize::{CdrNormalizer, RawRow};
use crate::sanitize::sanitize;
use csv::ReaderBuilder;
use rms_core::models::RmsCdr;
use rms_core::{AppResult, LoaderError};
use std::fmt;
use std::path::Path;

/// Why a row was left out
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowSkipReason {
    /// Fewer columns than a data row carries
    TooFewColumns { found: usize },
    /// The column header line
    Header,
}

impl fmt::Display for RowSkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowSkipReason::TooFewColumns { found } => {
                write!(f, "too few columns ({} of {})", found, MIN_COLUMNS)
            }
            RowSkipReason::Header => write!(f, "header row"),
        }
    }
}

/// A row that produced no record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowSkip {
    /// 1-based line number in the sanitized text
    pub line: usize,
    pub reason: RowSkipReason,
}

/// Result of parsing one file
#[derive(Debug, Default)]
pub struct ParsedFile {
    pub records: Vec<RmsCdr>,
    pub skipped_rows: Vec<RowSkip>,
}

impl ParsedFile {
    /// Rows skipped for their shape, headers excluded
    pub fn short_rows(&self) -> impl Iterator<Item = &RowSkip> {
        self.skipped_rows
            .iter()
            .filter(|s| matches!(s.reason, RowSkipReason::TooFewColumns { .. }))
    }
}

/// Parses semicolon-delimited CDR exports
#[derive(Debug, Clone)]
pub struct RecordParser {
    normalizer: CdrNormalizer,
}

impl RecordParser {
    pub fn new(normalizer: CdrNormalizer) -> Self {
        Self { normalizer }
    }

    /// Read and parse one file from disk
    pub async fn parse_file(&self, path: &Path) -> AppResult<ParsedFile> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            LoaderError::FileSystem(format!("Cannot read {}: {}", path.display(), e))
        })?;

        self.parse_bytes(&bytes, &path.display().to_string())
    }

    /// Parse the raw contents of a file
    ///
    /// `source` names the file in error messages. A field that fails to
    /// convert aborts the whole file and no records are returned.
    pub fn parse_bytes(&self, bytes: &[u8], source: &str) -> AppResult<ParsedFile> {
        let text = sanitize(bytes);

        let mut reader = ReaderBuilder::new()
            .delimiter(DELIMITER)
            .has_headers(false)
            .flexible(true)
            .from_reader(text.as_bytes());

        let mut parsed = ParsedFile::default();

        for (index, result) in reader.records().enumerate() {
            let record = result.map_err(|e| {
                LoaderError::Parse(format!("Malformed CSV in {}: {}", source, e))
            })?;

            let line = record
                .position()
                .map(|p| p.line() as usize)
                .unwrap_or(index + 1);

            let fields: Vec<&str> = record.iter().collect();

            let Some(row) = RawRow::from_fields(&fields) else {
                parsed.skipped_rows.push(RowSkip {
                    line,
                    reason: RowSkipReason::TooFewColumns {
                        found: fields.len(),
                    },
                });
                continue;
            };

            if row.direction.contains(HEADER_MARKER) {
                parsed.skipped_rows.push(RowSkip {
                    line,
                    reason: RowSkipReason::Header,
                });
                continue;
            }

            let cdr = self
                .normalizer
                .normalize(&row)
                .map_err(|e| e.at(source, line))?;

            parsed.records.push(cdr);
        }

        Ok(parsed)
    }
}
