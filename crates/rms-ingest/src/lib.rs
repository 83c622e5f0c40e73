//! CDR ingestion pipeline for the RMS loader
//!
//! This crate turns a folder tree of vendor CDR exports into loaded rows:
//!
//! - `discovery` - recursive walk and candidate filtering
//! - `sanitize` - BOM strip, legacy decode, line ending cleanup
//! - `normalize` - per-field conversion grammars
//! - `parser` - tokenizing and row filtering
//! - `dedup` - identity key lookup against storage
//! - `loader` - bounded transactional batch inserts
//! - `audit` - the analysis log of skipped file entries
//! - `pipeline` - one sequential run with a typed outcome
//!
//! Everything runs in strict sequence; the only suspension points are file
//! reads and storage round trips.

pub mod audit;
pub mod dedup;
pub mod discovery;
pub mod loader;
pub mod normalize;
pub mod parser;
pub mod pipeline;
pub mod sanitize;

pub use audit::FileAuditLog;
pub use dedup::{Admission, DuplicateFilter};
pub use discovery::{DiscoveryReport, FileDiscovery, SkipReason, SkippedEntry};
pub use loader::BatchLoader;
pub use normalize::CdrNormalizer;
pub use parser::{ParsedFile, RecordParser, RowSkip, RowSkipReason};
pub use pipeline::{FailedFile, Pipeline, RunOutcome, RunSummary};

/// Ingest constants
pub mod constants {
    /// Minimum number of columns in a data row
    pub const MIN_COLUMNS: usize = 12;

    /// Text in the first column that marks the header row
    pub const HEADER_MARKER: &str = "Direction";

    /// Column delimiter used by the exporting system
    pub const DELIMITER: u8 = b';';

    /// Civil timestamp layout of the export
    pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    /// Shortest string that can hold a `TIMESTAMP_FORMAT` value
    pub const TIMESTAMP_MIN_LEN: usize = 19;
}
