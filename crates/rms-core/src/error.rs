//! Unified error handling for the RMS loader
//!
//! `LoaderError` covers every failure that can leave a component. Row-shape
//! problems are not errors; the parser reports them as skipped rows.

use thiserror::Error;

/// Main loader error type
#[derive(Error, Debug)]
pub enum LoaderError {
    // ==================== Filesystem Errors ====================
    #[error("File system error: {0}")]
    FileSystem(String),

    // ==================== Parsing Errors ====================
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Conversion error in {file} at line {line}: {message}")]
    Conversion {
        file: String,
        line: usize,
        message: String,
    },

    // ==================== Storage Errors ====================
    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Transaction failed: {0}")]
    Transaction(String),

    #[error("Connection error: {0}")]
    Connection(String),

    // ==================== Configuration Errors ====================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl LoaderError {
    /// Returns the error code used in logs and run summaries
    pub fn error_code(&self) -> &'static str {
        match self {
            LoaderError::FileSystem(_) => "file_system_error",
            LoaderError::Parse(_) => "parse_error",
            LoaderError::Conversion { .. } => "conversion_error",
            LoaderError::Persistence(_) => "persistence_error",
            LoaderError::Transaction(_) => "transaction_error",
            LoaderError::Connection(_) => "connection_error",
            LoaderError::Config(_) => "config_error",
            LoaderError::Validation(_) => "validation_error",
        }
    }

    /// True for errors caused by the contents of one input file
    pub fn is_file_scoped(&self) -> bool {
        matches!(
            self,
            LoaderError::Parse(_) | LoaderError::Conversion { .. }
        )
    }

    /// True for storage failures that must stop the run
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            LoaderError::Persistence(_) | LoaderError::Transaction(_) | LoaderError::Connection(_)
        )
    }
}

/// A single field that could not be converted
///
/// Produced by the normalizer grammars; the parser attaches the file and
/// line before it leaves the crate as `LoaderError::Conversion`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot convert {field} value {value:?}: {reason}")]
pub struct ConversionError {
    pub field: &'static str,
    pub value: String,
    pub reason: String,
}

impl ConversionError {
    pub fn new(field: &'static str, value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field,
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Attach the file and line the value was read from
    pub fn at(self, file: impl Into<String>, line: usize) -> LoaderError {
        LoaderError::Conversion {
            file: file.into(),
            line,
            message: self.to_string(),
        }
    }
}

// ==================== From implementations ====================

impl From<std::io::Error> for LoaderError {
    fn from(err: std::io::Error) -> Self {
        LoaderError::FileSystem(err.to_string())
    }
}

impl From<serde_json::Error> for LoaderError {
    fn from(err: serde_json::Error) -> Self {
        LoaderError::Parse(err.to_string())
    }
}

impl From<config::ConfigError> for LoaderError {
    fn from(err: config::ConfigError) -> Self {
        LoaderError::Config(err.to_string())
    }
}

impl From<validator::ValidationErrors> for LoaderError {
    fn from(err: validator::ValidationErrors) -> Self {
        LoaderError::Validation(err.to_string())
    }
}
