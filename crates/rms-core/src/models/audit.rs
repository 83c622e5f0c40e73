//! Audit log entry model
//!
//! One line of the analysis log written for every file entry the discovery
//! walk refuses to parse.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A skipped file entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// When the entry was written
    pub recorded_at: DateTime<Utc>,

    /// Component that refused the entry
    pub called_from: String,

    /// Full path of the entry
    pub path: String,

    /// Human readable reason
    pub reason: String,
}

impl AuditEntry {
    pub fn new(
        called_from: impl Into<String>,
        path: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            recorded_at: Utc::now(),
            called_from: called_from.into(),
            path: path.into(),
            reason: reason.into(),
        }
    }
}
