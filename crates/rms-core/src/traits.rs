//! Common traits for storage and audit collaborators
//!
//! The ingest pipeline only talks to storage and to the audit log through
//! these abstractions; the bootstrap decides the concrete implementations.

use crate::error::LoaderError;
use crate::models::{AuditEntry, IdentityKey, RmsCdr};
use async_trait::async_trait;
use std::collections::HashSet;

/// Persistent CDR storage
#[async_trait]
pub trait CdrStore: Send + Sync {
    /// Make sure the target table exists
    ///
    /// Returns `true` when the table had to be created.
    async fn ensure_table(&self) -> Result<bool, LoaderError>;

    /// Return the subset of `keys` already present in storage
    async fn existing_keys(&self, keys: &[IdentityKey]) -> Result<HashSet<IdentityKey>, LoaderError>;

    /// Insert all records in one transaction
    ///
    /// Returns the number of rows written. Either every row is committed or
    /// none is.
    async fn insert_batch(&self, records: &[RmsCdr]) -> Result<u64, LoaderError>;

    /// Count stored records
    async fn count(&self) -> Result<i64, LoaderError>;
}

/// Append-only sink for skipped file entries
pub trait AuditSink: Send {
    /// Write one entry
    fn record(&mut self, entry: &AuditEntry) -> std::io::Result<()>;

    /// Flush buffered entries to the underlying medium
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl AuditSink for Vec<AuditEntry> {
    fn record(&mut self, entry: &AuditEntry) -> std::io::Result<()> {
        self.push(entry.clone());
        Ok(())
    }
}
