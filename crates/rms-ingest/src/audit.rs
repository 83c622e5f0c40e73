//! Analysis log of skipped file entries
//!
//! One JSON object per line, appended across runs.

use rms_core::models::AuditEntry;
use rms_core::traits::AuditSink;
use rms_core::{AppResult, LoaderError};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

pub struct FileAuditLog {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl FileAuditLog {
    /// Open `path` for appending, creating it and its parent folders
    pub fn open(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                LoaderError::FileSystem(format!(
                    "Cannot create audit log folder {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| {
                LoaderError::FileSystem(format!("Cannot open audit log {}: {}", path.display(), e))
            })?;

        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for FileAuditLog {
    fn record(&mut self, entry: &AuditEntry) -> io::Result<()> {
        serde_json::to_writer(&mut self.writer, entry)?;
        self.writer.write_all(b"\n")
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}
