//! Durable storage behind the audit log.
//!
//! A sink must be all-or-nothing per batch: either every record is on
//! stable storage when `persist` returns `Ok`, or none of them is. When a
//! failed write cannot be rolled back the sink reports itself inconsistent
//! and the log refuses further appends.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use log::{error, warn};

use aegis_core::{TrustError, TrustResult};

use crate::entry::AuditEntry;

pub trait AuditSink: Send {
    /// Writes a batch of consecutive entries durably, all or nothing.
    fn persist(&mut self, entries: &[AuditEntry]) -> TrustResult<()>;

    /// Flushes anything buffered to stable storage.
    fn sync(&mut self) -> TrustResult<()>;

    /// False once a failed write could not be undone.
    fn is_consistent(&self) -> bool {
        true
    }

    fn describe(&self) -> String;
}

/// Keeps serialized records in memory. Used for ephemeral logs and tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Vec<String>,
}

impl MemorySink {
    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}

impl AuditSink for MemorySink {
    fn persist(&mut self, entries: &[AuditEntry]) -> TrustResult<()> {
        let lines = entries
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()?;
        self.lines.extend(lines);
        Ok(())
    }

    fn sync(&mut self) -> TrustResult<()> {
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

/// Append-only JSON Lines file, one entry per line.
#[derive(Debug)]
pub struct JsonlFileSink {
    path: PathBuf,
    file: File,
    /// Length of the file up to the last acknowledged record
    committed_len: u64,
    sync_on_append: bool,
    consistent: bool,
}

impl JsonlFileSink {
    /// Opens (or creates) the file for appending.
    pub fn open(path: impl AsRef<Path>, sync_on_append: bool) -> TrustResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let committed_len = file.metadata()?.len();
        Ok(Self {
            path,
            file,
            committed_len,
            sync_on_append,
            consistent: true,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_buffer(&mut self, buffer: &[u8]) -> std::io::Result<()> {
        self.file.write_all(buffer)?;
        self.file.flush()?;
        if self.sync_on_append {
            self.file.sync_data()?;
        }
        Ok(())
    }
}

impl AuditSink for JsonlFileSink {
    fn persist(&mut self, entries: &[AuditEntry]) -> TrustResult<()> {
        if !self.consistent {
            return Err(TrustError::Integrity(format!(
                "audit file {} has an unrecoverable partial write",
                self.path.display()
            )));
        }

        // One buffer, one write: the batch lands or is truncated away together
        let mut buffer = Vec::new();
        for entry in entries {
            serde_json::to_writer(&mut buffer, entry)?;
            buffer.push(b'\n');
        }

        if let Err(err) = self.write_buffer(&buffer) {
            warn!(
                "audit write to {} failed ({}); truncating to {} bytes",
                self.path.display(),
                err,
                self.committed_len
            );
            let rollback = self
                .file
                .set_len(self.committed_len)
                .and_then(|_| self.file.sync_data());
            if let Err(rollback_err) = rollback {
                error!(
                    "audit file {} could not be rolled back: {}",
                    self.path.display(),
                    rollback_err
                );
                self.consistent = false;
            }
            return Err(TrustError::Io(err));
        }

        self.committed_len += buffer.len() as u64;
        Ok(())
    }

    fn sync(&mut self) -> TrustResult<()> {
        self.file.sync_all()?;
        Ok(())
    }

    fn is_consistent(&self) -> bool {
        self.consistent
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Reads every entry from a JSON Lines audit file.
///
/// A line that does not parse, or a final record without its terminating
/// newline, is a corrupt tail and fails with `Integrity`.
pub fn load_entries(path: impl AsRef<Path>) -> TrustResult<Vec<AuditEntry>> {
    let path = path.as_ref();
    let mut raw = String::new();
    File::open(path)?.read_to_string(&mut raw)?;

    if !raw.is_empty() && !raw.ends_with('\n') {
        return Err(TrustError::Integrity(format!(
            "audit file {} ends with an unterminated record",
            path.display()
        )));
    }

    let mut entries = Vec::new();
    for (line_no, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let entry: AuditEntry = serde_json::from_str(line).map_err(|e| {
            TrustError::Integrity(format!(
                "audit file {} line {} is corrupt: {}",
                path.display(),
                line_no + 1,
                e
            ))
        })?;
        entries.push(entry);
    }
    Ok(entries)
}
