//! Append-only JSON-lines disk sink.
//!
//! Every write takes the per-path lock from [`LogFileWriters`], so concurrent
//! calls (and several sinks pointing at the same file) never interleave
//! partial lines.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use tracing::debug;

use super::log_file::LogFileCreator;
use crate::application::events::{AuditEvent, AuditRecord};
use crate::application::ports::AuditSink;
use crate::domain::SinkError;

/// Idle locks kept before [`LogFileWriters`] prunes them.
const MAX_IDLE_LOCKS: usize = 64;

/// One lock per log file path.
///
/// Paths roll over (one file per operation per day), so once more than
/// [`MAX_IDLE_LOCKS`] entries exist the ones no writer currently holds are
/// dropped. A later write to a pruned path simply creates a fresh lock.
#[derive(Debug, Clone, Default)]
pub struct LogFileWriters {
    locks: Arc<DashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl LogFileWriters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `line` to `path`, creating parent directories on first use.
    pub fn append(&self, path: &Path, line: &str) -> Result<(), SinkError> {
        let lock = self
            .locks
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        if self.locks.len() > MAX_IDLE_LOCKS {
            self.prune_idle();
        }
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
                debug!(dir = %parent.display(), "Audit log directory created");
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    /// Drop locks only the map references. A writer clones its lock under
    /// the shard lock, so an entry with no outside clone has no writer.
    fn prune_idle(&self) {
        let before = self.locks.len();
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        debug!(before, after = self.locks.len(), "Idle audit log locks pruned");
    }

    pub fn open_files(&self) -> usize {
        self.locks.len()
    }
}

pub struct DiskSink {
    files: LogFileCreator,
    writers: LogFileWriters,
}

impl DiskSink {
    pub fn new(files: LogFileCreator) -> Self {
        Self::with_writers(files, LogFileWriters::new())
    }

    /// Share file locks with other disk sinks.
    pub fn with_writers(files: LogFileCreator, writers: LogFileWriters) -> Self {
        Self { files, writers }
    }

    pub fn files(&self) -> &LogFileCreator {
        &self.files
    }
}

impl AuditSink for DiskSink {
    fn record(&self, event: &AuditEvent<'_>) -> Result<(), SinkError> {
        let path = self.files.path_for_event(event);
        let line = AuditRecord::from_event(event).to_line()?;
        self.writers.append(&path, &line)
    }
}
