//! Persistent liquidation task queue.
//!
//! Borrowers found by the scan loop wait here for the liquidate loop. The
//! queue is FIFO, holds at most one record per borrower, and is written to
//! disk on every mutation so a crash never loses a queued candidate.

use crate::error::StoreError;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// One queued borrower.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationBorrower {
    pub borrower: String,
    #[serde(default = "Utc::now")]
    pub enqueued_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    borrowers: VecDeque<LiquidationBorrower>,
}

/// Deduplicated FIFO of borrowers awaiting liquidation.
pub struct TaskStore {
    path: Option<PathBuf>,
    records: Mutex<VecDeque<LiquidationBorrower>>,
}

impl TaskStore {
    /// Open the store at `path`, creating an empty one if the file is missing.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();

        let store = if path.exists() {
            let raw = fs::read_to_string(&path).map_err(|source| StoreError::Io {
                path: path.display().to_string(),
                source,
            })?;
            let file: StoreFile = serde_json::from_str(&raw).map_err(|source| StoreError::Serde {
                path: path.display().to_string(),
                source,
            })?;

            let loaded = file.borrowers.len();
            let mut records: VecDeque<LiquidationBorrower> = VecDeque::with_capacity(loaded);
            for record in file.borrowers {
                if !records.iter().any(|r| r.borrower == record.borrower) {
                    records.push_back(record);
                }
            }

            let store = Self {
                path: Some(path.clone()),
                records: Mutex::new(records),
            };
            let kept = store.len();
            if kept != loaded {
                warn!(
                    path = %path.display(),
                    dropped = loaded - kept,
                    "Dropped duplicate borrowers from store file"
                );
                store.persist(&store.records.lock())?;
            }
            info!(path = %path.display(), count = kept, "Reloaded liquidation store");
            store
        } else {
            let store = Self {
                path: Some(path.clone()),
                records: Mutex::new(VecDeque::new()),
            };
            store.persist(&store.records.lock())?;
            info!(path = %path.display(), "Liquidation store not found, created empty borrowers collection");
            store
        };

        Ok(store)
    }

    /// Store that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            records: Mutex::new(VecDeque::new()),
        }
    }

    /// Queue `borrower` unless already queued. Returns whether it was added.
    pub fn insert_borrower(&self, borrower: &str) -> Result<bool, StoreError> {
        let mut records = self.records.lock();
        if records.iter().any(|r| r.borrower == borrower) {
            debug!(borrower = borrower, "Borrower already stored");
            return Ok(false);
        }

        records.push_back(LiquidationBorrower {
            borrower: borrower.to_string(),
            enqueued_at: Utc::now(),
        });
        if let Err(e) = self.persist(&records) {
            records.pop_back();
            return Err(e);
        }

        debug!(borrower = borrower, "Borrower stored");
        Ok(true)
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn contains(&self, borrower: &str) -> bool {
        self.records.lock().iter().any(|r| r.borrower == borrower)
    }

    /// Queued borrowers, oldest first.
    pub fn borrowers(&self) -> Vec<String> {
        self.records
            .lock()
            .iter()
            .map(|r| r.borrower.clone())
            .collect()
    }

    /// Remove `borrower` wherever it is in the queue. `None` if not queued.
    pub fn shift_borrower(&self, borrower: &str) -> Result<Option<String>, StoreError> {
        let mut records = self.records.lock();
        let Some(index) = records.iter().position(|r| r.borrower == borrower) else {
            return Ok(None);
        };

        let removed = records.remove(index);
        if let Err(e) = self.persist(&records) {
            if let Some(record) = removed {
                records.insert(index, record);
            }
            return Err(e);
        }
        Ok(removed.map(|r| r.borrower))
    }

    /// Remove the oldest queued borrower. `None` if the queue is empty.
    pub fn shift_last(&self) -> Result<Option<String>, StoreError> {
        let mut records = self.records.lock();
        let Some(record) = records.pop_front() else {
            return Ok(None);
        };

        if let Err(e) = self.persist(&records) {
            records.push_front(record);
            return Err(e);
        }
        Ok(Some(record.borrower))
    }

    /// Write `records` through a synced temp file and rename it over the store.
    fn persist(&self, records: &VecDeque<LiquidationBorrower>) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let io_err = |source| StoreError::Io {
            path: path.display().to_string(),
            source,
        };

        let file = StoreFile {
            borrowers: records.clone(),
        };
        let json = serde_json::to_vec_pretty(&file).map_err(|source| StoreError::Serde {
            path: path.display().to_string(),
            source,
        })?;

        let tmp = temp_path(path);
        let mut file = File::create(&tmp).map_err(io_err)?;
        file.write_all(&json).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
        drop(file);

        fs::rename(&tmp, path).map_err(io_err)?;
        sync_parent(path).map_err(io_err)?;
        Ok(())
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

/// Make the rename itself durable.
#[cfg(unix)]
fn sync_parent(path: &Path) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_parent(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

impl std::fmt::Debug for TaskStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskStore")
            .field("path", &self.path)
            .field("len", &self.len())
            .finish()
    }
}
