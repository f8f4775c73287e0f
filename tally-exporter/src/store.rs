// Tally Exporter - Durable snapshot store
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! JSON file store for counter snapshots.
//!
//! The file holds the last displayed state next to the snapshot attributes:
//!
//! ```json
//! {"state": "1234", "attributes": {"value": 1234, "old_value": 17, "uptime_sec": 3600}}
//! ```
//!
//! Writes go to a sibling temp file which is then renamed over the target,
//! so a crash mid-write leaves the previous snapshot intact.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tally::SnapshotRecord;
use tokio::sync::watch;
use tracing::{debug, error, warn};

/// Store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Corrupt snapshot file {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode snapshot: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Snapshot persisted as a single JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// Store backed by `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Snapshot file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored record, `Ok(None)` when there is none yet.
    pub fn load(&self) -> Result<Option<SnapshotRecord>, StoreError> {
        let data = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        serde_json::from_str(&data)
            .map(Some)
            .map_err(|source| StoreError::Corrupt {
                path: self.path.clone(),
                source,
            })
    }

    /// Load the stored record, treating unreadable files as absent.
    pub fn load_or_none(&self) -> Option<SnapshotRecord> {
        match self.load() {
            Ok(record) => record,
            Err(e) => {
                warn!("Ignoring stored state: {}", e);
                None
            }
        }
    }

    /// Atomically replace the stored record.
    pub fn save(&self, record: &SnapshotRecord) -> Result<(), StoreError> {
        let data = serde_json::to_vec_pretty(record)?;
        let tmp = self.temp_path();
        let io_err = |source| StoreError::Io {
            path: tmp.clone(),
            source,
        };

        fs::write(&tmp, data).map_err(io_err)?;
        fs::rename(&tmp, &self.path).map_err(io_err)?;
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

/// Write every new record published on `rx` until the sender is dropped.
///
/// Records published faster than they can be written are coalesced; only
/// the latest one reaches the disk. Write failures are logged and dropped.
pub async fn run_persister(store: JsonFileStore, mut rx: watch::Receiver<Option<SnapshotRecord>>) {
    while rx.changed().await.is_ok() {
        let Some(record) = rx.borrow_and_update().clone() else {
            continue;
        };

        let writer = store.clone();
        match tokio::task::spawn_blocking(move || writer.save(&record)).await {
            Ok(Ok(())) => debug!("Snapshot written to {}", store.path().display()),
            Ok(Err(e)) => error!("Failed to persist snapshot: {}", e),
            Err(e) => error!("Persist task failed: {}", e),
        }
    }
    debug!("Persister stopped");
}
