// Tally Exporter - Error types
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Exporter errors.

use std::io;
use std::path::PathBuf;

/// Errors that stop the exporter or one of its ingestion sources.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Failed to read config {path}: {source}")]
    ReadConfig {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid config: {0}")]
    Config(#[from] tally::TallyError),

    #[cfg(feature = "replay")]
    #[error("Replay error: {0}")]
    Replay(#[from] crate::replay::ReplayError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Counter worker stopped")]
    WorkerGone,
}
