// Tally Exporter - Capture replay engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Replays recorded MQTT traffic from a CSV capture.
//!
//! The capture has one message per row:
//!
//! ```text
//! timestamp_ms,topic,payload
//! 1000,tele/water_in/LWT,Online
//! 1500,tele/water_in/SENSOR,"{""COUNTER"":{""C1"":0}}"
//! ```
//!
//! Rows are fed through the same decoder as live input, paced by the
//! timestamp deltas divided by the replay speed.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::error::AgentError;
use crate::ingest::Forwarder;
use crate::metrics::update_replay_metrics;

/// Configuration for capture replay.
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    /// Path to the CSV capture.
    pub csv_path: PathBuf,
    /// Replay speed multiplier (1.0 = real-time, 10.0 = 10x faster).
    pub speed: f64,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            csv_path: PathBuf::new(),
            speed: 1.0,
        }
    }
}

/// State of the replay engine.
#[derive(Debug, Default)]
pub struct ReplayState {
    /// Rows replayed so far.
    pub position: AtomicUsize,
    /// Total rows in the capture.
    pub total_rows: AtomicUsize,
    /// Whether replay is running.
    pub running: AtomicBool,
}

/// One captured message.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
struct CaptureRow {
    timestamp_ms: u64,
    topic: String,
    payload: String,
}

/// Capture information.
#[derive(Debug, Clone)]
pub struct CaptureInfo {
    pub row_count: usize,
    pub duration_ms: u64,
}

/// Feeds a recorded capture to the worker.
pub struct ReplayEngine {
    config: ReplayConfig,
    state: Arc<ReplayState>,
    rows: Vec<CaptureRow>,
}

impl ReplayEngine {
    /// Load a capture from a CSV file.
    pub fn from_csv(config: ReplayConfig) -> Result<Self, ReplayError> {
        if !config.speed.is_finite() || config.speed <= 0.0 {
            return Err(ReplayError::InvalidSpeed(config.speed));
        }
        if !config.csv_path.exists() {
            return Err(ReplayError::FileNotFound(config.csv_path.clone()));
        }

        let rows = Self::parse_csv(&config.csv_path)?;
        if rows.is_empty() {
            return Err(ReplayError::EmptyCapture);
        }

        let state = Arc::new(ReplayState::default());
        state.total_rows.store(rows.len(), Ordering::SeqCst);
        info!(
            "Loaded capture {}: {} rows",
            config.csv_path.display(),
            rows.len()
        );

        Ok(Self {
            config,
            state,
            rows,
        })
    }

    /// Parse a CSV capture.
    fn parse_csv(path: &Path) -> Result<Vec<CaptureRow>, ReplayError> {
        let mut reader = csv::Reader::from_path(path)?;

        let headers = reader.headers()?;
        if headers.get(0) != Some("timestamp_ms") {
            return Err(ReplayError::InvalidFormat(
                "First column must be 'timestamp_ms'".to_string(),
            ));
        }

        reader
            .deserialize()
            .collect::<Result<Vec<CaptureRow>, _>>()
            .map_err(ReplayError::from)
    }

    /// Get the replay state.
    pub fn state(&self) -> Arc<ReplayState> {
        Arc::clone(&self.state)
    }

    /// Replay every row once.
    ///
    /// Returns the number of messages that reached the worker.
    pub async fn run(&self, forwarder: &Forwarder) -> Result<usize, AgentError> {
        self.state.running.store(true, Ordering::SeqCst);
        info!("Starting replay: speed={}", self.config.speed);

        let mut forwarded = 0;
        for (position, row) in self.rows.iter().enumerate() {
            debug!("Replaying row {} at {}ms", position, row.timestamp_ms);
            match forwarder.forward(&row.topic, row.payload.as_bytes()).await {
                Ok(true) => forwarded += 1,
                Ok(false) => {}
                Err(e) => {
                    self.state.running.store(false, Ordering::SeqCst);
                    return Err(e);
                }
            }

            self.state.position.store(position + 1, Ordering::SeqCst);
            update_replay_metrics(position + 1, self.rows.len(), self.config.speed);

            if let Some(next) = self.rows.get(position + 1) {
                let delta_ms = next.timestamp_ms.saturating_sub(row.timestamp_ms);
                let sleep_ms = (delta_ms as f64 / self.config.speed) as u64;
                if sleep_ms > 0 {
                    sleep(Duration::from_millis(sleep_ms)).await;
                }
            }
        }

        self.state.running.store(false, Ordering::SeqCst);
        info!("Capture complete, {} message(s) forwarded", forwarded);
        Ok(forwarded)
    }

    /// Get capture info.
    pub fn capture_info(&self) -> CaptureInfo {
        let duration_ms = match (self.rows.first(), self.rows.last()) {
            (Some(first), Some(last)) => last.timestamp_ms.saturating_sub(first.timestamp_ms),
            _ => 0,
        };

        CaptureInfo {
            row_count: self.rows.len(),
            duration_ms,
        }
    }
}

/// Replay errors.
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Invalid replay speed: {0}")]
    InvalidSpeed(f64),

    #[error("Empty capture")]
    EmptyCapture,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::WorkerEvent;
    use std::io::Write;
    use tally_tasmota::{Availability, TelemetryMessage};
    use tempfile::NamedTempFile;
    use tokio::sync::mpsc;

    fn create_test_csv() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "timestamp_ms,topic,payload").unwrap();
        writeln!(file, "1000,tele/water_in/LWT,Online").unwrap();
        writeln!(file, r#"1001,tele/water_in/STATE,"{{""UptimeSec"":23}}""#).unwrap();
        writeln!(file, r#"1002,tele/water_in/SENSOR,"{{""COUNTER"":{{""C1"":4}}}}""#).unwrap();
        writeln!(file, r#"1003,tele/other/SENSOR,"{{""COUNTER"":{{""C1"":9}}}}""#).unwrap();
        file.flush().unwrap();
        file
    }

    fn config(file: &NamedTempFile, speed: f64) -> ReplayConfig {
        ReplayConfig {
            csv_path: file.path().to_path_buf(),
            speed,
        }
    }

    #[test]
    fn test_parse_csv() {
        let file = create_test_csv();
        let rows = ReplayEngine::parse_csv(file.path()).expect("Failed to parse CSV");

        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].topic, "tele/water_in/LWT");
        assert_eq!(rows[1].payload, r#"{"UptimeSec":23}"#);
        assert_eq!(rows[2].timestamp_ms, 1002);
    }

    #[test]
    fn test_rejects_bad_input() {
        let file = create_test_csv();
        assert!(matches!(
            ReplayEngine::from_csv(config(&file, 0.0)),
            Err(ReplayError::InvalidSpeed(_))
        ));

        let missing = ReplayConfig {
            csv_path: PathBuf::from("/nonexistent/capture.csv"),
            ..Default::default()
        };
        assert!(matches!(
            ReplayEngine::from_csv(missing),
            Err(ReplayError::FileNotFound(_))
        ));

        let mut wrong = NamedTempFile::new().unwrap();
        writeln!(wrong, "topic,payload").unwrap();
        wrong.flush().unwrap();
        assert!(matches!(
            ReplayEngine::from_csv(config(&wrong, 1.0)),
            Err(ReplayError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_capture_info() {
        let file = create_test_csv();
        let engine = ReplayEngine::from_csv(config(&file, 1.0)).unwrap();
        let info = engine.capture_info();

        assert_eq!(info.row_count, 4);
        assert_eq!(info.duration_ms, 3);
    }

    #[tokio::test]
    async fn test_run_forwards_rows() {
        let file = create_test_csv();
        let engine = ReplayEngine::from_csv(config(&file, 1000.0)).unwrap();

        let (tx, mut rx) = mpsc::channel(16);
        let counter = tally::CounterConfig::new("replay_test", "water_in", 1, 100);
        let forwarder = Forwarder::new(&counter, tx);

        let forwarded = engine.run(&forwarder).await.unwrap();
        assert_eq!(forwarded, 3);

        let state = engine.state();
        assert_eq!(state.position.load(Ordering::SeqCst), 4);
        assert!(!state.running.load(Ordering::SeqCst));

        assert_eq!(
            rx.recv().await,
            Some(WorkerEvent::Telemetry(TelemetryMessage::Availability(
                Availability::Online
            )))
        );
        assert_eq!(
            rx.recv().await,
            Some(WorkerEvent::Telemetry(TelemetryMessage::Uptime(23)))
        );
        assert_eq!(
            rx.recv().await,
            Some(WorkerEvent::Telemetry(TelemetryMessage::Counter(4)))
        );
    }
}
