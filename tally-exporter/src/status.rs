// Tally Exporter - Counter status view
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Read-only view of the counter, shared between the worker and HTTP handlers.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tally::{CounterConfig, CounterReconciler, ReconcilerStats};
use tally_tasmota::Availability;
use tokio::sync::RwLock;

/// Status shared with the HTTP handlers.
pub type SharedStatus = Arc<RwLock<CounterStatus>>;

/// What the worker last published about the counter.
#[derive(Debug, Clone, Serialize)]
pub struct CounterStatus {
    pub name: String,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_of_measurement: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    pub availability: Option<Availability>,
    pub initialized: bool,
    pub has_reference: bool,
    pub stale: bool,
    pub accumulated_value: Option<u64>,
    pub raw_reference: Option<u64>,
    /// `None` until the device reported an uptime
    pub uptime_sec: Option<u64>,
    pub last_update: Option<DateTime<Utc>>,
    pub stats: ReconcilerStats,
}

impl CounterStatus {
    /// Status before the snapshot is restored.
    pub fn new(config: &CounterConfig) -> Self {
        Self {
            name: config.name.clone(),
            state: tally::DisplayState::Unknown.to_string(),
            unit_of_measurement: config.unit_of_measurement.clone(),
            icon: config.icon.clone(),
            availability: None,
            initialized: false,
            has_reference: false,
            stale: false,
            accumulated_value: None,
            raw_reference: None,
            uptime_sec: None,
            last_update: None,
            stats: ReconcilerStats::new(),
        }
    }

    /// Shared handle around a fresh status.
    pub fn shared(config: &CounterConfig) -> SharedStatus {
        Arc::new(RwLock::new(Self::new(config)))
    }

    /// Copy the reconciler state into the view.
    pub fn sync_from(&mut self, reconciler: &CounterReconciler, stats: &ReconcilerStats) {
        self.state = reconciler.display_state().to_string();
        self.initialized = reconciler.accumulated_value().is_some();
        self.has_reference = reconciler.has_reference();
        self.accumulated_value = reconciler.accumulated_value();
        self.raw_reference = reconciler.last_raw_value();
        self.uptime_sec = reconciler.reported_uptime();
        self.stats = stats.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_hides_uptime_sentinel() {
        let config = CounterConfig::new("Water", "water_in", 1, 100).with_unit("L");
        let mut status = CounterStatus::new(&config);
        assert!(!status.initialized);
        assert_eq!(status.state, "unknown");

        let mut reconciler = CounterReconciler::from_config(&config).unwrap();
        reconciler.restore_snapshot(None);
        status.sync_from(&reconciler, &ReconcilerStats::new());

        assert!(status.initialized);
        assert_eq!(status.state, "0");
        assert_eq!(status.uptime_sec, None);

        reconciler.ingest_uptime(42);
        status.sync_from(&reconciler, &ReconcilerStats::new());
        assert_eq!(status.uptime_sec, Some(42));
    }

    #[test]
    fn test_serializes_availability() {
        let config = CounterConfig::new("Water", "water_in", 1, 100);
        let mut status = CounterStatus::new(&config);
        status.availability = Some(Availability::Online);

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["availability"], "Online");
        assert_eq!(json["name"], "Water");
        assert!(json.get("icon").is_none());
    }
}
