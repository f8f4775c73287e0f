// Tally Exporter - Counter worker
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Single owner of the reconciler.
//!
//! All telemetry and liveness ticks are funnelled through one mpsc channel,
//! so reconciler operations never interleave. After each event the worker
//! drains the queued effects: renders update the shared status, persists
//! are published on a watch channel for the persister task.

use std::time::Duration;

use chrono::Utc;
use tally::{
    CounterConfig, CounterReconciler, Effect, Liveness, ReconcilerStats, RestoreOutcome,
    SnapshotRecord, UptimeOutcome,
};
use tally_tasmota::TelemetryMessage;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::{debug, info, warn};

use crate::metrics;
use crate::status::SharedStatus;

/// Events consumed by the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerEvent {
    /// Decoded device message
    Telemetry(TelemetryMessage),
    /// Liveness interval elapsed
    LivenessTick,
}

/// Owns the reconciler and applies its effects.
pub struct CounterWorker {
    name: String,
    reconciler: CounterReconciler,
    stats: ReconcilerStats,
    status: SharedStatus,
    persist_tx: watch::Sender<Option<SnapshotRecord>>,
}

impl CounterWorker {
    /// Create a worker for a validated configuration.
    pub fn new(
        config: &CounterConfig,
        status: SharedStatus,
        persist_tx: watch::Sender<Option<SnapshotRecord>>,
    ) -> tally::Result<Self> {
        Ok(Self {
            name: config.name.clone(),
            reconciler: CounterReconciler::from_config(config)?,
            stats: ReconcilerStats::new(),
            status,
            persist_tx,
        })
    }

    /// Restore the stored snapshot, or start from zero.
    pub async fn restore(&mut self, record: Option<SnapshotRecord>) -> RestoreOutcome {
        let outcome = self.reconciler.restore_snapshot(record.as_ref());
        match &outcome {
            RestoreOutcome::ColdStart => info!("{}: no stored state, starting from zero", self.name),
            RestoreOutcome::Restored { field_errors, .. } if !field_errors.is_empty() => warn!(
                "{}: {} stored field(s) unreadable, defaulted to 0",
                self.name,
                field_errors.len()
            ),
            _ => {}
        }
        self.apply_effects().await;
        outcome
    }

    /// Process events until every sender is dropped.
    pub async fn run(mut self, mut rx: mpsc::Receiver<WorkerEvent>) -> Self {
        while let Some(event) = rx.recv().await {
            self.handle(event).await;
        }
        debug!("{}: event channel closed", self.name);
        self
    }

    /// Process a single event.
    pub async fn handle(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::Telemetry(TelemetryMessage::Counter(raw)) => {
                let outcome = self.reconciler.ingest_raw_sample(raw);
                self.stats.record_ingest(&outcome);
                metrics::record_sample(&self.name, &outcome);

                if outcome.is_accepted() {
                    metrics::set_stale(&self.name, false);
                    let mut status = self.status.write().await;
                    status.stale = false;
                    status.last_update = Some(Utc::now());
                }
            }
            WorkerEvent::Telemetry(TelemetryMessage::Uptime(seconds)) => {
                let uptime = i64::try_from(seconds).unwrap_or(i64::MAX);
                let outcome = self.reconciler.ingest_uptime(uptime);
                self.stats.record_uptime(outcome);
                if outcome == UptimeOutcome::RebootDetected {
                    metrics::record_reboot(&self.name);
                }
            }
            WorkerEvent::Telemetry(TelemetryMessage::Availability(availability)) => {
                info!("{}: device {:?}", self.name, availability);
                metrics::set_online(&self.name, availability.is_online());
                self.status.write().await.availability = Some(availability);
            }
            WorkerEvent::LivenessTick => {
                let liveness = self.reconciler.check_liveness();
                self.stats.record_liveness(liveness);
                let stale = liveness == Liveness::Stale;
                metrics::set_stale(&self.name, stale);
                self.status.write().await.stale = stale;
            }
        }
        self.apply_effects().await;
    }

    /// Reconciler owned by this worker.
    pub fn reconciler(&self) -> &CounterReconciler {
        &self.reconciler
    }

    /// Outcome statistics so far.
    pub fn stats(&self) -> &ReconcilerStats {
        &self.stats
    }

    async fn apply_effects(&mut self) {
        for effect in self.reconciler.drain_effects() {
            match effect {
                Effect::Render(state) => debug!("{}: state {}", self.name, state),
                Effect::Persist(snapshot) => {
                    let state = self.reconciler.display_state().to_string();
                    let record = SnapshotRecord::from_snapshot(&snapshot, Some(state));
                    self.persist_tx.send_replace(Some(record));
                }
            }
        }

        if let Some(value) = self.reconciler.accumulated_value() {
            metrics::update_counter_state(
                &self.name,
                value,
                self.reconciler.last_raw_value().unwrap_or(0),
                self.reconciler.reported_uptime(),
            );
        }
        self.status
            .write()
            .await
            .sync_from(&self.reconciler, &self.stats);
    }
}

/// Send a liveness tick every `period`, starting one period from now.
///
/// Stops when the worker is gone.
pub fn spawn_liveness_ticker(period: Duration, tx: mpsc::Sender<WorkerEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        loop {
            ticker.tick().await;
            if tx.send(WorkerEvent::LivenessTick).await.is_err() {
                break;
            }
        }
    })
}
