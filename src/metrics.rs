//! Ingestion statistics
//!
//! Counts what happened to every sample the reconciler was handed. The
//! reconciler itself does not keep these; hosts that want them feed each
//! outcome into a [`ReconcilerStats`].

use serde::Serialize;

use crate::reconciler::{IngestOutcome, Liveness, UptimeOutcome};

/// Outcome counters for one counter instance
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcilerStats {
    /// Samples added to the total
    pub accepted: u64,
    /// Accepted samples that crossed the 32-bit wrap
    pub wrapped: u64,
    /// Repeated raw values
    pub duplicates: u64,
    /// Samples rejected as improbable jumps
    pub rejected: u64,
    /// Samples taken as a new baseline
    pub rebaselines: u64,
    /// Samples received before initialization
    pub not_ready: u64,
    /// Uptime regressions seen
    pub reboots: u64,
    /// Negative uptime samples ignored
    pub uptime_ignored: u64,
    /// Liveness checks that found no update
    pub stale_checks: u64,
    /// Sum of all accepted diffs
    pub accumulated_diff: u64,
}

impl ReconcilerStats {
    /// Create empty statistics
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of a raw sample
    pub fn record_ingest(&mut self, outcome: &IngestOutcome) {
        match *outcome {
            IngestOutcome::Accepted { diff, wrapped } => {
                self.accepted += 1;
                self.accumulated_diff = self.accumulated_diff.saturating_add(diff);
                if wrapped {
                    self.wrapped += 1;
                }
            }
            IngestOutcome::Duplicate => self.duplicates += 1,
            IngestOutcome::RejectedAnomalous { .. } => self.rejected += 1,
            IngestOutcome::Rebaselined => self.rebaselines += 1,
            IngestOutcome::NotReady => self.not_ready += 1,
        }
    }

    /// Record the outcome of an uptime sample
    pub fn record_uptime(&mut self, outcome: UptimeOutcome) {
        match outcome {
            UptimeOutcome::RebootDetected => self.reboots += 1,
            UptimeOutcome::Ignored => self.uptime_ignored += 1,
            UptimeOutcome::Advanced => {}
        }
    }

    /// Record a liveness check
    pub fn record_liveness(&mut self, liveness: Liveness) {
        if liveness == Liveness::Stale {
            self.stale_checks += 1;
        }
    }

    /// Total raw samples seen
    pub fn samples(&self) -> u64 {
        self.accepted + self.duplicates + self.rejected + self.rebaselines + self.not_ready
    }

    /// Fraction of samples rejected (0.0 - 1.0)
    pub fn rejection_rate(&self) -> f64 {
        let total = self.samples();
        if total == 0 {
            return 0.0;
        }
        self.rejected as f64 / total as f64
    }

    /// Reset all counters
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Generate a human-readable report
    pub fn report(&self) -> String {
        let mut report = String::new();

        report.push_str("=== Tally Counter Statistics ===\n\n");
        report.push_str(&format!("Samples: {}\n", self.samples()));
        report.push_str(&format!(
            "Accepted: {} ({} wrapped, +{} total)\n",
            self.accepted, self.wrapped, self.accumulated_diff
        ));
        report.push_str(&format!("Duplicates: {}\n", self.duplicates));
        report.push_str(&format!(
            "Rejected: {} ({:.1}%)\n",
            self.rejected,
            self.rejection_rate() * 100.0
        ));
        report.push_str(&format!("Re-baselines: {}\n", self.rebaselines));
        report.push_str(&format!("Reboots: {}\n", self.reboots));
        report.push_str(&format!("Stale checks: {}\n", self.stale_checks));

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_ingest() {
        let mut stats = ReconcilerStats::new();
        stats.record_ingest(&IngestOutcome::Rebaselined);
        stats.record_ingest(&IngestOutcome::Accepted {
            diff: 5,
            wrapped: false,
        });
        stats.record_ingest(&IngestOutcome::Accepted {
            diff: 11,
            wrapped: true,
        });
        stats.record_ingest(&IngestOutcome::Duplicate);
        stats.record_ingest(&IngestOutcome::RejectedAnomalous {
            diff: Some(450),
            wrapped: false,
        });

        assert_eq!(stats.samples(), 5);
        assert_eq!(stats.accepted, 2);
        assert_eq!(stats.wrapped, 1);
        assert_eq!(stats.accumulated_diff, 16);
        assert!((stats.rejection_rate() - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_record_uptime_and_liveness() {
        let mut stats = ReconcilerStats::new();
        stats.record_uptime(UptimeOutcome::Advanced);
        stats.record_uptime(UptimeOutcome::RebootDetected);
        stats.record_uptime(UptimeOutcome::Ignored);
        stats.record_liveness(Liveness::Fresh);
        stats.record_liveness(Liveness::Stale);

        assert_eq!(stats.reboots, 1);
        assert_eq!(stats.uptime_ignored, 1);
        assert_eq!(stats.stale_checks, 1);
    }

    #[test]
    fn test_report_and_reset() {
        let mut stats = ReconcilerStats::new();
        assert_eq!(stats.rejection_rate(), 0.0);
        stats.record_ingest(&IngestOutcome::Duplicate);

        let report = stats.report();
        assert!(report.contains("Duplicates: 1"));

        stats.reset();
        assert_eq!(stats, ReconcilerStats::default());
    }
}
