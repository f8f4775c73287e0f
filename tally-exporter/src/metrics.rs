// Tally Exporter - Prometheus metrics definitions
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Prometheus metrics for counter monitoring.
//!
//! Every counter metric is labelled with the configured counter name, so
//! several exporters can share one Prometheus job.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, CounterVec, Encoder, Gauge, GaugeVec,
    TextEncoder,
};
use tally::IngestOutcome;

lazy_static! {
    // ============================================================
    // Counter State
    // ============================================================

    /// Accumulated total, survives device reboots.
    pub static ref ACCUMULATED_VALUE: GaugeVec = register_gauge_vec!(
        "tally_accumulated_value",
        "Accumulated counter total",
        &["counter"]
    ).expect("accumulated value metric registers once");

    /// Raw device counter used as the diff reference.
    pub static ref RAW_REFERENCE: GaugeVec = register_gauge_vec!(
        "tally_raw_reference",
        "Raw device counter used as reference",
        &["counter"]
    ).expect("raw reference metric registers once");

    /// Last reported device uptime.
    pub static ref DEVICE_UPTIME_SECONDS: GaugeVec = register_gauge_vec!(
        "tally_device_uptime_seconds",
        "Last reported device uptime in seconds",
        &["counter"]
    ).expect("uptime metric registers once");

    /// 1 when no counter update arrived during the last liveness interval.
    pub static ref COUNTER_STALE: GaugeVec = register_gauge_vec!(
        "tally_counter_stale",
        "Counter staleness (1=stale, 0=fresh)",
        &["counter"]
    ).expect("stale metric registers once");

    /// Device availability from the LWT topic.
    pub static ref DEVICE_ONLINE: GaugeVec = register_gauge_vec!(
        "tally_device_online",
        "Device availability (1=online, 0=offline)",
        &["counter"]
    ).expect("availability metric registers once");

    // ============================================================
    // Event Counters
    // ============================================================

    /// Raw samples by outcome.
    pub static ref SAMPLES_TOTAL: CounterVec = register_counter_vec!(
        "tally_samples_total",
        "Raw counter samples by outcome",
        &["counter", "outcome"]
    ).expect("samples metric registers once");

    /// Device reboots detected from uptime.
    pub static ref REBOOTS_TOTAL: CounterVec = register_counter_vec!(
        "tally_reboots_total",
        "Device reboots detected",
        &["counter"]
    ).expect("reboots metric registers once");

    /// Messages on the device topics that failed to decode.
    pub static ref PAYLOAD_ERRORS_TOTAL: CounterVec = register_counter_vec!(
        "tally_payload_errors_total",
        "Telemetry payloads that failed to decode",
        &["counter"]
    ).expect("payload errors metric registers once");

    // ============================================================
    // Exporter Metrics
    // ============================================================

    /// Current replay position (row index).
    pub static ref REPLAY_POSITION: Gauge = register_gauge!(
        "tally_exporter_replay_position",
        "Current replay position (row index)"
    ).expect("replay position metric registers once");

    /// Total rows in the replay capture.
    pub static ref REPLAY_TOTAL_ROWS: Gauge = register_gauge!(
        "tally_exporter_replay_total_rows",
        "Total rows in the replay capture"
    ).expect("replay total metric registers once");

    /// Replay speed multiplier.
    pub static ref REPLAY_SPEED: Gauge = register_gauge!(
        "tally_exporter_replay_speed",
        "Replay speed multiplier"
    ).expect("replay speed metric registers once");
}

fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

/// Update the counter state gauges.
///
/// The uptime gauge is left alone until the device reported one.
pub fn update_counter_state(counter: &str, value: u64, reference: u64, uptime_sec: Option<u64>) {
    ACCUMULATED_VALUE
        .with_label_values(&[counter])
        .set(value as f64);
    RAW_REFERENCE
        .with_label_values(&[counter])
        .set(reference as f64);
    if let Some(uptime) = uptime_sec {
        DEVICE_UPTIME_SECONDS
            .with_label_values(&[counter])
            .set(uptime as f64);
    }
}

/// Update the staleness gauge.
pub fn set_stale(counter: &str, stale: bool) {
    COUNTER_STALE.with_label_values(&[counter]).set(flag(stale));
}

/// Update the availability gauge.
pub fn set_online(counter: &str, online: bool) {
    DEVICE_ONLINE.with_label_values(&[counter]).set(flag(online));
}

/// Count a raw sample by outcome.
pub fn record_sample(counter: &str, outcome: &IngestOutcome) {
    SAMPLES_TOTAL
        .with_label_values(&[counter, outcome.as_str()])
        .inc();
}

/// Count a detected reboot.
pub fn record_reboot(counter: &str) {
    REBOOTS_TOTAL.with_label_values(&[counter]).inc();
}

/// Count an undecodable payload.
pub fn record_payload_error(counter: &str) {
    PAYLOAD_ERRORS_TOTAL.with_label_values(&[counter]).inc();
}

/// Update replay position metrics.
pub fn update_replay_metrics(position: usize, total: usize, speed: f64) {
    REPLAY_POSITION.set(position as f64);
    REPLAY_TOTAL_ROWS.set(total as f64);
    REPLAY_SPEED.set(speed);
}

/// Encode all metrics to Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag() {
        assert_eq!(flag(true), 1.0);
        assert_eq!(flag(false), 0.0);
    }

    #[test]
    fn test_counter_state_gauges() {
        update_counter_state("metrics_test", 1234, 56, Some(789));
        set_stale("metrics_test", true);

        assert_eq!(
            ACCUMULATED_VALUE.with_label_values(&["metrics_test"]).get(),
            1234.0
        );
        assert_eq!(
            RAW_REFERENCE.with_label_values(&["metrics_test"]).get(),
            56.0
        );
        assert_eq!(
            COUNTER_STALE.with_label_values(&["metrics_test"]).get(),
            1.0
        );
        assert_eq!(
            DEVICE_UPTIME_SECONDS
                .with_label_values(&["metrics_test"])
                .get(),
            789.0
        );
    }

    #[test]
    fn test_unknown_uptime_leaves_gauge_unset() {
        update_counter_state("no_uptime_test", 10, 0, None);

        assert_eq!(
            ACCUMULATED_VALUE.with_label_values(&["no_uptime_test"]).get(),
            10.0
        );
        assert_eq!(
            DEVICE_UPTIME_SECONDS
                .with_label_values(&["no_uptime_test"])
                .get(),
            0.0
        );
    }

    #[test]
    fn test_sample_outcomes_are_labelled() {
        record_sample(
            "outcome_test",
            &IngestOutcome::Accepted {
                diff: 3,
                wrapped: false,
            },
        );
        record_sample("outcome_test", &IngestOutcome::Duplicate);
        record_sample("outcome_test", &IngestOutcome::Duplicate);

        assert_eq!(
            SAMPLES_TOTAL
                .with_label_values(&["outcome_test", "duplicate"])
                .get(),
            2.0
        );
        assert_eq!(
            SAMPLES_TOTAL
                .with_label_values(&["outcome_test", "accepted"])
                .get(),
            1.0
        );
    }

    #[test]
    fn test_encode_metrics() {
        update_counter_state("encode_test", 1, 1, Some(1));
        record_reboot("encode_test");
        set_online("encode_test", true);

        let output = encode_metrics();
        assert!(output.contains("tally_accumulated_value"));
        assert!(output.contains("tally_reboots_total"));
        assert!(output.contains("tally_device_online"));
    }
}
