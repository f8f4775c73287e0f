//! # Tally - reboot-proof pulse counter accumulation
//!
//! Remote meters (water, gas, energy) count pulses in RAM and forget them on
//! every reboot. Writing each pulse to flash would wear it out, so the
//! device keeps a resettable counter and reports it alongside its uptime.
//! Tally rebuilds a durable, ever-increasing total from those two streams.
//!
//! ## Key Features
//!
//! - **Reboot detection**: an uptime that goes backwards invalidates the reference
//! - **Wraparound handling**: 32-bit counter rollover is folded into the total
//! - **Jump rejection**: improbable increments above `max_valid_diff` are dropped
//! - **Checkpointing**: only derived state is persisted, and restored once at startup
//!
//! ## Quick Start
//!
//! ```rust
//! use tally::{CounterReconciler, IngestOutcome, UptimeOutcome};
//!
//! let mut counter = CounterReconciler::new(1000).unwrap();
//!
//! // Nothing stored yet: start from zero
//! counter.restore_snapshot(None);
//!
//! // First sample only sets the reference
//! assert_eq!(counter.ingest_raw_sample(120), IngestOutcome::Rebaselined);
//! counter.ingest_raw_sample(135);
//! assert_eq!(counter.accumulated_value(), Some(15));
//!
//! // Device reboots: counter starts over, total does not
//! assert_eq!(counter.ingest_uptime(3), UptimeOutcome::RebootDetected);
//! counter.ingest_raw_sample(0);
//! counter.ingest_raw_sample(4);
//! assert_eq!(counter.accumulated_value(), Some(19));
//!
//! // Hand the requested persist/render effects to the host
//! for effect in counter.drain_effects() {
//!     println!("{:?}", effect);
//! }
//! ```
//!
//! ## Modules
//!
//! - [`reconciler`]: The accumulation state machine
//! - [`snapshot`]: Persisted state and per-field restore parsing
//! - [`config`]: Counter configuration
//! - [`formatter`]: Display value transforms
//! - [`metrics`]: Ingestion statistics

// Modules
pub mod config;
pub mod error;
pub mod formatter;
pub mod metrics;
pub mod reconciler;
pub mod snapshot;

// Re-exports for convenient access
pub use config::CounterConfig;
pub use error::{FieldError, Result, TallyError};
pub use formatter::{FormatterConfig, ScaleFormatter, TemplateFormatter, ValueFormatter};
pub use metrics::ReconcilerStats;
pub use reconciler::{
    CounterReconciler, DisplayState, Effect, IngestOutcome, Liveness, Phase, RestoreOutcome,
    UptimeOutcome, COUNTER_MODULUS, UPTIME_SENTINEL,
};
pub use snapshot::{Snapshot, SnapshotRecord, ATTR_OLD_VALUE, ATTR_UPTIME, ATTR_VALUE};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
