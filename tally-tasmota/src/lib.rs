// Tally Tasmota - Tasmota telemetry decoding
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # Tally Tasmota
//!
//! Decodes the MQTT telemetry of a Tasmota pulse counter into typed messages
//! that a `tally::CounterReconciler` can consume.
//!
//! ## Quick Start
//!
//! ```rust
//! use tally_tasmota::{TasmotaDecoder, TelemetryMessage};
//!
//! let decoder = TasmotaDecoder::new("water_out", 1);
//!
//! let msg = decoder
//!     .decode("tele/water_out/SENSOR", br#"{"COUNTER":{"C1":1234}}"#)
//!     .unwrap();
//! assert_eq!(msg, Some(TelemetryMessage::Counter(1234)));
//!
//! let msg = decoder
//!     .decode("tele/water_out/STATE", br#"{"Uptime":"0T00:00:23"}"#)
//!     .unwrap();
//! assert_eq!(msg, Some(TelemetryMessage::Uptime(23)));
//! ```

mod error;
mod payload;
mod topics;

// Public API
pub use error::{PayloadError, Result};
pub use payload::{
    parse_availability, parse_counter, parse_state_uptime, parse_uptime, Availability,
    TasmotaDecoder, TelemetryMessage, COUNTER_KEY, UPTIME_KEY, UPTIME_SEC_KEY,
};
pub use topics::{TopicKind, Topics};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
