// Tally Tasmota - Tasmota telemetry decoding
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Error types for Tasmota payload decoding

use thiserror::Error;

/// Payload could not be turned into a telemetry message
#[derive(Error, Debug)]
pub enum PayloadError {
    /// Payload is not valid UTF-8
    #[error("Payload is not valid UTF-8")]
    NotUtf8(#[from] std::str::Utf8Error),

    /// Payload is not valid JSON
    #[error("Unable to parse payload as JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// Expected key absent from the payload
    #[error("Unable to find {field} in payload {payload}")]
    MissingField { field: String, payload: String },

    /// Key present but its value is unusable
    #[error("Invalid value for {field}: {raw}")]
    InvalidValue { field: String, raw: String },

    /// Uptime string not in `<days>T<hh>:<mm>:<ss>` form
    #[error("Unable to parse uptime string {0}")]
    InvalidUptime(String),

    /// LWT payload other than Online/Offline
    #[error("Unknown availability payload {0}")]
    InvalidAvailability(String),
}

/// Result type alias for payload decoding
pub type Result<T> = std::result::Result<T, PayloadError>;
