// Tally Tasmota - Tasmota telemetry decoding
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Payload decoding
//!
//! Turns raw MQTT payloads into typed [`TelemetryMessage`]s. Anything that
//! does not decode cleanly is returned as a [`PayloadError`]; callers log it
//! and skip the message, so malformed telemetry never reaches the counter.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{PayloadError, Result};
use crate::topics::{TopicKind, Topics};

/// Key of the counter object in SENSOR payloads
pub const COUNTER_KEY: &str = "COUNTER";
/// Uptime as `<days>T<hh>:<mm>:<ss>` in STATE payloads
pub const UPTIME_KEY: &str = "Uptime";
/// Uptime in seconds, sent by newer firmware next to `Uptime`
pub const UPTIME_SEC_KEY: &str = "UptimeSec";

/// Device availability from the LWT topic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Availability {
    Online,
    Offline,
}

impl Availability {
    /// Check if the device is online
    pub fn is_online(&self) -> bool {
        matches!(self, Self::Online)
    }
}

/// Decoded message for one counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryMessage {
    /// Raw counter reading
    Counter(u64),
    /// Device uptime in seconds
    Uptime(u64),
    /// Device went online or offline
    Availability(Availability),
}

/// Decoder for one counter of one device
#[derive(Debug, Clone)]
pub struct TasmotaDecoder {
    topics: Topics,
    counter_id: u32,
}

impl TasmotaDecoder {
    /// Decoder for counter `C<counter_id>` of the device at `short_topic`
    pub fn new(short_topic: impl Into<String>, counter_id: u32) -> Self {
        Self {
            topics: Topics::new(short_topic),
            counter_id,
        }
    }

    /// Device topics
    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    /// Counter index
    pub fn counter_id(&self) -> u32 {
        self.counter_id
    }

    /// Decode a message
    ///
    /// Returns `Ok(None)` for topics of other devices.
    pub fn decode(&self, topic: &str, payload: &[u8]) -> Result<Option<TelemetryMessage>> {
        let Some(kind) = self.topics.classify(topic) else {
            log::trace!("Ignoring message on foreign topic {}", topic);
            return Ok(None);
        };

        let text = std::str::from_utf8(payload)?;
        let message = match kind {
            TopicKind::Sensor => TelemetryMessage::Counter(parse_counter(text, self.counter_id)?),
            TopicKind::State => TelemetryMessage::Uptime(parse_state_uptime(text)?),
            TopicKind::Availability => TelemetryMessage::Availability(parse_availability(text)?),
        };
        Ok(Some(message))
    }
}

/// Extract `COUNTER.C<counter_id>` from a SENSOR payload
pub fn parse_counter(payload: &str, counter_id: u32) -> Result<u64> {
    let message: Value = serde_json::from_str(payload)?;
    let counters = message
        .get(COUNTER_KEY)
        .ok_or_else(|| PayloadError::MissingField {
            field: COUNTER_KEY.to_string(),
            payload: payload.to_string(),
        })?;

    let key = format!("C{}", counter_id);
    let raw = counters.get(&key).ok_or_else(|| PayloadError::MissingField {
        field: format!("{}.{}", COUNTER_KEY, key),
        payload: payload.to_string(),
    })?;

    as_non_negative(raw).ok_or_else(|| PayloadError::InvalidValue {
        field: key,
        raw: raw.to_string(),
    })
}

/// Extract the device uptime in seconds from a STATE payload
///
/// `UptimeSec` wins when present; otherwise the `Uptime` string is parsed.
pub fn parse_state_uptime(payload: &str) -> Result<u64> {
    let message: Value = serde_json::from_str(payload)?;

    if let Some(raw) = message.get(UPTIME_SEC_KEY) {
        return as_non_negative(raw).ok_or_else(|| PayloadError::InvalidValue {
            field: UPTIME_SEC_KEY.to_string(),
            raw: raw.to_string(),
        });
    }

    match message.get(UPTIME_KEY) {
        Some(Value::String(s)) => parse_uptime(s),
        Some(other) => Err(PayloadError::InvalidUptime(other.to_string())),
        None => Err(PayloadError::MissingField {
            field: UPTIME_KEY.to_string(),
            payload: payload.to_string(),
        }),
    }
}

/// Convert `<days>T<hh>:<mm>:<ss>` to seconds
pub fn parse_uptime(uptime: &str) -> Result<u64> {
    let invalid = || PayloadError::InvalidUptime(uptime.to_string());

    let (days, clock) = uptime.split_once('T').ok_or_else(invalid)?;
    if days.is_empty() || !days.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let days: u64 = days.parse().map_err(|_| invalid())?;

    let mut parts = clock.splitn(3, ':');
    let mut next_pair = || -> Result<u64> {
        let part = parts.next().ok_or_else(invalid)?;
        if part.len() != 2 || !part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        part.parse().map_err(|_| invalid())
    };
    let hours = next_pair()?;
    let minutes = next_pair()?;
    let seconds = next_pair()?;

    days.checked_mul(86_400)
        .and_then(|d| d.checked_add(hours * 3600 + minutes * 60 + seconds))
        .ok_or_else(invalid)
}

/// Decode an LWT payload
pub fn parse_availability(payload: &str) -> Result<Availability> {
    match payload.trim() {
        "Online" => Ok(Availability::Online),
        "Offline" => Ok(Availability::Offline),
        other => Err(PayloadError::InvalidAvailability(other.to_string())),
    }
}

/// Non-negative integer from a JSON number or numeric string
///
/// Whole floats such as `12.0` count as integers.
fn as_non_negative(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| *f >= 0.0 && f.fract() == 0.0 && *f < u64::MAX as f64)
                .map(|f| f as u64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
