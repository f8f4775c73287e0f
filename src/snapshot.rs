//! Persisted reconciler state
//!
//! Only derived state is checkpointed: the accumulated total, the raw value
//! it was last reconciled against and the device uptime seen at that time.
//! Writes go out as a typed [`Snapshot`]; reads come back as a loosely typed
//! [`SnapshotRecord`] because the store may hold values written by older
//! versions or edited by hand.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::FieldError;

/// Attribute holding the accumulated total
pub const ATTR_VALUE: &str = "value";
/// Attribute holding the last raw reference value
pub const ATTR_OLD_VALUE: &str = "old_value";
/// Attribute holding the last known device uptime
pub const ATTR_UPTIME: &str = "uptime_sec";

/// Typed state written to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Snapshot {
    /// Accumulated total
    pub value: u64,
    /// Raw reference value
    pub old_value: u64,
    /// Device uptime in seconds
    pub uptime_sec: u64,
}

impl Snapshot {
    /// Attribute map in the shape stores persist
    pub fn to_attributes(&self) -> Map<String, Value> {
        let mut attributes = Map::new();
        attributes.insert(ATTR_VALUE.to_string(), Value::from(self.value));
        attributes.insert(ATTR_OLD_VALUE.to_string(), Value::from(self.old_value));
        attributes.insert(ATTR_UPTIME.to_string(), Value::from(self.uptime_sec));
        attributes
    }
}

/// State as read back from a store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    /// Last displayed state string, if the store kept one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Stored attributes, keyed by attribute name
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl SnapshotRecord {
    /// Record carrying exactly the attributes of `snapshot`
    pub fn from_snapshot(snapshot: &Snapshot, state: Option<String>) -> Self {
        Self {
            state,
            attributes: snapshot.to_attributes(),
        }
    }

    /// Convert every known attribute, falling back to zero per field
    ///
    /// Returns the decoded snapshot together with the fields that could not
    /// be converted. A bad field never aborts the others.
    pub fn decode(&self) -> (Snapshot, Vec<FieldError>) {
        let mut snapshot = Snapshot::default();
        let mut errors = Vec::new();

        for (field, slot) in [
            (ATTR_VALUE, &mut snapshot.value),
            (ATTR_OLD_VALUE, &mut snapshot.old_value),
            (ATTR_UPTIME, &mut snapshot.uptime_sec),
        ] {
            let (parsed, error) = parse_field_or_default(&self.attributes, field, 0);
            *slot = parsed;
            errors.extend(error);
        }

        (snapshot, errors)
    }
}

/// Parse one attribute, substituting `default` on failure
pub fn parse_field_or_default(
    attributes: &Map<String, Value>,
    field: &'static str,
    default: u64,
) -> (u64, Option<FieldError>) {
    match parse_field(attributes, field) {
        Ok(value) => (value, None),
        Err(e) => (default, Some(e)),
    }
}

/// Parse one attribute as a non-negative integer
///
/// Accepts JSON unsigned integers, integral non-negative floats and decimal
/// strings.
pub fn parse_field(attributes: &Map<String, Value>, field: &'static str) -> Result<u64, FieldError> {
    let raw = attributes.get(field).ok_or(FieldError::Missing { field })?;
    let invalid = || FieldError::Invalid {
        field,
        raw: raw.to_string(),
    };

    match raw {
        Value::Number(n) => {
            if let Some(v) = n.as_u64() {
                Ok(v)
            } else {
                match n.as_f64() {
                    Some(f) if f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64 => {
                        Ok(f as u64)
                    }
                    _ => Err(invalid()),
                }
            }
        }
        Value::String(s) => s.trim().parse::<u64>().map_err(|_| invalid()),
        _ => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(attributes: Value) -> SnapshotRecord {
        SnapshotRecord {
            state: None,
            attributes: attributes.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn test_decode_complete_record() {
        let rec = record(json!({"value": 42, "old_value": 7, "uptime_sec": 300}));
        let (snapshot, errors) = rec.decode();

        assert!(errors.is_empty());
        assert_eq!(
            snapshot,
            Snapshot {
                value: 42,
                old_value: 7,
                uptime_sec: 300
            }
        );
    }

    #[test]
    fn test_decode_accepts_strings_and_integral_floats() {
        let rec = record(json!({"value": "1234", "old_value": 12.0, "uptime_sec": " 60 "}));
        let (snapshot, errors) = rec.decode();

        assert!(errors.is_empty());
        assert_eq!(snapshot.value, 1234);
        assert_eq!(snapshot.old_value, 12);
        assert_eq!(snapshot.uptime_sec, 60);
    }

    #[test]
    fn test_bad_field_falls_back_to_zero() {
        let rec = record(json!({"value": 42, "old_value": "seven", "uptime_sec": -5}));
        let (snapshot, errors) = rec.decode();

        assert_eq!(snapshot.value, 42);
        assert_eq!(snapshot.old_value, 0);
        assert_eq!(snapshot.uptime_sec, 0);
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].field(), ATTR_OLD_VALUE);
        assert_eq!(errors[1].field(), ATTR_UPTIME);
    }

    #[test]
    fn test_missing_and_fractional_fields() {
        let rec = record(json!({"value": 1.5}));
        let (snapshot, errors) = rec.decode();

        assert_eq!(snapshot, Snapshot::default());
        assert_eq!(errors.len(), 3);
        assert!(matches!(errors[0], FieldError::Invalid { .. }));
        assert!(matches!(errors[1], FieldError::Missing { .. }));
    }

    #[test]
    fn test_attributes_shape() {
        let snapshot = Snapshot {
            value: 10,
            old_value: 3,
            uptime_sec: 99,
        };
        let rec = SnapshotRecord::from_snapshot(&snapshot, Some("10".to_string()));

        assert_eq!(rec.attributes.len(), 3);
        assert_eq!(rec.attributes[ATTR_UPTIME], json!(99));
        assert_eq!(rec.decode().0, snapshot);
    }
}
