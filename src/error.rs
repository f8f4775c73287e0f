//! Error types for Tally
//!
//! The reconciler itself never fails: ingestion drops bad samples and reports
//! an outcome instead. Errors only exist at the edges, when a configuration is
//! validated. Snapshot fields that cannot be read back are reported per field
//! as [`FieldError`]s in the restore outcome.

use thiserror::Error;

/// Result type alias for Tally operations
pub type Result<T> = std::result::Result<T, TallyError>;

/// Main error type for Tally operations
#[derive(Error, Debug)]
pub enum TallyError {
    /// Configuration rejected by validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Conversion failure for a single snapshot attribute
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FieldError {
    /// Attribute not present in the stored record
    #[error("Attribute '{field}' missing")]
    Missing { field: &'static str },

    /// Attribute present but not a non-negative integer
    #[error("Attribute '{field}' has unusable value {raw}")]
    Invalid { field: &'static str, raw: String },
}

impl FieldError {
    /// Name of the attribute that failed to convert
    pub fn field(&self) -> &'static str {
        match self {
            Self::Missing { field } | Self::Invalid { field, .. } => field,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FieldError::Invalid {
            field: "old_value",
            raw: "\"abc\"".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("old_value"));
        assert!(msg.contains("abc"));

        let err = TallyError::InvalidConfig("max_valid_diff must be positive".to_string());
        assert!(err.to_string().contains("max_valid_diff"));
    }

    #[test]
    fn test_json_conversion() {
        let json_err = serde_json::from_str::<u64>("nope").unwrap_err();
        let err: TallyError = json_err.into();
        assert!(matches!(err, TallyError::Json(_)));
    }

    #[test]
    fn test_field_name() {
        assert_eq!(FieldError::Missing { field: "value" }.field(), "value");
        assert_eq!(
            FieldError::Invalid {
                field: "uptime_sec",
                raw: "-1".to_string()
            }
            .field(),
            "uptime_sec"
        );
    }
}
