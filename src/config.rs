//! Counter configuration
//!
//! Read once at startup and immutable afterwards. Field names follow the
//! platform keys used in existing deployments (`stopic`, `max_valid_diff`,
//! `expire_after`, ...) so configuration files carry over unchanged.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TallyError};
use crate::formatter::FormatterConfig;

/// Configuration of one monitored counter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterConfig {
    /// Display name
    pub name: String,

    /// Device short topic (`tele/<stopic>/...`)
    #[serde(rename = "stopic")]
    pub short_topic: String,

    /// Counter index on the device, selects `C<id>` in the sensor payload
    pub counter_id: u32,

    /// Largest single increment accepted as genuine
    pub max_valid_diff: u64,

    /// Liveness interval in seconds; absent or zero disables the check
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expire_after: Option<u64>,

    /// Optional display transform
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formatter: Option<FormatterConfig>,

    /// Unit label, passed through for display
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_of_measurement: Option<String>,

    /// Icon label, passed through for display
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

impl CounterConfig {
    /// Create a configuration with the required fields only
    pub fn new(
        name: impl Into<String>,
        short_topic: impl Into<String>,
        counter_id: u32,
        max_valid_diff: u64,
    ) -> Self {
        Self {
            name: name.into(),
            short_topic: short_topic.into(),
            counter_id,
            max_valid_diff,
            expire_after: None,
            formatter: None,
            unit_of_measurement: None,
            icon: None,
        }
    }

    /// Set the liveness interval in seconds
    pub fn with_expire_after(mut self, seconds: u64) -> Self {
        self.expire_after = Some(seconds);
        self
    }

    /// Set the display formatter
    pub fn with_formatter(mut self, formatter: FormatterConfig) -> Self {
        self.formatter = Some(formatter);
        self
    }

    /// Set the unit label
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit_of_measurement = Some(unit.into());
        self
    }

    /// Parse and validate a JSON configuration document
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants the reconciler relies on
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(TallyError::InvalidConfig("name must not be empty".to_string()));
        }
        if self.short_topic.trim().is_empty() {
            return Err(TallyError::InvalidConfig(
                "stopic must not be empty".to_string(),
            ));
        }
        if self.counter_id == 0 {
            return Err(TallyError::InvalidConfig(
                "counter_id must be a positive integer".to_string(),
            ));
        }
        if self.max_valid_diff == 0 {
            return Err(TallyError::InvalidConfig(
                "max_valid_diff must be a positive integer".to_string(),
            ));
        }
        if let Some(formatter) = &self.formatter {
            formatter.validate().map_err(TallyError::InvalidConfig)?;
        }
        Ok(())
    }

    /// Liveness interval, `None` when the check is disabled
    pub fn liveness_interval(&self) -> Option<Duration> {
        self.expire_after
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json_platform_keys() {
        let json = r#"{
            "name": "Water in",
            "stopic": "water_in",
            "counter_id": 1,
            "max_valid_diff": 500,
            "expire_after": 600,
            "unit_of_measurement": "L",
            "icon": "mdi:water"
        }"#;

        let config = CounterConfig::from_json(json).unwrap();
        assert_eq!(config.short_topic, "water_in");
        assert_eq!(config.max_valid_diff, 500);
        assert_eq!(config.liveness_interval(), Some(Duration::from_secs(600)));
        assert_eq!(config.icon.as_deref(), Some("mdi:water"));
        assert!(config.formatter.is_none());
    }

    #[test]
    fn test_missing_max_valid_diff_is_rejected() {
        let json = r#"{"name": "x", "stopic": "x", "counter_id": 1}"#;
        assert!(matches!(
            CounterConfig::from_json(json),
            Err(TallyError::Json(_))
        ));
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let config = CounterConfig::new("Water", "water_in", 1, 0);
        assert!(matches!(
            config.validate(),
            Err(TallyError::InvalidConfig(_))
        ));

        let config = CounterConfig::new("Water", "water_in", 0, 10);
        assert!(config.validate().is_err());

        let config = CounterConfig::new(" ", "water_in", 1, 10);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_checks_formatter() {
        let config = CounterConfig::new("Water", "water_in", 1, 10).with_formatter(
            FormatterConfig::Scale {
                divisor: -1.0,
                precision: 2,
            },
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_liveness_disabled() {
        let config = CounterConfig::new("Water", "water_in", 1, 10);
        assert_eq!(config.liveness_interval(), None);

        let config = config.with_expire_after(0);
        assert_eq!(config.liveness_interval(), None);
    }
}
