// Tally Tasmota - Tasmota telemetry decoding
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! MQTT topic layout of a Tasmota device
//!
//! A device publishes under its short topic:
//!
//! ```text
//! tele/<stopic>/SENSOR   {"Time":"...","COUNTER":{"C1":0}}
//! tele/<stopic>/STATE    {"Time":"...","Uptime":"0T00:00:23",...}
//! tele/<stopic>/LWT      Online | Offline
//! ```

/// Which stream a topic carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TopicKind {
    /// Counter readings
    Sensor,
    /// Periodic state, including uptime
    State,
    /// Last will and testament
    Availability,
}

/// Topics of one device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    short_topic: String,
    sensor: String,
    state: String,
    availability: String,
}

impl Topics {
    /// Topics for a device short topic
    pub fn new(short_topic: impl Into<String>) -> Self {
        let short_topic = short_topic.into();
        Self {
            sensor: format!("tele/{}/SENSOR", short_topic),
            state: format!("tele/{}/STATE", short_topic),
            availability: format!("tele/{}/LWT", short_topic),
            short_topic,
        }
    }

    /// Device short topic
    pub fn short_topic(&self) -> &str {
        &self.short_topic
    }

    /// Topic carrying counter readings
    pub fn sensor(&self) -> &str {
        &self.sensor
    }

    /// Topic carrying uptime
    pub fn state(&self) -> &str {
        &self.state
    }

    /// Topic carrying availability
    pub fn availability(&self) -> &str {
        &self.availability
    }

    /// Topics to subscribe to
    pub fn subscriptions(&self) -> [&str; 3] {
        [&self.sensor, &self.state, &self.availability]
    }

    /// Classify an incoming topic, `None` if it belongs to another device
    pub fn classify(&self, topic: &str) -> Option<TopicKind> {
        if topic == self.sensor {
            Some(TopicKind::Sensor)
        } else if topic == self.state {
            Some(TopicKind::State)
        } else if topic == self.availability {
            Some(TopicKind::Availability)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_layout() {
        let topics = Topics::new("water_out");
        assert_eq!(topics.sensor(), "tele/water_out/SENSOR");
        assert_eq!(topics.state(), "tele/water_out/STATE");
        assert_eq!(topics.availability(), "tele/water_out/LWT");
        assert_eq!(topics.short_topic(), "water_out");
    }

    #[test]
    fn test_classify() {
        let topics = Topics::new("water_out");
        assert_eq!(
            topics.classify("tele/water_out/SENSOR"),
            Some(TopicKind::Sensor)
        );
        assert_eq!(
            topics.classify("tele/water_out/STATE"),
            Some(TopicKind::State)
        );
        assert_eq!(
            topics.classify("tele/water_out/LWT"),
            Some(TopicKind::Availability)
        );
        assert_eq!(topics.classify("tele/water_in/SENSOR"), None);
        assert_eq!(topics.classify("stat/water_out/RESULT"), None);
    }

    #[test]
    fn test_subscriptions() {
        let topics = Topics::new("gas");
        assert_eq!(
            topics.subscriptions(),
            ["tele/gas/SENSOR", "tele/gas/STATE", "tele/gas/LWT"]
        );
    }
}
