//! Counter reconciliation state machine
//!
//! The device counter restarts from zero on every reboot and may wrap at
//! 32 bits. [`CounterReconciler`] turns the resulting stream of raw samples,
//! together with independent uptime reports, into a total that only grows.
//!
//! ```text
//!                 restore_snapshot
//!  Uninitialized ──────────────────┬──────────────▶ HasReference
//!                                  │                   │    ▲
//!                                  ▼    reboot seen    │    │ raw sample
//!                             NoReference ◀────────────┘    │
//!                                  └────────────────────────┘
//! ```
//!
//! Operations never fail. Bad samples are logged and dropped, and every call
//! reports what it did through an outcome enum. Requests for the outside
//! world (persist the snapshot, re-render the display) are queued as
//! [`Effect`]s and drained by the owner.

use std::fmt;

use log::{debug, error, info, warn};

use crate::config::CounterConfig;
use crate::error::{FieldError, Result, TallyError};
use crate::formatter::ValueFormatter;
use crate::snapshot::{Snapshot, SnapshotRecord};

/// Raw counter values wrap at 2^32 on the device
pub const COUNTER_MODULUS: u64 = 1 << 32;

/// Uptime assumed until the first report or a restored snapshot
pub const UPTIME_SENTINEL: u64 = 100_000_000_000;

/// Position in the reconciler lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No snapshot restored yet
    Uninitialized,
    /// Waiting for a raw sample to use as baseline
    NoReference,
    /// Raw samples are diffed against the stored baseline
    HasReference,
}

/// Result of [`CounterReconciler::ingest_raw_sample`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Diff added to the total
    Accepted { diff: u64, wrapped: bool },
    /// Same raw value as the reference
    Duplicate,
    /// Diff larger than `max_valid_diff`; `diff` is `None` when not representable
    RejectedAnomalous { diff: Option<u64>, wrapped: bool },
    /// Sample taken as the new baseline
    Rebaselined,
    /// Sample arrived before the snapshot was restored
    NotReady,
}

impl IngestOutcome {
    /// Check if the sample advanced the total
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }

    /// Short label, used for logs and metric labels
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accepted { .. } => "accepted",
            Self::Duplicate => "duplicate",
            Self::RejectedAnomalous { .. } => "rejected",
            Self::Rebaselined => "rebaselined",
            Self::NotReady => "not_ready",
        }
    }
}

/// Result of [`CounterReconciler::ingest_uptime`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UptimeOutcome {
    /// Uptime moved forward (or stayed)
    Advanced,
    /// Uptime went backwards: the device restarted
    RebootDetected,
    /// Negative value, nothing recorded
    Ignored,
}

/// Result of [`CounterReconciler::restore_snapshot`]
#[derive(Debug, Clone, PartialEq)]
pub enum RestoreOutcome {
    /// No stored state, counters start at zero
    ColdStart,
    /// Stored state adopted; failed fields were set to zero
    Restored {
        has_reference: bool,
        field_errors: Vec<FieldError>,
    },
    /// Already initialized, nothing changed
    AlreadyInitialized,
}

/// Result of [`CounterReconciler::check_liveness`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// An update arrived during the last interval
    Fresh,
    /// Nothing arrived; the display was set to unknown
    Stale,
}

/// What observers should be shown
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayState {
    /// Formatted accumulated value
    Value(String),
    /// No value, or the counter went quiet
    Unknown,
}

impl DisplayState {
    /// Check if the state is unknown
    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }
}

impl fmt::Display for DisplayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => f.write_str(v),
            Self::Unknown => f.write_str("unknown"),
        }
    }
}

/// Request for the owner, fire-and-forget
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Refresh the displayed state
    Render(DisplayState),
    /// Write the snapshot to durable storage
    Persist(Snapshot),
}

/// Reconciles raw device samples into a monotonic total
pub struct CounterReconciler {
    accumulated_value: Option<u64>,
    last_raw_value: Option<u64>,
    last_uptime_seconds: u64,
    has_reference: bool,
    is_fresh: bool,
    max_valid_diff: u64,
    formatter: Option<Box<dyn ValueFormatter>>,
    display: DisplayState,
    effects: Vec<Effect>,
}

impl CounterReconciler {
    /// Create an uninitialized reconciler
    pub fn new(max_valid_diff: u64) -> Result<Self> {
        if max_valid_diff == 0 {
            return Err(TallyError::InvalidConfig(
                "max_valid_diff must be a positive integer".to_string(),
            ));
        }

        Ok(Self {
            accumulated_value: None,
            last_raw_value: None,
            last_uptime_seconds: UPTIME_SENTINEL,
            has_reference: false,
            is_fresh: true,
            max_valid_diff,
            formatter: None,
            display: DisplayState::Unknown,
            effects: Vec::new(),
        })
    }

    /// Create a reconciler from a validated configuration
    pub fn from_config(config: &CounterConfig) -> Result<Self> {
        config.validate()?;
        let mut reconciler = Self::new(config.max_valid_diff)?;
        reconciler.formatter = config.formatter.as_ref().map(|f| f.build());
        Ok(reconciler)
    }

    /// Set the display formatter
    pub fn with_formatter(mut self, formatter: impl ValueFormatter + 'static) -> Self {
        self.formatter = Some(Box::new(formatter));
        self
    }

    /// Record a device uptime report
    pub fn ingest_uptime(&mut self, uptime_seconds: i64) -> UptimeOutcome {
        let Ok(uptime) = u64::try_from(uptime_seconds) else {
            return UptimeOutcome::Ignored;
        };

        let outcome = if uptime < self.last_uptime_seconds {
            info!(
                "Device reboot detected (uptime {}s < {}s), waiting for new reference",
                uptime, self.last_uptime_seconds
            );
            self.has_reference = false;
            UptimeOutcome::RebootDetected
        } else {
            UptimeOutcome::Advanced
        };

        self.last_uptime_seconds = uptime;
        outcome
    }

    /// Apply a raw counter sample
    pub fn ingest_raw_sample(&mut self, new_raw: u64) -> IngestOutcome {
        let Some(total) = self.accumulated_value else {
            warn!("Raw sample {} received before initialization, dropped", new_raw);
            return IngestOutcome::NotReady;
        };

        let old_raw = match self.last_raw_value {
            Some(old) if self.has_reference => old,
            _ => {
                debug!("New reference value {}", new_raw);
                self.last_raw_value = Some(new_raw);
                self.has_reference = true;
                return IngestOutcome::Rebaselined;
            }
        };

        let wrapped = new_raw < old_raw;
        let diff = if wrapped {
            let diff = new_raw
                .checked_add(COUNTER_MODULUS)
                .and_then(|n| n.checked_sub(old_raw));
            match diff {
                Some(d) if d <= self.max_valid_diff => d,
                _ => {
                    error!(
                        "New counter ({}) is smaller than old ({}) and is not a wrap, missed an uptime report?",
                        new_raw, old_raw
                    );
                    return IngestOutcome::RejectedAnomalous { diff, wrapped };
                }
            }
        } else {
            new_raw - old_raw
        };

        if diff == 0 {
            return IngestOutcome::Duplicate;
        }

        if diff > self.max_valid_diff {
            error!(
                "Diff too high ({}), new: {} old: {}, sample dropped",
                diff, new_raw, old_raw
            );
            return IngestOutcome::RejectedAnomalous {
                diff: Some(diff),
                wrapped,
            };
        }

        debug!("Accepted diff {} (new: {} old: {})", diff, new_raw, old_raw);
        self.accumulated_value = Some(total.saturating_add(diff));
        self.last_raw_value = Some(new_raw);
        self.is_fresh = true;
        self.publish();

        IngestOutcome::Accepted { diff, wrapped }
    }

    /// Initialize from stored state, or from zero when there is none
    pub fn restore_snapshot(&mut self, record: Option<&SnapshotRecord>) -> RestoreOutcome {
        if self.accumulated_value.is_some() {
            return RestoreOutcome::AlreadyInitialized;
        }

        let Some(record) = record else {
            info!("No stored state found, starting from zero");
            self.accumulated_value = Some(0);
            self.last_raw_value = Some(0);
            self.has_reference = false;
            self.publish();
            return RestoreOutcome::ColdStart;
        };

        let (snapshot, field_errors) = record.decode();
        for e in &field_errors {
            warn!("Restoring stored state: {}, using 0", e);
        }

        self.accumulated_value = Some(snapshot.value);
        self.last_raw_value = Some(snapshot.old_value);
        self.last_uptime_seconds = snapshot.uptime_sec;
        // Zero or sentinel: no uptime was ever seen, so old_value was never a baseline
        self.has_reference = snapshot.uptime_sec > 0 && snapshot.uptime_sec < UPTIME_SENTINEL;
        info!(
            "Restored value {} (reference {}, uptime {}s, has_reference {})",
            snapshot.value, snapshot.old_value, snapshot.uptime_sec, self.has_reference
        );
        self.publish();

        RestoreOutcome::Restored {
            has_reference: self.has_reference,
            field_errors,
        }
    }

    /// Periodic freshness check
    pub fn check_liveness(&mut self) -> Liveness {
        if self.is_fresh {
            self.is_fresh = false;
            return Liveness::Fresh;
        }

        debug!("No counter update during the last interval");
        self.display = DisplayState::Unknown;
        self.effects.push(Effect::Render(DisplayState::Unknown));
        Liveness::Stale
    }

    /// Formatted accumulated value, `None` before initialization
    pub fn display_value(&self) -> Option<String> {
        self.accumulated_value.map(|v| match &self.formatter {
            Some(formatter) => formatter.format(v),
            None => v.to_string(),
        })
    }

    /// State currently shown to observers
    pub fn display_state(&self) -> &DisplayState {
        &self.display
    }

    /// State to persist, `None` before initialization
    ///
    /// `uptime_sec` is 0 until the device reported an uptime.
    pub fn snapshot(&self) -> Option<Snapshot> {
        self.accumulated_value.map(|value| Snapshot {
            value,
            old_value: self.last_raw_value.unwrap_or(0),
            uptime_sec: self.reported_uptime().unwrap_or(0),
        })
    }

    /// Take all queued effects
    pub fn drain_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    /// Queued effects not yet drained
    pub fn pending_effects(&self) -> &[Effect] {
        &self.effects
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> Phase {
        match (self.accumulated_value, self.has_reference) {
            (None, _) => Phase::Uninitialized,
            (Some(_), false) => Phase::NoReference,
            (Some(_), true) => Phase::HasReference,
        }
    }

    /// Accumulated total
    pub fn accumulated_value(&self) -> Option<u64> {
        self.accumulated_value
    }

    /// Current raw reference
    pub fn last_raw_value(&self) -> Option<u64> {
        self.last_raw_value
    }

    /// Last device uptime seen
    pub fn last_uptime_seconds(&self) -> u64 {
        self.last_uptime_seconds
    }

    /// Last device uptime, `None` while only the sentinel is known
    pub fn reported_uptime(&self) -> Option<u64> {
        Some(self.last_uptime_seconds).filter(|u| *u < UPTIME_SENTINEL)
    }

    /// Check if raw samples are diffed against a trusted baseline
    pub fn has_reference(&self) -> bool {
        self.has_reference
    }

    /// Check if an update arrived since the last liveness check
    pub fn is_fresh(&self) -> bool {
        self.is_fresh
    }

    /// Largest accepted single increment
    pub fn max_valid_diff(&self) -> u64 {
        self.max_valid_diff
    }

    fn publish(&mut self) {
        let (Some(value), Some(snapshot)) = (self.display_value(), self.snapshot()) else {
            return;
        };
        self.display = DisplayState::Value(value);
        self.effects.push(Effect::Render(self.display.clone()));
        self.effects.push(Effect::Persist(snapshot));
    }
}

impl fmt::Debug for CounterReconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CounterReconciler")
            .field("accumulated_value", &self.accumulated_value)
            .field("last_raw_value", &self.last_raw_value)
            .field("last_uptime_seconds", &self.last_uptime_seconds)
            .field("has_reference", &self.has_reference)
            .field("is_fresh", &self.is_fresh)
            .field("max_valid_diff", &self.max_valid_diff)
            .field("formatter", &self.formatter.is_some())
            .field("display", &self.display)
            .finish()
    }
}
