//! Display formatting of the accumulated value
//!
//! A formatter is a pure transform from the accumulated pulse count to the
//! string shown to observers (for example litres to cubic metres). It has no
//! influence on accumulation.

use serde::{Deserialize, Serialize};

/// Placeholder substituted by [`FormatterConfig::Template`]
pub const VALUE_PLACEHOLDER: &str = "{value}";

/// Transform applied to the accumulated value before display
pub trait ValueFormatter: Send + Sync {
    /// Render the accumulated value
    fn format(&self, value: u64) -> String;
}

impl<F> ValueFormatter for F
where
    F: Fn(u64) -> String + Send + Sync,
{
    fn format(&self, value: u64) -> String {
        self(value)
    }
}

/// Declarative formatter selection, as found in the counter configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FormatterConfig {
    /// Divide by `divisor` and print with `precision` decimals
    Scale { divisor: f64, precision: usize },
    /// Replace every `{value}` in `template` with the accumulated value
    Template { template: String },
}

impl FormatterConfig {
    /// Build the formatter described by this configuration
    pub fn build(&self) -> Box<dyn ValueFormatter> {
        match self {
            Self::Scale { divisor, precision } => Box::new(ScaleFormatter {
                divisor: *divisor,
                precision: *precision,
            }),
            Self::Template { template } => Box::new(TemplateFormatter {
                template: template.clone(),
            }),
        }
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        match self {
            Self::Scale { divisor, .. } if !divisor.is_finite() || *divisor <= 0.0 => {
                Err(format!("scale divisor must be positive, got {}", divisor))
            }
            Self::Template { template } if !template.contains(VALUE_PLACEHOLDER) => Err(format!(
                "template '{}' does not reference {}",
                template, VALUE_PLACEHOLDER
            )),
            _ => Ok(()),
        }
    }
}

/// Unit conversion by a constant divisor
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleFormatter {
    pub divisor: f64,
    pub precision: usize,
}

impl ValueFormatter for ScaleFormatter {
    fn format(&self, value: u64) -> String {
        format!("{:.*}", self.precision, value as f64 / self.divisor)
    }
}

/// Plain text substitution
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateFormatter {
    pub template: String,
}

impl ValueFormatter for TemplateFormatter {
    fn format(&self, value: u64) -> String {
        self.template.replace(VALUE_PLACEHOLDER, &value.to_string())
    }
}
