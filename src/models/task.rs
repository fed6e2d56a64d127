use serde::{Deserialize, Deserializer, Serialize};

/// The completion check attached to a stage.
///
/// A task is only the *definition*; what the player actually did arrives as
/// [`Evidence`] and is judged by [`Task::evaluate`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Task {
    /// Every labeled item must be checked.
    Checklist { items: Vec<String> },
    /// The recorded progress must equal `target` exactly.
    NumericThreshold {
        target: u32,
        /// Progress values the view offers, e.g. 25/50/75/100.
        #[serde(default)]
        steps: Vec<u32>,
    },
    /// A raw measurement is scaled into an advisory figure. Never gates completion.
    FreeformMeasurement { unit: String, scale_factor: f64 },
}

/// What the player submitted for a task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Evidence {
    /// Index-aligned with [`Task::Checklist::items`].
    Checklist { checked: Vec<bool> },
    Progress { value: u32 },
    Measurement {
        /// Accepts a number or the raw text typed into the field.
        #[serde(default, deserialize_with = "measurement_input")]
        input: Option<f64>,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawMeasurement {
    Number(f64),
    Text(String),
}

fn measurement_input<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    Ok(match Option::<RawMeasurement>::deserialize(deserializer)? {
        Some(RawMeasurement::Number(value)) => Some(value).filter(|v| v.is_finite()),
        Some(RawMeasurement::Text(text)) => parse_measurement(&text),
        None => None,
    })
}

/// Outcome of judging evidence against a task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TaskEvaluation {
    pub satisfied: bool,
    /// Only set for measurement tasks with a usable input.
    pub derived_result: Option<f64>,
}

impl Task {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Checklist { .. } => "checklist",
            Self::NumericThreshold { .. } => "numeric_threshold",
            Self::FreeformMeasurement { .. } => "freeform_measurement",
        }
    }

    /// Judge `evidence` against this task.
    ///
    /// Evidence of the wrong shape never satisfies a task. Checklist evidence
    /// must cover every item.
    pub fn evaluate(&self, evidence: &Evidence) -> TaskEvaluation {
        match (self, evidence) {
            (Self::Checklist { items }, Evidence::Checklist { checked }) => TaskEvaluation {
                satisfied: checked.len() == items.len() && checked.iter().all(|c| *c),
                derived_result: None,
            },
            (Self::NumericThreshold { target, .. }, Evidence::Progress { value }) => {
                TaskEvaluation {
                    satisfied: value == target,
                    derived_result: None,
                }
            }
            (Self::FreeformMeasurement { scale_factor, .. }, Evidence::Measurement { input }) => {
                TaskEvaluation {
                    satisfied: true,
                    derived_result: input.and_then(|raw| derive_measurement(raw, *scale_factor)),
                }
            }
            _ => TaskEvaluation {
                satisfied: false,
                derived_result: None,
            },
        }
    }

    pub fn is_satisfied(&self, evidence: &Evidence) -> bool {
        self.evaluate(evidence).satisfied
    }
}

/// Scale a raw measurement and round half-up to one decimal place.
///
/// Returns `None` for non-finite input.
pub fn derive_measurement(raw: f64, scale_factor: f64) -> Option<f64> {
    if !raw.is_finite() {
        return None;
    }
    let scaled = raw * scale_factor;
    Some((scaled * 10.0 + 0.5).floor() / 10.0)
}

/// Parse free text typed into a measurement field.
///
/// Reads the longest leading number and ignores the rest, so `"150cm"` is
/// 150. Text with no leading number yields `None`, which leaves the derived
/// figure empty.
pub fn parse_measurement(text: &str) -> Option<f64> {
    let text = text.trim_start();
    let numeric = text
        .find(|c: char| !(c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E')))
        .unwrap_or(text.len());
    let candidate = &text[..numeric];
    (1..=candidate.len())
        .rev()
        .find_map(|end| candidate[..end].parse::<f64>().ok())
        .filter(|v| v.is_finite())
}
