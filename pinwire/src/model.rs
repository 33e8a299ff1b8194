// model.rs — Declarative pin/variable model
//
// The accumulator a host graph threads through its nodes. Every operation
// takes `&self` and returns a fresh, independently owned `Model`, so two
// branches of a graph that fork from the same value never observe each
// other's writes.
//
// Preconditions: none.
// Postconditions: pin-state names always carry the `state_pin_` prefix and
//                 shared names never do.
// Failure modes: invalid shared variable names produce `ModelError`.
// Side effects: none.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol::normalize_value;

/// Reserved prefix for pin-derived variable names.
pub const PIN_STATE_PREFIX: &str = "state_pin_";

/// Variable name used for the state of `pin`.
pub fn pin_state_name(pin: u32) -> String {
    format!("{}{}", PIN_STATE_PREFIX, pin)
}

/// Pin number encoded in a pin-state name, if the name is well formed.
pub fn pin_number_of(name: &str) -> Option<u32> {
    let suffix = name.strip_prefix(PIN_STATE_PREFIX)?;
    if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    suffix.parse().ok()
}

// ── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("variable name is empty")]
    EmptyName,
    #[error("variable name '{0}' uses the reserved prefix 'state_pin_'")]
    ReservedName(String),
    #[error("variable name {0:?} contains whitespace or control characters")]
    InvalidName(String),
}

// ── Pin values ──────────────────────────────────────────────────────────────

/// Output mode a pin state is written with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PinKind {
    Digital,
    Analog,
}

/// Logic level for a digital write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    High,
    Low,
}

impl Level {
    pub fn as_value(self) -> i64 {
        match self {
            Level::High => 1,
            Level::Low => 0,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::High => write!(f, "HIGH"),
            Level::Low => write!(f, "LOW"),
        }
    }
}

/// Initial value recorded for a pin state.
///
/// Serialized as `"HIGH"`, `"LOW"` or a number. Numeric strings are accepted
/// on input and normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPinValue", into = "RawPinValue")]
pub enum PinValue {
    Level(Level),
    Number(i64),
}

impl PinValue {
    /// Integer seeded into the control slot at startup.
    pub fn as_control_value(self) -> i64 {
        match self {
            PinValue::Level(level) => level.as_value(),
            PinValue::Number(n) => n,
        }
    }
}

impl From<Level> for PinValue {
    fn from(level: Level) -> Self {
        PinValue::Level(level)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawPinValue {
    Number(i64),
    Text(String),
}

impl TryFrom<RawPinValue> for PinValue {
    type Error = String;

    fn try_from(raw: RawPinValue) -> Result<Self, Self::Error> {
        match raw {
            RawPinValue::Number(n) => Ok(PinValue::Number(n)),
            RawPinValue::Text(text) => {
                let trimmed = text.trim();
                if trimmed.eq_ignore_ascii_case("HIGH") {
                    Ok(PinValue::Level(Level::High))
                } else if trimmed.eq_ignore_ascii_case("LOW") {
                    Ok(PinValue::Level(Level::Low))
                } else {
                    normalize_value(trimmed)
                        .map(PinValue::Number)
                        .ok_or_else(|| format!("invalid pin value '{}'", text))
                }
            }
        }
    }
}

impl From<PinValue> for RawPinValue {
    fn from(value: PinValue) -> Self {
        match value {
            PinValue::Level(level) => RawPinValue::Text(level.to_string()),
            PinValue::Number(n) => RawPinValue::Number(n),
        }
    }
}

/// Recorded state of one written pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinState {
    pub kind: PinKind,
    pub initial_value: PinValue,
}

// ── Model ───────────────────────────────────────────────────────────────────

/// The declarative model ("code block") accumulated from a graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Model {
    pins_to_configure: BTreeSet<u32>,
    pin_states: BTreeMap<String, PinState>,
    shared_variable_names: Vec<String>,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pins_to_configure(&self) -> &BTreeSet<u32> {
        &self.pins_to_configure
    }

    pub fn pin_states(&self) -> &BTreeMap<String, PinState> {
        &self.pin_states
    }

    /// Shared names in declaration order, without duplicates.
    pub fn shared_variable_names(&self) -> &[String] {
        &self.shared_variable_names
    }

    /// Declare a shared variable. Re-declaring an existing name is a no-op.
    pub fn create_variable(&self, name: &str) -> Result<Model, ModelError> {
        validate_variable_name(name)?;
        let mut next = self.clone();
        if !next.shared_variable_names.iter().any(|n| n == name) {
            next.shared_variable_names.push(name.to_string());
        }
        Ok(next)
    }

    /// Configure `pin` as an output driven with `digitalWrite`.
    pub fn digital_write(&self, pin: u32, level: Level) -> Model {
        self.write_pin(pin, PinKind::Digital, PinValue::Level(level))
    }

    /// Configure `pin` as an output driven with `analogWrite` (PWM duty).
    pub fn analog_write(&self, pin: u32, duty: u8) -> Model {
        self.write_pin(pin, PinKind::Analog, PinValue::Number(i64::from(duty)))
    }

    fn write_pin(&self, pin: u32, kind: PinKind, initial_value: PinValue) -> Model {
        let mut next = self.clone();
        next.pins_to_configure.insert(pin);
        next.pin_states.insert(
            pin_state_name(pin),
            PinState {
                kind,
                initial_value,
            },
        );
        next
    }

    /// Apply one graph operation.
    pub fn apply(&self, op: &ModelOp) -> Result<Model, ModelError> {
        match op {
            ModelOp::CreateVariable { name } => self.create_variable(name),
            ModelOp::DigitalWrite { pin, value } => Ok(self.digital_write(*pin, *value)),
            ModelOp::AnalogWrite { pin, value } => Ok(self.analog_write(*pin, *value)),
            ModelOp::Delay { .. } => Ok(self.clone()),
        }
    }

    /// Fold a sequence of operations starting from an empty model.
    pub fn from_ops<'a>(ops: impl IntoIterator<Item = &'a ModelOp>) -> Result<Model, ModelError> {
        ops.into_iter()
            .try_fold(Model::new(), |model, op| model.apply(op))
    }

    /// True when the model declares nothing addressable.
    pub fn is_empty(&self) -> bool {
        self.pin_states.is_empty() && self.shared_variable_names.is_empty()
    }
}

fn validate_variable_name(name: &str) -> Result<(), ModelError> {
    if name.is_empty() {
        return Err(ModelError::EmptyName);
    }
    if name.starts_with(PIN_STATE_PREFIX) {
        return Err(ModelError::ReservedName(name.to_string()));
    }
    if name.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ModelError::InvalidName(name.to_string()));
    }
    Ok(())
}

// ── Graph operations ────────────────────────────────────────────────────────

/// One node of a serialized graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ModelOp {
    CreateVariable { name: String },
    DigitalWrite { pin: u32, value: Level },
    AnalogWrite { pin: u32, value: u8 },
    /// Accepted for graph compatibility; the generated loop runs unpaced.
    Delay { delay_ms: u32 },
}

/// Parse a JSON array of operations into a model.
pub fn model_from_json(text: &str) -> Result<Model, GraphError> {
    let ops: Vec<ModelOp> = serde_json::from_str(text)?;
    Ok(Model::from_ops(&ops)?)
}

/// Failure loading a serialized graph.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("invalid graph JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Model(#[from] ModelError),
}
