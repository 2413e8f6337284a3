use std::{error, fmt};

/// Errors raised by the simulation core.
///
/// Every variant is fatal for the run: no partial output is returned.
#[derive(Debug, Clone, PartialEq)]
pub enum SimError {
    /// A per-strain vector (or the state vector) has the wrong length.
    ShapeMismatch {
        name: &'static str,
        expected: usize,
        found: usize,
    },

    /// The integrator could not advance the solution within its step limits.
    IntegrationFailure { time: f64, reason: String },

    /// No strain slot is empty at the end of a window, so no strain can be introduced.
    NoExtinctionSlot { window: usize, time: f64 },

    /// A scalar input is outside its admissible range.
    InvalidInput(String),
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ShapeMismatch {
                name,
                expected,
                found,
            } => write!(f, "{name} must have length {expected}, but has {found}"),
            Self::IntegrationFailure { time, reason } => {
                write!(f, "integration failed at t = {time}: {reason}")
            }
            Self::NoExtinctionSlot { window, time } => write!(
                f,
                "no extinct strain slot at the end of window {window} (t = {time})"
            ),
            Self::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
        }
    }
}

impl error::Error for SimError {}

pub type SimResult<T> = Result<T, SimError>;
