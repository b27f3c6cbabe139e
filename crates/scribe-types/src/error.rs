use thiserror::Error;

pub type DomainResult<T> = std::result::Result<T, DomainError>;

/// Rule violations raised by domain records. A method that returns one of
/// these has not mutated the record.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DomainError {
    #[error("{0}")]
    Validation(String),

    #[error("cannot move from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub(crate) fn transition(from: impl ToString, to: impl ToString) -> Self {
        Self::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

/// Check that `value` lies in `[min, max]`.
pub(crate) fn ensure_range(
    field: &'static str,
    value: f64,
    min: f64,
    max: f64,
) -> DomainResult<()> {
    if value.is_finite() && value >= min && value <= max {
        Ok(())
    } else {
        Err(DomainError::OutOfRange {
            field,
            value,
            min,
            max,
        })
    }
}
