//! Error type shared by the calculation services.

use crate::db::repository::RepositoryError;

pub type CalculationResult<T> = Result<T, CalculationError>;

#[derive(Debug, thiserror::Error)]
#[allow(clippy::result_large_err)]
pub enum CalculationError {
    /// Missing measure, subset, entity or preload task.
    #[error("Not found: {message}")]
    NotFound { message: String },

    /// The request cannot be calculated as asked.
    #[error("Bad request: {message}")]
    BadRequest { message: String },

    /// A named comparand was not part of the compared results.
    #[error("Significance could not be calculated against '{comparand}'")]
    SignificanceCalculation { comparand: String },

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// Results that must line up (entities, days) do not.
    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("Calculation cancelled")]
    Cancelled,
}

impl CalculationError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn significance(comparand: impl Into<String>) -> Self {
        Self::SignificanceCalculation {
            comparand: comparand.into(),
        }
    }

    /// True for transient data-source failures a caller may retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Repository(e) => e.is_retryable(),
            _ => false,
        }
    }
}
