use thiserror::Error;

use crate::models::attempt::AttemptStatus;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("attempt {attempt_id} is {status}; cannot {operation}")]
    InvalidState {
        attempt_id: String,
        status: AttemptStatus,
        operation: &'static str,
    },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("transient I/O failure: {0:#}")]
    TransientIo(#[from] anyhow::Error),
}

impl EngineError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        EngineError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        EngineError::Validation(message.into())
    }

    /// Only store/network failures are worth retrying from the caller's side.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::TransientIo(_))
    }
}

impl From<validator::ValidationErrors> for EngineError {
    fn from(errors: validator::ValidationErrors) -> Self {
        EngineError::Validation(errors.to_string())
    }
}
