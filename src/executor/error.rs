//! @ai:module:intent Error taxonomy returned by generation functions
//! @ai:module:layer domain
//! @ai:module:public_api ExecutorError
//! @ai:module:stateless true

use std::time::Duration;
use thiserror::Error;

/// @ai:intent Outcome of a failed generation attempt
///            The variant decides how the executor and rate limiter react
#[derive(Error, Debug)]
pub enum ExecutorError {
    /// Input is unusable; the attempt is never retried
    #[error("Missing input: {0}")]
    MissingInput(String),

    /// Member of a rate-limit taxonomy identified by `kind`
    #[error("Rate limited ({kind}): {message}")]
    RateLimited { kind: String, message: String },

    #[error("Attempt timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ExecutorError {
    /// @ai:intent Create a transient failure from any displayable message
    /// @ai:effects pure
    pub fn failed(message: impl Into<String>) -> Self {
        ExecutorError::Failed(message.into())
    }

    /// @ai:intent Create a missing-input error
    /// @ai:effects pure
    pub fn missing_input(message: impl Into<String>) -> Self {
        ExecutorError::MissingInput(message.into())
    }

    /// @ai:intent Create a rate-limit error of the given kind
    /// @ai:effects pure
    pub fn rate_limited(kind: impl Into<String>, message: impl Into<String>) -> Self {
        ExecutorError::RateLimited {
            kind: kind.into(),
            message: message.into(),
        }
    }

    pub fn is_missing_input(&self) -> bool {
        matches!(self, ExecutorError::MissingInput(_))
    }

    /// @ai:intent Rate-limit kind when this is a rate-limit error
    /// @ai:effects pure
    pub fn rate_limit_kind(&self) -> Option<&str> {
        match self {
            ExecutorError::RateLimited { kind, .. } => Some(kind),
            _ => None,
        }
    }
}
