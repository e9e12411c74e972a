// src/services/error.rs
use thiserror::Error;

/// Failure kinds shared by the engines and the external clients.
///
/// A zero invested amount is not an error; the SIP metrics guard against it.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid input: {0}")]
    InputValidation(String),

    #[error("could not resolve fund: {0}")]
    ResolutionFailure(String),

    #[error("fund data unavailable: {0}")]
    DataUnavailable(String),

    #[error("upstream request timed out: {0}")]
    UpstreamTimeout(String),

    #[error("upstream request failed: {0}")]
    Upstream(String),
}

impl ServiceError {
    pub fn invalid(message: impl Into<String>) -> Self {
        ServiceError::InputValidation(message.into())
    }

    /// Prefixes the message of an input error; other kinds pass through.
    pub fn prefixed(self, prefix: &str) -> Self {
        match self {
            ServiceError::InputValidation(msg) => ServiceError::InputValidation(format!("{}: {}", prefix, msg)),
            other => other,
        }
    }

    /// Classify a reqwest failure for the given call site.
    pub fn from_http(context: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ServiceError::UpstreamTimeout(format!("{}: {}", context, err))
        } else {
            ServiceError::Upstream(format!("{}: {}", context, err))
        }
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
