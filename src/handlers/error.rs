// src/handlers/error.rs
use std::fmt;
use warp::http::StatusCode;
use warp::reject::Reject;

use crate::services::error::ServiceError;

#[derive(Debug, Clone)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        let status = match &err {
            ServiceError::InputValidation(_) => StatusCode::BAD_REQUEST,
            ServiceError::ResolutionFailure(_) | ServiceError::DataUnavailable(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ServiceError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ServiceError::Upstream(_) => StatusCode::BAD_GATEWAY,
        };
        // Validation messages go to the client verbatim.
        let message = match err {
            ServiceError::InputValidation(msg) => msg,
            other => other.to_string(),
        };
        ApiError { status, message }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ApiError {}
impl Reject for ApiError {}

/// Logs a service failure and turns it into a rejection.
pub fn reject(err: ServiceError) -> warp::Rejection {
    log::error!("Request failed: {}", err);
    warp::reject::custom(ApiError::from(err))
}
