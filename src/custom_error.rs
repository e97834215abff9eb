use std::error::Error;
use std::fmt;

use axum::Json;
use axum::response::IntoResponse;
use hyper::StatusCode;
use serde_json::json;

#[derive(Debug, Clone)]
pub struct ScratchError {
    pub status_code: StatusCode,
    pub message: String,
}

impl IntoResponse for ScratchError {
    fn into_response(self) -> axum::response::Response {
        let payload = json!({
            "detail": self.message,
        });
        (self.status_code, Json(payload)).into_response()
    }
}

impl Error for ScratchError {}

impl fmt::Display for ScratchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status_code, self.message)
    }
}

impl ScratchError {
    pub fn new(status_code: StatusCode, message: String) -> Self {
        ScratchError {
            status_code,
            message,
        }
    }
}

// Lifecycle operations reject before any write: validation and authorization
// failures leave the store untouched, transient failures are safe to retry
// because ids are deterministic.
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleError {
    Validation(String),
    Authorization(String),
    NotFound(String),
    Transient(String),
}

impl fmt::Display for LifecycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleError::Validation(msg) => write!(f, "validation: {}", msg),
            LifecycleError::Authorization(msg) => write!(f, "authorization: {}", msg),
            LifecycleError::NotFound(msg) => write!(f, "not found: {}", msg),
            LifecycleError::Transient(msg) => write!(f, "transient: {}", msg),
        }
    }
}

impl Error for LifecycleError {}

impl LifecycleError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            LifecycleError::Validation(_) => StatusCode::BAD_REQUEST,
            LifecycleError::Authorization(_) => StatusCode::FORBIDDEN,
            LifecycleError::NotFound(_) => StatusCode::NOT_FOUND,
            LifecycleError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<LifecycleError> for ScratchError {
    fn from(e: LifecycleError) -> Self {
        ScratchError::new(e.status_code(), e.to_string())
    }
}
