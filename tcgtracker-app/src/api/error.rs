//! HTTP error type and its JSON body.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tcgtracker_core::CoreError;

pub mod codes {
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    pub const BAD_REQUEST: &str = "BAD_REQUEST";
    pub const STORE_ERROR: &str = "STORE_ERROR";
}

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    Validation(String),
    /// Malformed request (bad JSON, bad id)
    BadRequest(String),
    /// Corrupt store or failed disk I/O
    Store(String),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Validation(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => codes::NOT_FOUND,
            ApiError::Validation(_) => codes::VALIDATION_ERROR,
            ApiError::BadRequest(_) => codes::BAD_REQUEST,
            ApiError::Store(_) => codes::STORE_ERROR,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ApiError::NotFound(m)
            | ApiError::Validation(m)
            | ApiError::BadRequest(m)
            | ApiError::Store(m) => m,
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error_code(), self.message())
    }
}

impl std::error::Error for ApiError {}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(m) => ApiError::Validation(m),
            e @ CoreError::NotFound { .. } => ApiError::NotFound(e.to_string()),
            e => {
                tracing::error!(error = %e, "store failure");
                ApiError::Store(e.to_string())
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rej: JsonRejection) -> Self {
        ApiError::BadRequest(rej.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            code: self.error_code().to_string(),
            message: self.message().to_string(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}
