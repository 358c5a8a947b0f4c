use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::operations::EvalError;

/// Application-level error taxonomy.
///
/// Every failure path in the service maps onto one of these variants, and
/// every variant maps onto exactly one HTTP status:
///
/// * `Validation` - malformed input shape, 422
/// * `BusinessRule` - zero divisors, duplicate email/username, password
///   rules, 400
/// * `Unauthorized` - missing/invalid/expired token or bad credentials, 401
/// * `NotFound` - missing *or not-owned* resource, 404 (deliberately
///   indistinguishable from "forbidden" so existence never leaks)
/// * `Internal` - anything unexpected, 500 with a generic body
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    BusinessRule(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<EvalError> for AppError {
    fn from(err: EvalError) -> Self {
        AppError::BusinessRule(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, detail) = match &self {
            AppError::Validation(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone()),
            AppError::BusinessRule(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Internal(msg) => {
                log::error!("internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
        };

        (status, Json(json!({ "detail": detail }))).into_response()
    }
}
