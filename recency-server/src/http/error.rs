use axum::{http::StatusCode, response::IntoResponse};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use super::problem::ProblemDetails;
use crate::services::SummaryError;

pub type AppResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
#[error("{code}: {message}")]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "validation_failed", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, "conflict", message)
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
    }

    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let mut problem = ProblemDetails::new(self.status, self.code, self.message);
        if let Some(details) = self.details {
            problem = problem.with_details(details);
        }
        problem.into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        error!(error = %err, "database failure");
        if let sqlx::Error::Database(db_err) = &err {
            let code = db_err
                .code()
                .unwrap_or(std::borrow::Cow::Borrowed("unknown"));
            return Self::internal_server_error(format!("database error {code}"))
                .with_details(json!({ "sqlstate": code }));
        }

        Self::internal_server_error("database unavailable")
    }
}

impl From<SummaryError> for ApiError {
    fn from(err: SummaryError) -> Self {
        match err {
            SummaryError::NotFound(message) => Self::not_found(message),
            SummaryError::Validation(message) => Self::bad_request(message),
            SummaryError::Conflict(message) => Self::conflict(message),
            SummaryError::Database(db_err) => Self::from(db_err),
        }
    }
}
