//! Mapping of core errors to HTTP responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use consultboard_core::CoreError;
use serde_json::json;
use tracing::{error, warn};

#[derive(Debug)]
pub enum ApiError {
    /// Missing or unknown acting user
    Unauthorized(String),
    BadRequest(String),
    NotFound(String),
    Core(CoreError),
    Internal(String),
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        ApiError::Core(err)
    }
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Core(err) => match err {
                CoreError::ConsultantNotFound { .. }
                | CoreError::MissionNotFound { .. }
                | CoreError::LeadNotFound { .. }
                | CoreError::BillNotFound { .. }
                | CoreError::ExpenseNotFound { .. }
                | CoreError::FileNotFound { .. } => StatusCode::NOT_FOUND,
                CoreError::UserNotFound { .. } => StatusCode::UNAUTHORIZED,
                CoreError::PermissionDenied { .. } => StatusCode::FORBIDDEN,
                CoreError::InvalidTransition { .. } => StatusCode::CONFLICT,
                CoreError::TimesheetValidation { .. }
                | CoreError::InvalidValue { .. }
                | CoreError::NoProductiveConsultant
                | CoreError::MissionWithoutLead { .. } => StatusCode::BAD_REQUEST,
                CoreError::ReadOnly { .. } => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Unauthorized(m)
            | ApiError::BadRequest(m)
            | ApiError::NotFound(m)
            | ApiError::Internal(m) => m.clone(),
            ApiError::Core(err) => err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.message();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %message, "Request failed");
        } else {
            warn!(status = status.as_u16(), error = %message, "Request rejected");
        }
        (status, Json(json!({ "error": message }))).into_response()
    }
}
