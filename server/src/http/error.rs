use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

use super::dto::ErrorResponse;
use crate::registry::RegistryError;

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    ServiceUnavailable(String),
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, details) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "Not Found", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "Bad Request", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "Conflict", msg),
            ApiError::ServiceUnavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable", msg)
            }
            ApiError::InternalError(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Server Error",
                msg,
            ),
        };

        let body = Json(ErrorResponse {
            error: error.to_string(),
            details: Some(details),
        });

        (status, body).into_response()
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(_) => ApiError::NotFound(err.to_string()),
            RegistryError::AlreadyExists(_) => ApiError::Conflict(err.to_string()),
            RegistryError::Malformed(msg) => ApiError::BadRequest(msg),
            RegistryError::BackendUnavailable(_) => {
                error!(error = %err, "backend call failed");
                ApiError::ServiceUnavailable(err.to_string())
            }
            RegistryError::Serialization { .. } => {
                error!(error = %err, "stored value could not be decoded");
                ApiError::InternalError(err.to_string())
            }
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
