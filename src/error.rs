use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;
use validator::ValidationErrors;

use crate::{
    dao::storage::StorageError,
    state::{state_machine::InvalidTransition, turns::TurnError},
};

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Storage backend failed.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// Application is running in degraded mode without storage.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
    /// The caller carries no resolvable identity.
    #[error("no identity available for the caller")]
    IdentityUnavailable,
    /// The caller is not the host of the room.
    #[error("only the host of room `{0}` can do this")]
    NotHost(Uuid),
    /// No room with this id.
    #[error("room `{0}` not found")]
    RoomNotFound(Uuid),
    /// No waiting room holds the code, or the room is full.
    #[error("room cannot be joined: {0}")]
    RoomNotJoinable(String),
    /// The optimistic transaction kept losing against concurrent writers.
    #[error("room `{0}` was modified concurrently; retry later")]
    ConcurrentWriteConflict(Uuid),
    /// Persisted data contradicts the room invariants.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Operation cannot be performed in the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Conflict { room_id } => ServiceError::ConcurrentWriteConflict(room_id),
            StorageError::NotFound { room_id } => ServiceError::RoomNotFound(room_id),
            other => ServiceError::Unavailable(other),
        }
    }
}

impl From<InvalidTransition> for ServiceError {
    fn from(err: InvalidTransition) -> Self {
        ServiceError::InvalidState(err.to_string())
    }
}

impl From<TurnError> for ServiceError {
    fn from(err: TurnError) -> Self {
        match err {
            TurnError::Transition(invalid) => invalid.into(),
            other => ServiceError::InvariantViolation(other.to_string()),
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {}", err))
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed or invalid request (400).
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Missing caller identity (401).
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Caller is not allowed to act (403).
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// Unknown resource (404).
    #[error("not found: {0}")]
    NotFound(String),
    /// Request conflicts with the current room state (409).
    #[error("conflict: {0}")]
    Conflict(String),
    /// Storage is down or degraded (503).
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    /// Unexpected failure (500).
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        let message = err.to_string();
        match err {
            ServiceError::Unavailable(source) => AppError::ServiceUnavailable(source.to_string()),
            ServiceError::Degraded => AppError::ServiceUnavailable("degraded mode".into()),
            ServiceError::IdentityUnavailable => AppError::Unauthorized(message),
            ServiceError::NotHost(_) => AppError::Forbidden(message),
            ServiceError::RoomNotFound(_) => AppError::NotFound(message),
            ServiceError::RoomNotJoinable(_)
            | ServiceError::ConcurrentWriteConflict(_)
            | ServiceError::InvalidState(_) => AppError::Conflict(message),
            ServiceError::InvalidInput(_) => AppError::BadRequest(message),
            ServiceError::InvariantViolation(_) => AppError::Internal(message),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}
