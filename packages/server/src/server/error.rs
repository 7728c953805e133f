//! HTTP error mapping shared by both services.
//!
//! Body shape: `{"error": "...", "details": [...]}`. `details` is only
//! present for validation failures.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

use crate::common::{AuthError, StoreError};
use crate::domains::drones::DispatchError;
use crate::domains::orders::OrderError;
use crate::kernel::ServiceClientError;

#[derive(Debug)]
pub enum ApiError {
    Validation(Vec<String>),
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    BadGateway(String),
    Unavailable(String),
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            ApiError::Validation(details) => json!({
                "error": "validation failed",
                "details": details,
            }),
            ApiError::BadRequest(message)
            | ApiError::Unauthorized(message)
            | ApiError::Forbidden(message)
            | ApiError::NotFound(message)
            | ApiError::Conflict(message)
            | ApiError::BadGateway(message)
            | ApiError::Unavailable(message)
            | ApiError::Internal(message) => {
                if status.is_server_error() {
                    error!(status = status.as_u16(), error = %message, "Request failed");
                }
                json!({ "error": message })
            }
        };
        (status, Json(body)).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::AuthenticationRequired | AuthError::InvalidToken => {
                ApiError::Unauthorized(err.to_string())
            }
            AuthError::PermissionDenied(_) => ApiError::Forbidden(err.to_string()),
        }
    }
}

/// Collaborator failures: gone → 503, misbehaving → 502.
impl From<ServiceClientError> for ApiError {
    fn from(err: ServiceClientError) -> Self {
        match err {
            ServiceClientError::Unavailable { .. } => ApiError::Unavailable(err.to_string()),
            ServiceClientError::Upstream { .. }
            | ServiceClientError::Rejected { .. }
            | ServiceClientError::Decode { .. } => ApiError::BadGateway(err.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            StoreError::Conflict { .. } => ApiError::Conflict(err.to_string()),
            StoreError::Corrupt { .. } | StoreError::Database(_) => {
                ApiError::Internal(err.to_string())
            }
        }
    }
}

impl From<OrderError> for ApiError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::Validation(reasons) => ApiError::Validation(reasons),
            OrderError::NotFound(_) => ApiError::NotFound(err.to_string()),
            OrderError::Transition(_) | OrderError::Conflict(_) => {
                ApiError::Conflict(err.to_string())
            }
            OrderError::Auth(auth) => auth.into(),
            // The catalog said no: the order was cancelled, the request conflicts.
            OrderError::Reservation { ref source, .. } => match source {
                ServiceClientError::Rejected { .. } => ApiError::Conflict(err.to_string()),
                ServiceClientError::Unavailable { .. } => ApiError::Unavailable(err.to_string()),
                _ => ApiError::BadGateway(err.to_string()),
            },
            OrderError::Collaborator(source) => source.into(),
            OrderError::Store(source) => source.into(),
            OrderError::Bus(_) => ApiError::Unavailable(err.to_string()),
        }
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::DroneNotFound(_)
            | DispatchError::NoDroneForOrder(_)
            | DispatchError::OrderNotFound(_) => ApiError::NotFound(err.to_string()),
            DispatchError::NoDroneAvailable
            | DispatchError::AlreadyAssigned(_)
            | DispatchError::OrderNotDispatchable { .. }
            | DispatchError::Transition(_)
            | DispatchError::NotArrived
            | DispatchError::Conflict(_) => ApiError::Conflict(err.to_string()),
            DispatchError::InvalidPin | DispatchError::MalformedPin => {
                ApiError::BadRequest(err.to_string())
            }
            DispatchError::Auth(auth) => auth.into(),
            DispatchError::Collaborator(source) => source.into(),
            DispatchError::Store(source) => source.into(),
            DispatchError::Bus(_) => ApiError::Unavailable(err.to_string()),
            DispatchError::ServiceToken(_) => ApiError::Internal(err.to_string()),
        }
    }
}
