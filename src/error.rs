use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use validator::ValidationErrors;

use crate::{
    dao::{models::SubscriptionStatus, storage::StorageError},
    services::subscription::SubscriptionError,
};

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Storage backend is unavailable.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// Application is running in degraded mode without storage.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Operation cannot be performed in the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// The shop's subscription no longer allows requests.
    #[error("subscription is {}", .0.as_str())]
    SubscriptionInactive(SubscriptionStatus),
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::Unavailable(err)
    }
}

impl From<SubscriptionError> for ServiceError {
    fn from(err: SubscriptionError) -> Self {
        match err {
            SubscriptionError::ShopNotFound(_) | SubscriptionError::PlanNotFound(_) => {
                ServiceError::NotFound(err.to_string())
            }
            SubscriptionError::AlreadyProvisioned(_) => ServiceError::InvalidState(err.to_string()),
            SubscriptionError::InvalidInput(message) => ServiceError::InvalidInput(message),
            SubscriptionError::Persistence(source) => ServiceError::Unavailable(source),
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
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Conflict with current state.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Request blocked by an expired subscription.
    #[error("subscription inactive: {}", .0.as_str())]
    SubscriptionInactive(SubscriptionStatus),
    /// Service unavailable or degraded.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Machine-readable code carried in the response body.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "bad_request",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::SubscriptionInactive(_) => SUBSCRIPTION_INACTIVE,
            AppError::ServiceUnavailable(_) => "service_unavailable",
            AppError::Internal(_) => "internal_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::SubscriptionInactive(_) => StatusCode::PAYMENT_REQUIRED,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Code of the 402 response sent when a shop's subscription has lapsed.
pub const SUBSCRIPTION_INACTIVE: &str = "subscription_inactive";

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Unavailable(source) => AppError::ServiceUnavailable(source.to_string()),
            ServiceError::Degraded => AppError::ServiceUnavailable("degraded mode".into()),
            ServiceError::InvalidInput(message) => AppError::BadRequest(message),
            ServiceError::InvalidState(message) => AppError::Conflict(message),
            ServiceError::NotFound(message) => AppError::NotFound(message),
            ServiceError::SubscriptionInactive(status) => AppError::SubscriptionInactive(status),
        }
    }
}

impl From<SubscriptionError> for AppError {
    fn from(err: SubscriptionError) -> Self {
        ServiceError::from(err).into()
    }
}

/// JSON body of every error response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    /// Computed subscription status, set on `subscription_inactive` only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<SubscriptionStatus>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let subscription_status = match &self {
            AppError::SubscriptionInactive(computed) => Some(*computed),
            _ => None,
        };

        let payload = Json(ErrorBody {
            code: self.code().to_string(),
            message: self.to_string(),
            status: subscription_status,
        });

        (status, payload).into_response()
    }
}
