use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use citybite_core::CoreError;
use citybite_order::{OrderError, ServiceError, WalletError};
use citybite_rider::LedgerError;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    AuthenticationError(String),
    #[error("{0}")]
    AuthorizationError(String),
    #[error("{0}")]
    ValidationError(String),
    #[error("{0}")]
    NotFoundError(String),
    #[error("{0}")]
    ConflictError(String),
    #[error("{0}")]
    UnavailableError(String),
    #[error("{0}")]
    InternalServerError(String),
    #[error(transparent)]
    Anyhow(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::AuthenticationError(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::AuthorizationError(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::ConflictError(msg) => (StatusCode::CONFLICT, msg),
            AppError::UnavailableError(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Anyhow(err)
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        let msg = err.to_string();
        match err {
            ServiceError::Order(e) => match e {
                OrderError::NotFound(_) => AppError::NotFoundError(msg),
                OrderError::AuthorizationDenied { .. } => AppError::AuthorizationError(msg),
                OrderError::Validation(_) => AppError::ValidationError(msg),
                OrderError::InvalidTransition { .. } | OrderError::AlreadyAssigned { .. } => {
                    AppError::ConflictError(msg)
                }
            },
            ServiceError::Wallet(WalletError::InvalidAmount(_)) | ServiceError::Ledger(LedgerError::InvalidAmount(_)) => {
                AppError::ValidationError(msg)
            }
            ServiceError::Wallet(WalletError::InsufficientBalance { .. })
            | ServiceError::Ledger(LedgerError::InsufficientBalance { .. }) => AppError::ConflictError(msg),
            ServiceError::Pricing(_) => AppError::ValidationError(msg),
            ServiceError::Storage(CoreError::VersionConflict { .. }) | ServiceError::Conflict(_) => {
                AppError::ConflictError(msg)
            }
            ServiceError::Storage(CoreError::ValidationError(_)) => AppError::ValidationError(msg),
            ServiceError::Storage(_) => AppError::InternalServerError(msg),
            ServiceError::NotFound(_) => AppError::NotFoundError(msg),
            ServiceError::MailboxClosed(_) => AppError::UnavailableError(msg),
        }
    }
}
