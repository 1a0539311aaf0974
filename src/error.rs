use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::error;

use crate::models::MessageBody;
use crate::registry::RegistryError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    #[error("Invalid value for field {0}")]
    InvalidField(&'static str),

    #[error("Invalid email or password")]
    Unauthorized,

    #[error("Models are not loaded on the server.")]
    ServiceUnavailable,

    /// The detail is logged, never sent to the client.
    #[error("Internal server error")]
    Internal(String),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<RegistryError> for AppError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::Unavailable { .. } => AppError::ServiceUnavailable,
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::MissingFields(_) | AppError::InvalidField(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::ServiceUnavailable | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        if let AppError::Internal(detail) = &self {
            error!("Request failed: {detail}");
        }

        (status, Json(MessageBody::error(self.to_string()))).into_response()
    }
}
