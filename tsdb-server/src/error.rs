use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tsdb_meta::MetaError;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    fn code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "not found",
            AppError::BadRequest(_) => "invalid",
            AppError::Conflict(_) => "conflict",
            AppError::Internal(_) => "internal error",
        }
    }
}

impl From<MetaError> for AppError {
    fn from(err: MetaError) -> Self {
        match err {
            MetaError::NotFound(m) => AppError::NotFound(format!("{m} not found")),
            MetaError::Conflict(m) => AppError::Conflict(m),
            MetaError::InvalidId(m) => AppError::BadRequest(format!("invalid ID {m}")),
            MetaError::InvalidStore(m) => AppError::BadRequest(format!("invalid metadata store: {m}")),
            MetaError::Serialization(e) => AppError::BadRequest(e.to_string()),
            other => AppError::Internal(other.into()),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(err.into())
    }
}

impl From<r2d2::Error> for AppError {
    fn from(err: r2d2::Error) -> Self {
        AppError::Internal(err.into())
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Internal(anyhow::anyhow!(err))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:#}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let message = match &self {
            AppError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };
        (status, Json(json!({ "code": self.code(), "message": message }))).into_response()
    }
}
