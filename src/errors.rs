use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Failures raised inside a storage backend. Converted to [`AppError`] before
/// they leave the lifecycle layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("booking table is not initialized")]
    NotInitialized,

    #[error("slots already booked: {}", .0.join(", "))]
    SlotConflict(Vec<String>),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("remote store unreachable: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("slots no longer available: {}", .0.join(", "))]
    SlotConflict(Vec<String>),

    #[error("storage error: {0}")]
    Persistence(String),

    #[error("booking storage is not initialized")]
    NotInitialized,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized")]
    Unauthorized,
}

impl AppError {
    /// The next step a client can offer the user for this failure.
    pub fn action(&self) -> Option<&'static str> {
        match self {
            AppError::SlotConflict(_) => Some("reselect_slots"),
            AppError::Persistence(_) => Some("retry"),
            AppError::NotInitialized => Some("switch_backend"),
            _ => None,
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotInitialized => AppError::NotInitialized,
            StoreError::SlotConflict(ids) => AppError::SlotConflict(ids),
            other => AppError::Persistence(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::SlotConflict(_) => StatusCode::CONFLICT,
            AppError::Persistence(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::NotInitialized => StatusCode::SERVICE_UNAVAILABLE,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
        };

        let body = serde_json::json!({ "error": self.to_string(), "action": self.action() });
        (status, axum::Json(body)).into_response()
    }
}
