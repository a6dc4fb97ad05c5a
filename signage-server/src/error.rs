use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Failure kinds surfaced by the scheduling services.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Media {media_id} is already assigned to device {device_id}")]
    DuplicateAssignment { device_id: String, media_id: i32 },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Storage error: {0}")]
    Storage(#[from] diesel::result::Error),

    #[error("Storage unavailable: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    #[error("File I/O error: {0}")]
    FileIo(#[from] std::io::Error),
}

impl ServiceError {
    pub fn validation(msg: impl Into<String>) -> Self {
        ServiceError::Validation(msg.into())
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        ServiceError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// HTTP wrapper that turns a [`ServiceError`] into a JSON error body.
#[derive(Debug)]
pub struct ApiError(pub ServiceError);

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self.0 {
            ServiceError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
            ServiceError::DuplicateAssignment { .. } => (
                StatusCode::CONFLICT,
                "DUPLICATE_ASSIGNMENT",
                self.0.to_string(),
            ),
            ServiceError::NotFound { .. } => {
                (StatusCode::NOT_FOUND, "NOT_FOUND", self.0.to_string())
            }
            ServiceError::Storage(_) | ServiceError::Pool(_) => {
                tracing::error!(error = %self.0, "Storage failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORAGE_ERROR",
                    "Storage is temporarily unavailable".to_string(),
                )
            }
            ServiceError::FileIo(_) => {
                tracing::error!(error = %self.0, "File store failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "FILE_IO_ERROR",
                    "Failed to access media storage".to_string(),
                )
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
