use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use shieldwall_core::error::{self, ApiError};

/// Internal error type that converts to structured API responses
#[derive(Debug)]
pub enum AppError {
    /// Asset resolution or hashing failed (500)
    Assets(shieldwall_core::Error),
    /// Internal error (500)
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let request_id = uuid::Uuid::now_v7().to_string();

        let (status, api_error) = match self {
            AppError::Assets(err) => {
                tracing::error!(%request_id, error = %err, "Asset pipeline error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiError {
                        error: error::codes::ASSET_PIPELINE_FAILED.to_string(),
                        message: "Page assets could not be resolved".to_string(),
                        request_id,
                        docs_hint: Some(
                            "Check SHIELDWALL_LIBRARIES and SHIELDWALL_PAGE_LIBRARIES.".to_string(),
                        ),
                    },
                )
            }
            AppError::Internal(msg) => {
                tracing::error!(%request_id, "Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiError {
                        error: error::codes::INTERNAL_ERROR.to_string(),
                        message: "An internal error occurred".to_string(),
                        request_id,
                        docs_hint: None,
                    },
                )
            }
        };

        (status, Json(api_error)).into_response()
    }
}

impl From<shieldwall_core::Error> for AppError {
    fn from(err: shieldwall_core::Error) -> Self {
        AppError::Assets(err)
    }
}
