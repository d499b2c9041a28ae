use axum::{
    extract::multipart::{MultipartError, MultipartRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::classifier::ClassifierError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("No file uploaded")]
    MissingFile,
    #[error("No selected file")]
    EmptyFilename,
    #[error("Invalid upload: {0}")]
    Rejected(#[from] MultipartRejection),
    #[error("Invalid upload: {0}")]
    Multipart(#[from] MultipartError),
    #[error("Uploaded file is not a readable image: {0}")]
    InvalidImage(#[from] image::ImageError),
    #[error("Failed to store upload: {0}")]
    Storage(#[from] std::io::Error),
    #[error("Classification failed: {0}")]
    Classification(#[from] ClassifierError),
    #[error("Cannot build image URL: {0}")]
    Url(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingFile | ApiError::EmptyFilename | ApiError::InvalidImage(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Rejected(rejection) => rejection.status(),
            ApiError::Multipart(err) => err.status(),
            ApiError::Storage(_) | ApiError::Classification(_) | ApiError::Url(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "predict request failed");
        }
        (status, Json(json!({ "success": false, "error": self.to_string() }))).into_response()
    }
}
