use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;

use crate::inference::InferenceError;
use crate::report::ReportError;
use crate::storage::StorageError;

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Upload rejected: {0}")]
    Storage(#[from] StorageError),
    #[error("Prediction failed: {0}")]
    Inference(#[from] InferenceError),
    #[error("Report generation failed: {0}")]
    Report(#[from] ReportError),
    #[error("Malformed form data: {0}")]
    Multipart(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Blocking task failed: {0}")]
    Blocking(#[from] actix_web::error::BlockingError),
}

// MultipartError can carry a non-Send actix error, so only its message is kept.
impl From<actix_multipart::MultipartError> for ApiError {
    fn from(err: actix_multipart::MultipartError) -> Self {
        ApiError::Multipart(err.to_string())
    }
}

impl ApiError {
    fn public_message(&self) -> &'static str {
        match self {
            ApiError::Storage(StorageError::FileTooLarge { .. }) => "Uploaded file is too large",
            ApiError::Storage(StorageError::InvalidFilename(_)) => "Uploaded file name is not usable",
            ApiError::Inference(InferenceError::Image(_)) => "Uploaded file is not a readable image",
            ApiError::Multipart(_) => "Malformed upload form",
            ApiError::Inference(_) => "Model inference failed",
            ApiError::Report(_) => "Failed to generate report",
            _ => "Internal server error",
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Storage(StorageError::FileTooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Storage(StorageError::InvalidFilename(_))
            | ApiError::Inference(InferenceError::Image(_))
            | ApiError::Multipart(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            log::error!("{}", self);
        } else {
            log::warn!("{}", self);
        }
        HttpResponse::build(status).json(ErrorResponse {
            error: self.public_message().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_input_maps_to_client_errors() {
        let too_large = ApiError::from(StorageError::FileTooLarge { size: 2, limit: 1 });
        assert_eq!(too_large.status_code(), StatusCode::PAYLOAD_TOO_LARGE);

        let bad_name = ApiError::from(StorageError::InvalidFilename("..".into()));
        assert_eq!(bad_name.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn model_failures_are_server_errors() {
        let err = ApiError::from(InferenceError::Model("boom".into()));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.public_message(), "Model inference failed");
    }
}
