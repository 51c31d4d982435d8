use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::application::services::IntakeError;

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl IntakeError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            IntakeError::MissingAttachment(_) => StatusCode::BAD_REQUEST,
            IntakeError::UnsupportedFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            IntakeError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            IntakeError::AttachmentDownloadFailure(_) => StatusCode::BAD_GATEWAY,
            IntakeError::StorageWriteFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
            IntakeError::QueueUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for IntakeError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "Audio intake failed");
        } else {
            tracing::warn!(error = %self, status = status.as_u16(), "Audio intake rejected");
        }
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}
