use axum::Json;
use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::application::services::IntakeError;
use crate::presentation::state::AppState;

use super::error::ErrorResponse;

#[derive(Debug, Serialize)]
pub struct AcceptedResponse {
    pub files: Vec<String>,
    pub message: String,
}

/// `POST /api/v1/audio`: stores the first file field of a multipart body and
/// schedules it for transcription.
#[tracing::instrument(skip(state, multipart))]
pub async fn upload_handler(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let field = loop {
        match multipart.next_field().await {
            Ok(Some(f)) if f.file_name().is_some() => break f,
            Ok(Some(f)) => {
                tracing::debug!(field = ?f.name(), "Skipping non-file multipart field");
            }
            Ok(None) => {
                return IntakeError::MissingAttachment("no file uploaded".to_string())
                    .into_response();
            }
            Err(e) => return multipart_error(e),
        }
    };

    let filename = field.file_name().unwrap_or("audio").to_string();
    let content_type = field.content_type().map(str::to_string);

    tracing::debug!(filename = %filename, content_type = ?content_type, "Processing audio upload");

    let data = match field.bytes().await {
        Ok(d) => d,
        Err(e) => return multipart_error(e),
    };

    tracing::debug!(bytes = data.len(), "Audio data received");

    let attachment = match state
        .intake_service
        .validate(&filename, content_type.as_deref(), data)
    {
        Ok(a) => a,
        Err(e) => return e.into_response(),
    };

    match state.intake_service.accept(attachment).await {
        Ok(path) => (
            StatusCode::ACCEPTED,
            Json(AcceptedResponse {
                files: vec![path.to_string()],
                message: "Audio accepted. Sent for transcription.".to_string(),
            }),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

fn multipart_error(e: MultipartError) -> Response {
    let status = e.status();
    tracing::warn!(error = %e, status = status.as_u16(), "Failed to read multipart body");
    (
        status,
        Json(ErrorResponse {
            error: format!("Failed to read multipart: {}", e.body_text()),
        }),
    )
        .into_response()
}
