use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::application::services::IntakeError;
use crate::domain::AudioFormat;
use crate::presentation::state::AppState;

const AUDIO_MEDIA_TYPE: &str = "audio";

/// Body of a Missive webhook call.
#[derive(Debug, Deserialize)]
pub struct MissiveWebhook {
    pub conversation: Conversation,
    #[serde(default)]
    pub latest_message: Option<LatestMessage>,
}

#[derive(Debug, Deserialize)]
pub struct Conversation {
    pub id: String,
    #[serde(default)]
    pub messages_count: u64,
    #[serde(default)]
    pub attachments_count: u64,
}

#[derive(Debug, Deserialize)]
pub struct LatestMessage {
    #[serde(rename = "type", default)]
    pub message_type: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Deserialize)]
pub struct Attachment {
    pub id: String,
    pub filename: String,
    #[serde(default)]
    pub extension: String,
    pub url: String,
    pub media_type: String,
    #[serde(default)]
    pub sub_type: String,
    #[serde(default)]
    pub size: u64,
}

impl Attachment {
    pub fn is_audio(&self) -> bool {
        self.media_type.eq_ignore_ascii_case(AUDIO_MEDIA_TYPE)
    }

    /// `media_type/sub_type` when that names a known audio type, otherwise
    /// `None` so the format is taken from the file name.
    pub fn content_type(&self) -> Option<String> {
        let mime = format!("{}/{}", self.media_type, self.sub_type);
        AudioFormat::from_mime(&mime).map(|_| mime)
    }

    /// The file name with the attachment's extension applied when the name
    /// itself carries none.
    pub fn effective_filename(&self) -> String {
        let extension = self.extension.trim().trim_start_matches('.');
        if AudioFormat::from_filename(&self.filename).is_some() || extension.is_empty() {
            self.filename.clone()
        } else {
            format!("{}.{}", self.filename, extension)
        }
    }
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub status: String,
    pub message: String,
    pub files: Vec<String>,
}

/// `POST /webhook`: downloads every audio attachment of the latest message
/// and schedules each one for transcription.
///
/// All attachments are downloaded and validated before any is stored, so a
/// download or validation failure stores nothing. A queue that fills part-way
/// through leaves the attachments accepted before it scheduled.
#[tracing::instrument(
    skip(state, payload),
    fields(conversation_id = %payload.conversation.id)
)]
pub async fn webhook_handler(
    State(state): State<AppState>,
    Json(payload): Json<MissiveWebhook>,
) -> Response {
    let Some(message) = payload.latest_message else {
        return IntakeError::MissingAttachment("webhook has no latest message".to_string())
            .into_response();
    };

    if message.attachments.is_empty() {
        return IntakeError::MissingAttachment(
            "no attachments found on latest message".to_string(),
        )
        .into_response();
    }

    let audio: Vec<&Attachment> = message.attachments.iter().filter(|a| a.is_audio()).collect();
    if audio.is_empty() {
        return IntakeError::MissingAttachment("no audio attachments found".to_string())
            .into_response();
    }

    tracing::info!(
        count = audio.len(),
        message_type = %message.message_type,
        "Audio attachments found, downloading"
    );

    let mut downloaded = Vec::with_capacity(audio.len());
    for attachment in &audio {
        tracing::debug!(
            attachment_id = %attachment.id,
            filename = %attachment.filename,
            size = attachment.size,
            "Fetching attachment"
        );
        let content_type = attachment.content_type();
        match state
            .intake_service
            .fetch_remote(
                &attachment.effective_filename(),
                content_type.as_deref(),
                &attachment.url,
            )
            .await
        {
            Ok(a) => downloaded.push(a),
            Err(e) => return e.into_response(),
        }
    }

    let mut files = Vec::with_capacity(downloaded.len());
    for attachment in downloaded {
        match state.intake_service.accept(attachment).await {
            Ok(path) => files.push(path.to_string()),
            Err(e) => return e.into_response(),
        }
    }

    (
        StatusCode::ACCEPTED,
        Json(WebhookResponse {
            status: "success".to_string(),
            message: format!(
                "Found {} audio attachments. Sent for transcription.",
                audio.len()
            ),
            files,
        }),
    )
        .into_response()
}
