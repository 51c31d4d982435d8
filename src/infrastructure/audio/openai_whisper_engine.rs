use async_trait::async_trait;
use reqwest::multipart;
use serde::Deserialize;

use crate::application::ports::{TranscriptionEngine, TranscriptionError};
use crate::domain::{AudioFormat, EngineTranscription, Segment, language};

pub struct OpenAiWhisperEngine {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiWhisperEngine {
    pub fn new(api_key: String, base_url: Option<String>, model: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string())
                .trim_end_matches('/')
                .to_string(),
            model: model.unwrap_or_else(|| "whisper-1".to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct VerboseTranscription {
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub segments: Vec<VerboseSegment>,
}

#[derive(Debug, Deserialize)]
pub struct VerboseSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

impl VerboseTranscription {
    /// The API reports the language by name and gives no detection
    /// confidence, so a recognised language is reported with probability 1.
    pub fn into_engine_transcription(self) -> EngineTranscription {
        let (language_code, language_probability) = match self.language.as_deref() {
            Some(reported) => match language::code_for(reported) {
                Some(code) => (code.to_string(), 1.0),
                None => (reported.trim().to_ascii_lowercase(), 0.0),
            },
            None => (String::new(), 0.0),
        };

        let segments = if self.segments.is_empty() && !self.text.trim().is_empty() {
            vec![Segment::new(
                self.text.trim(),
                0.0,
                self.duration.unwrap_or_default(),
            )]
        } else {
            self.segments
                .into_iter()
                .map(|s| Segment::new(s.text, s.start, s.end))
                .collect()
        };

        EngineTranscription {
            segments,
            language_code,
            language_probability,
        }
    }
}

#[async_trait]
impl TranscriptionEngine for OpenAiWhisperEngine {
    async fn transcribe(
        &self,
        audio_data: &[u8],
        format: AudioFormat,
    ) -> Result<EngineTranscription, TranscriptionError> {
        let url = format!("{}/audio/transcriptions", self.base_url);

        let file_part = multipart::Part::bytes(audio_data.to_vec())
            .file_name(format!("audio.{}", format.extension()))
            .mime_str(format.as_mime())
            .map_err(|e| TranscriptionError::ApiRequestFailed(format!("mime: {}", e)))?;

        let form = multipart::Form::new()
            .text("model", self.model.clone())
            .text("response_format", "verbose_json")
            .text("timestamp_granularities[]", "segment")
            .part("file", file_part);

        tracing::debug!(model = %self.model, format = ?format, "Sending audio to OpenAI Whisper API");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| TranscriptionError::ApiRequestFailed(format!("request: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(TranscriptionError::ApiRequestFailed(format!(
                "status {}: {}",
                status, body
            )));
        }

        let verbose: VerboseTranscription = response
            .json()
            .await
            .map_err(|e| TranscriptionError::ApiRequestFailed(format!("parse response: {}", e)))?;

        let transcription = verbose.into_engine_transcription();

        tracing::info!(
            segments = transcription.segments.len(),
            language = %transcription.language_code,
            "OpenAI Whisper transcription completed"
        );

        Ok(transcription)
    }
}
