use std::sync::Arc;

use serde::Deserialize;

use crate::application::ports::{TranscriptionEngine, TranscriptionError};

use super::candle_whisper_engine::{CandleWhisperEngine, WhisperOptions};
use super::openai_whisper_engine::OpenAiWhisperEngine;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptionProvider {
    Local,
    #[serde(rename = "openai")]
    OpenAi,
}

pub struct TranscriptionEngineFactory;

impl TranscriptionEngineFactory {
    /// Builds the engine. Loading a local model is slow and blocking, so
    /// call this from a blocking context. `options` only apply to the local
    /// provider; `remote_model` defaults to `whisper-1`.
    pub fn create(
        provider: TranscriptionProvider,
        options: &WhisperOptions,
        api_key: Option<String>,
        base_url: Option<String>,
        remote_model: Option<String>,
    ) -> Result<Arc<dyn TranscriptionEngine>, TranscriptionError> {
        match provider {
            TranscriptionProvider::Local => {
                let engine = CandleWhisperEngine::new(options)?;
                Ok(Arc::new(engine))
            }
            TranscriptionProvider::OpenAi => {
                let key = api_key.filter(|k| !k.is_empty()).ok_or_else(|| {
                    TranscriptionError::ModelLoadFailed(
                        "API key required for OpenAI Whisper".to_string(),
                    )
                })?;
                let engine = OpenAiWhisperEngine::new(key, base_url, remote_model);
                Ok(Arc::new(engine))
            }
        }
    }
}
