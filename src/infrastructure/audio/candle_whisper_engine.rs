use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::whisper::{self as m, Config};
use hf_hub::api::sync::Api;
use hf_hub::{Repo, RepoType};
use serde::Deserialize;
use tokenizers::Tokenizer;

use crate::application::ports::{TranscriptionEngine, TranscriptionError};
use crate::domain::{AudioFormat, EngineTranscription, Segment, language};

use super::audio_decoder::{TARGET_SAMPLE_RATE, decode_audio_to_pcm};
use super::decoding::{BeamSearch, TokenFilter, mel_filters, segments_from_tokens, softmax};

/// Beam search width used when configuration does not override it.
pub const DEFAULT_BEAM_WIDTH: usize = 5;

/// Model variant used when configuration does not override it.
pub const DEFAULT_MODEL_SIZE: &str = "medium";

/// Numeric precision of the loaded weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    F32,
    F16,
    Bf16,
}

impl Precision {
    pub fn as_dtype(&self) -> DType {
        match self {
            Self::F32 => DType::F32,
            Self::F16 => DType::F16,
            Self::Bf16 => DType::BF16,
        }
    }
}

/// Fixed engine configuration, chosen once at startup.
#[derive(Debug, Clone)]
pub struct WhisperOptions {
    pub model_size: String,
    pub precision: Precision,
    pub beam_width: usize,
}

impl Default for WhisperOptions {
    fn default() -> Self {
        Self {
            model_size: DEFAULT_MODEL_SIZE.to_string(),
            precision: Precision::F16,
            beam_width: DEFAULT_BEAM_WIDTH,
        }
    }
}

/// Local Whisper inference on the CPU through candle.
///
/// The model is loaded once and shared. It sits behind a mutex because the
/// decoder mutates its attention cache during a forward pass, so concurrent
/// jobs run inference one at a time.
pub struct CandleWhisperEngine {
    inner: Arc<WhisperModel>,
}

struct WhisperModel {
    model: Mutex<m::model::Whisper>,
    tokenizer: Tokenizer,
    config: Config,
    device: Device,
    dtype: DType,
    mel_filters: Vec<f32>,
    sot_token: u32,
    transcribe_token: u32,
    filter: TokenFilter,
    language_tokens: Vec<(&'static str, u32)>,
    beam_search: BeamSearch,
}

struct MelWindow {
    offset_secs: f64,
    duration_secs: f64,
    mel: Tensor,
}

impl CandleWhisperEngine {
    /// Maps a model size such as `medium` to its hub repository.
    /// Values that already name a repository are used unchanged.
    pub fn model_repo(model_size: &str) -> String {
        if model_size.contains('/') {
            model_size.to_string()
        } else {
            format!("openai/whisper-{}", model_size)
        }
    }

    pub fn select_dtype(device: &Device, precision: Precision) -> DType {
        match (device, precision) {
            // bf16 kernels are missing on Metal.
            (Device::Metal(_), Precision::Bf16) => DType::F16,
            _ => precision.as_dtype(),
        }
    }

    pub fn new(options: &WhisperOptions) -> Result<Self, TranscriptionError> {
        let device = Device::Cpu;
        let dtype = Self::select_dtype(&device, options.precision);
        let model_id = Self::model_repo(&options.model_size);

        tracing::info!(
            device = ?device,
            dtype = ?dtype,
            model = %model_id,
            beam_width = options.beam_width,
            "Initializing Candle Whisper transcription engine"
        );

        let api = Api::new().map_err(|e| TranscriptionError::ModelLoadFailed(e.to_string()))?;
        let repo = api.repo(Repo::new(model_id.clone(), RepoType::Model));

        let config_path = repo
            .get("config.json")
            .map_err(|e| TranscriptionError::ModelLoadFailed(format!("config.json: {}", e)))?;
        let tokenizer_path = repo
            .get("tokenizer.json")
            .map_err(|e| TranscriptionError::ModelLoadFailed(format!("tokenizer.json: {}", e)))?;
        let weights_path = repo.get("model.safetensors").map_err(|e| {
            TranscriptionError::ModelLoadFailed(format!("model.safetensors: {}", e))
        })?;

        let config_contents = std::fs::read_to_string(&config_path)
            .map_err(|e| TranscriptionError::ModelLoadFailed(format!("read config: {}", e)))?;
        let config: Config = serde_json::from_str(&config_contents)
            .map_err(|e| TranscriptionError::ModelLoadFailed(format!("parse config: {}", e)))?;

        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| TranscriptionError::ModelLoadFailed(format!("tokenizer: {}", e)))?;

        let mel_filters = mel_filters(m::SAMPLE_RATE as u32, m::N_FFT, config.num_mel_bins);

        // SAFETY: safetensors files are memory-mapped read-only
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_path], dtype, &device)
                .map_err(|e| TranscriptionError::ModelLoadFailed(format!("weights: {}", e)))?
        };

        let model = m::model::Whisper::load(&vb, config.clone())
            .map_err(|e| TranscriptionError::ModelLoadFailed(format!("model: {}", e)))?;

        let sot_token = token_id(&tokenizer, m::SOT_TOKEN)?;
        let transcribe_token = token_id(&tokenizer, m::TRANSCRIBE_TOKEN)?;
        let eot_token = token_id(&tokenizer, m::EOT_TOKEN)?;
        let no_timestamps_token = token_id(&tokenizer, m::NO_TIMESTAMPS_TOKEN)?;
        let timestamp_begin = no_timestamps_token + 1;

        // Everything between end-of-text and the first timestamp is a control token.
        let mut suppressed = config.suppress_tokens.clone();
        suppressed.extend(eot_token + 1..timestamp_begin);

        let language_tokens: Vec<(&'static str, u32)> = language::LANGUAGES
            .iter()
            .filter_map(|(code, _)| {
                tokenizer
                    .token_to_id(&format!("<|{}|>", code))
                    .map(|id| (*code, id))
            })
            .collect();

        let beam_search = BeamSearch::new(options.beam_width, config.max_target_positions / 2);

        tracing::info!(
            multilingual = !language_tokens.is_empty(),
            vocab_size = config.vocab_size,
            beam_width = beam_search.beam_width(),
            "Candle Whisper engine loaded successfully"
        );

        Ok(Self {
            inner: Arc::new(WhisperModel {
                model: Mutex::new(model),
                tokenizer,
                config,
                device,
                dtype,
                mel_filters,
                sot_token,
                transcribe_token,
                filter: TokenFilter {
                    eot: eot_token,
                    timestamp_begin,
                    suppressed,
                },
                language_tokens,
                beam_search,
            }),
        })
    }
}

#[async_trait]
impl TranscriptionEngine for CandleWhisperEngine {
    async fn transcribe(
        &self,
        audio_data: &[u8],
        format: AudioFormat,
    ) -> Result<EngineTranscription, TranscriptionError> {
        let inner = Arc::clone(&self.inner);
        let data = audio_data.to_vec();

        tokio::task::spawn_blocking(move || inner.transcribe_blocking(&data, format))
            .await
            .map_err(|e| TranscriptionError::TranscriptionFailed(format!("inference task: {}", e)))?
    }
}

impl WhisperModel {
    fn transcribe_blocking(
        &self,
        data: &[u8],
        format: AudioFormat,
    ) -> Result<EngineTranscription, TranscriptionError> {
        let audio = decode_audio_to_pcm(data, Some(format))?;
        let windows = self.mel_windows(&audio.samples)?;

        let mut model = self.model.lock().map_err(|_| {
            TranscriptionError::TranscriptionFailed("whisper model lock poisoned".to_string())
        })?;

        let mut language_code = "en";
        let mut language_probability = 1.0;
        let mut segments: Vec<Segment> = Vec::new();

        for (index, window) in windows.iter().enumerate() {
            let features = model.encoder.forward(&window.mel, true).map_err(inference)?;

            if index == 0 {
                if let Some((code, probability)) = self.detect_language(&mut model, &features)? {
                    language_code = code;
                    language_probability = probability;
                }
                tracing::debug!(language = language_code, probability = language_probability, "Language detected");
            }

            let mut prompt = vec![self.sot_token];
            if let Some((_, id)) = self.language_tokens.iter().find(|(c, _)| *c == language_code) {
                prompt.push(*id);
            }
            prompt.push(self.transcribe_token);

            let mut flush = true;
            let generated = self.beam_search.run(&prompt, &self.filter, |tokens| {
                let logits = self.next_token_logits(&mut model, &features, tokens, flush);
                flush = false;
                logits
            })?;

            let window_segments = segments_from_tokens(
                &generated,
                &self.filter,
                window.offset_secs,
                window.duration_secs,
                |ids| {
                    self.tokenizer
                        .decode(ids, true)
                        .map_err(|e| TranscriptionError::TranscriptionFailed(format!("detokenize: {}", e)))
                },
            )?;

            tracing::debug!(
                window = index,
                tokens = generated.len(),
                segments = window_segments.len(),
                "Decoded audio window"
            );
            segments.extend(window_segments);
        }

        model.reset_kv_cache();

        tracing::info!(
            windows = windows.len(),
            segments = segments.len(),
            duration_secs = audio.duration_secs(),
            language = language_code,
            "Audio transcription completed"
        );

        Ok(EngineTranscription {
            segments,
            language_code: language_code.to_string(),
            language_probability,
        })
    }

    /// Splits PCM into 30 second log-mel windows.
    fn mel_windows(&self, pcm: &[f32]) -> Result<Vec<MelWindow>, TranscriptionError> {
        let n_mel = self.config.num_mel_bins;
        let mut windows = Vec::new();

        for (i, chunk) in pcm.chunks(m::N_SAMPLES).enumerate() {
            let mut samples = chunk.to_vec();
            samples.resize(m::N_SAMPLES, 0.0);

            let mel_data = m::audio::pcm_to_mel(&self.config, &samples, &self.mel_filters);
            let n_frames = mel_data.len() / n_mel;

            let mel = Tensor::from_vec(mel_data, (1, n_mel, n_frames), &self.device)
                .and_then(|t| t.narrow(2, 0, n_frames.min(m::N_FRAMES)))
                .and_then(|t| t.to_dtype(self.dtype))
                .map_err(|e| TranscriptionError::TranscriptionFailed(format!("mel tensor: {}", e)))?;

            windows.push(MelWindow {
                offset_secs: (i * m::N_SAMPLES) as f64 / f64::from(TARGET_SAMPLE_RATE),
                duration_secs: chunk.len() as f64 / f64::from(TARGET_SAMPLE_RATE),
                mel,
            });
        }

        Ok(windows)
    }

    /// Returns the most likely language and its probability, or `None` for
    /// English-only models that have no language tokens.
    fn detect_language(
        &self,
        model: &mut m::model::Whisper,
        features: &Tensor,
    ) -> Result<Option<(&'static str, f64)>, TranscriptionError> {
        if self.language_tokens.is_empty() {
            return Ok(None);
        }

        let logits = self.next_token_logits(model, features, &[self.sot_token], true)?;
        let language_logits: Vec<f32> = self
            .language_tokens
            .iter()
            .map(|(_, id)| logits.get(*id as usize).copied().unwrap_or(f32::NEG_INFINITY))
            .collect();
        let probs = softmax(&language_logits);

        Ok(probs
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, p)| (self.language_tokens[i].0, f64::from(*p))))
    }

    fn next_token_logits(
        &self,
        model: &mut m::model::Whisper,
        features: &Tensor,
        tokens: &[u32],
        flush_kv_cache: bool,
    ) -> Result<Vec<f32>, TranscriptionError> {
        let input = Tensor::new(tokens, &self.device)
            .and_then(|t| t.unsqueeze(0))
            .map_err(inference)?;

        let hidden = model
            .decoder
            .forward(&input, features, flush_kv_cache)
            .map_err(|e| TranscriptionError::TranscriptionFailed(format!("decoder: {}", e)))?;

        let logits = model
            .decoder
            .final_linear(&hidden.squeeze(0).map_err(inference)?)
            .map_err(|e| TranscriptionError::TranscriptionFailed(format!("linear: {}", e)))?;

        let seq_len = logits.dim(0).map_err(inference)?;
        logits
            .get(seq_len - 1)
            .and_then(|t| t.to_dtype(DType::F32))
            .and_then(|t| t.to_vec1::<f32>())
            .map_err(inference)
    }
}

fn inference(e: candle_core::Error) -> TranscriptionError {
    TranscriptionError::TranscriptionFailed(e.to_string())
}

fn token_id(tokenizer: &Tokenizer, token: &str) -> Result<u32, TranscriptionError> {
    tokenizer.token_to_id(token).ok_or_else(|| {
        TranscriptionError::ModelLoadFailed(format!("token not found: {}", token))
    })
}
