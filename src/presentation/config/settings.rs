use std::path::PathBuf;
use std::time::Duration;

use config::{Config, ConfigError, File};
use serde::Deserialize;

use crate::infrastructure::audio::{
    DEFAULT_BEAM_WIDTH, DEFAULT_MODEL_SIZE, Precision, TranscriptionProvider, WhisperOptions,
};

use super::Environment;

const CONFIG_DIR: &str = "config";
const ENV_PREFIX: &str = "APP";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub storage: StorageSettings,
    pub transcription: TranscriptionSettings,
    pub worker: WorkerSettings,
    pub upload: UploadSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    pub content_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptionSettings {
    pub provider: TranscriptionProvider,
    pub model_size: String,
    pub precision: Precision,
    pub beam_width: usize,
    /// Zero disables the timeout.
    pub timeout_secs: u64,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub remote_model: Option<String>,
}

impl TranscriptionSettings {
    pub fn whisper_options(&self) -> WhisperOptions {
        WhisperOptions {
            model_size: self.model_size.clone(),
            precision: self.precision,
            beam_width: self.beam_width,
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerSettings {
    pub queue_capacity: usize,
    pub max_concurrent_jobs: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadSettings {
    pub max_file_size_mb: u64,
}

impl UploadSettings {
    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb.saturating_mul(1024 * 1024)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    pub level: String,
    pub enable_json: bool,
}

impl Settings {
    /// Layers built-in defaults, `config/appsettings.toml`,
    /// `config/appsettings.<env>.toml` and `APP_*` environment variables
    /// (`__` separates nested keys, e.g. `APP_TRANSCRIPTION__BEAM_WIDTH`).
    pub fn load(environment: Environment) -> Result<Self, ConfigError> {
        let builder = Self::defaults(Config::builder())?
            .add_source(File::with_name(&format!("{}/appsettings", CONFIG_DIR)).required(false))
            .add_source(
                File::with_name(&format!("{}/appsettings.{}", CONFIG_DIR, environment.as_str()))
                    .required(false),
            )
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn defaults(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        builder
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("storage.content_dir", "content")?
            .set_default("transcription.provider", "local")?
            .set_default("transcription.model_size", DEFAULT_MODEL_SIZE)?
            .set_default("transcription.precision", "f16")?
            .set_default("transcription.beam_width", DEFAULT_BEAM_WIDTH as u64)?
            .set_default("transcription.timeout_secs", 0)?
            .set_default("worker.queue_capacity", 32)?
            .set_default("worker.max_concurrent_jobs", 2)?
            .set_default("upload.max_file_size_mb", 100)?
            .set_default("logging.level", "info")?
            .set_default("logging.enable_json", false)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Message(msg.to_string()));

        if self.transcription.beam_width == 0 {
            return invalid("transcription.beam_width must be at least 1");
        }
        if self.worker.queue_capacity == 0 {
            return invalid("worker.queue_capacity must be at least 1");
        }
        if self.worker.max_concurrent_jobs == 0 {
            return invalid("worker.max_concurrent_jobs must be at least 1");
        }
        if self.storage.content_dir.as_os_str().is_empty() {
            return invalid("storage.content_dir must not be empty");
        }
        if self.upload.max_file_size_mb == 0 {
            return invalid("upload.max_file_size_mb must be at least 1");
        }
        if self.transcription.provider == TranscriptionProvider::OpenAi
            && self
                .transcription
                .api_key
                .as_deref()
                .is_none_or(|k| k.trim().is_empty())
        {
            return invalid("transcription.api_key is required for the openai provider");
        }
        Ok(())
    }
}
