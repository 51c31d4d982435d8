use std::path::PathBuf;
use std::time::Duration;

use scribehook::infrastructure::audio::{
    DEFAULT_BEAM_WIDTH, DEFAULT_MODEL_SIZE, Precision, TranscriptionProvider,
};
use scribehook::presentation::Environment;
use scribehook::presentation::Settings;
use scribehook::presentation::config::{
    LoggingSettings, ServerSettings, StorageSettings, TranscriptionSettings, UploadSettings,
    WorkerSettings,
};

fn valid_settings() -> Settings {
    Settings {
        server: ServerSettings {
            host: "127.0.0.1".to_string(),
            port: 3000,
        },
        storage: StorageSettings {
            content_dir: PathBuf::from("content"),
        },
        transcription: TranscriptionSettings {
            provider: TranscriptionProvider::Local,
            model_size: DEFAULT_MODEL_SIZE.to_string(),
            precision: Precision::F16,
            beam_width: DEFAULT_BEAM_WIDTH,
            timeout_secs: 0,
            api_key: None,
            base_url: None,
            remote_model: None,
        },
        worker: WorkerSettings {
            queue_capacity: 32,
            max_concurrent_jobs: 2,
        },
        upload: UploadSettings {
            max_file_size_mb: 100,
        },
        logging: LoggingSettings {
            level: "info".to_string(),
            enable_json: false,
        },
    }
}

#[test]
fn given_checked_in_config_when_loading_then_defaults_are_applied() {
    let settings = Settings::load(Environment::Test).unwrap();

    assert_eq!(settings.transcription.provider, TranscriptionProvider::Local);
    assert_eq!(settings.transcription.beam_width, DEFAULT_BEAM_WIDTH);
    assert_eq!(settings.worker.queue_capacity, 32);
    assert_eq!(settings.worker.max_concurrent_jobs, 2);
    assert_eq!(settings.transcription.timeout(), None);
}

#[test]
fn given_valid_settings_when_validating_then_passes() {
    assert!(valid_settings().validate().is_ok());
}

#[test]
fn given_zero_beam_width_when_validating_then_fails() {
    let mut settings = valid_settings();
    settings.transcription.beam_width = 0;

    assert!(settings.validate().is_err());
}

#[test]
fn given_zero_worker_limits_when_validating_then_fails() {
    let mut queue = valid_settings();
    queue.worker.queue_capacity = 0;
    let mut jobs = valid_settings();
    jobs.worker.max_concurrent_jobs = 0;

    assert!(queue.validate().is_err());
    assert!(jobs.validate().is_err());
}

#[test]
fn given_empty_content_dir_when_validating_then_fails() {
    let mut settings = valid_settings();
    settings.storage.content_dir = PathBuf::new();

    assert!(settings.validate().is_err());
}

#[test]
fn given_openai_provider_without_key_when_validating_then_fails() {
    let mut settings = valid_settings();
    settings.transcription.provider = TranscriptionProvider::OpenAi;
    settings.transcription.api_key = Some("  ".to_string());

    assert!(settings.validate().is_err());

    settings.transcription.api_key = Some("sk-test".to_string());
    assert!(settings.validate().is_ok());
}

#[test]
fn given_timeout_secs_when_reading_timeout_then_zero_disables_it() {
    let mut settings = valid_settings();
    assert_eq!(settings.transcription.timeout(), None);

    settings.transcription.timeout_secs = 90;
    assert_eq!(
        settings.transcription.timeout(),
        Some(Duration::from_secs(90))
    );
}

#[test]
fn given_transcription_settings_when_building_whisper_options_then_fields_carry_over() {
    let mut settings = valid_settings();
    settings.transcription.model_size = "small".to_string();
    settings.transcription.precision = Precision::Bf16;
    settings.transcription.beam_width = 3;

    let options = settings.transcription.whisper_options();

    assert_eq!(options.model_size, "small");
    assert_eq!(options.precision, Precision::Bf16);
    assert_eq!(options.beam_width, 3);
}

#[test]
fn given_upload_limit_in_megabytes_when_converting_then_returns_bytes() {
    let upload = UploadSettings { max_file_size_mb: 2 };

    assert_eq!(upload.max_file_size_bytes(), 2 * 1024 * 1024);
}
