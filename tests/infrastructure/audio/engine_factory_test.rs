use candle_core::{DType, Device};

use scribehook::application::ports::TranscriptionError;
use scribehook::infrastructure::audio::{
    CandleWhisperEngine, DEFAULT_BEAM_WIDTH, DEFAULT_MODEL_SIZE, Precision,
    TranscriptionEngineFactory, TranscriptionProvider, WhisperOptions,
};

#[test]
fn given_default_options_when_created_then_medium_f16_with_default_beam() {
    let options = WhisperOptions::default();

    assert_eq!(options.model_size, DEFAULT_MODEL_SIZE);
    assert_eq!(options.model_size, "medium");
    assert_eq!(options.precision, Precision::F16);
    assert_eq!(options.beam_width, DEFAULT_BEAM_WIDTH);
}

#[test]
fn given_bare_model_size_when_resolving_repo_then_openai_repo_is_used() {
    assert_eq!(CandleWhisperEngine::model_repo("medium"), "openai/whisper-medium");
    assert_eq!(
        CandleWhisperEngine::model_repo("distil-whisper/distil-large-v3"),
        "distil-whisper/distil-large-v3"
    );
}

#[test]
fn given_cpu_device_when_selecting_dtype_then_precision_is_honoured() {
    assert_eq!(
        CandleWhisperEngine::select_dtype(&Device::Cpu, Precision::F16),
        DType::F16
    );
    assert_eq!(
        CandleWhisperEngine::select_dtype(&Device::Cpu, Precision::Bf16),
        DType::BF16
    );
    assert_eq!(
        CandleWhisperEngine::select_dtype(&Device::Cpu, Precision::F32),
        DType::F32
    );
}

#[test]
fn given_precision_names_when_deserializing_then_lowercase_names_map() {
    let parsed: Vec<Precision> = serde_json::from_str(r#"["f32","f16","bf16"]"#).unwrap();

    assert_eq!(parsed, vec![Precision::F32, Precision::F16, Precision::Bf16]);
}

#[test]
fn given_provider_names_when_deserializing_then_local_and_openai_map() {
    let parsed: Vec<TranscriptionProvider> =
        serde_json::from_str(r#"["local","openai"]"#).unwrap();

    assert_eq!(
        parsed,
        vec![TranscriptionProvider::Local, TranscriptionProvider::OpenAi]
    );
}

#[test]
fn given_openai_provider_without_key_when_creating_engine_then_fails() {
    let result = TranscriptionEngineFactory::create(
        TranscriptionProvider::OpenAi,
        &WhisperOptions::default(),
        None,
        None,
        None,
    );

    assert!(matches!(result, Err(TranscriptionError::ModelLoadFailed(_))));
}

#[test]
fn given_openai_provider_with_key_when_creating_engine_then_succeeds() {
    let result = TranscriptionEngineFactory::create(
        TranscriptionProvider::OpenAi,
        &WhisperOptions::default(),
        Some("sk-test".to_string()),
        Some("http://localhost:9999/v1".to_string()),
        Some("whisper-1".to_string()),
    );

    assert!(result.is_ok());
}
