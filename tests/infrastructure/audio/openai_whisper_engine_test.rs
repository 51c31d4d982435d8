use axum::Router;
use axum::extract::Multipart;
use axum::routing::post;

use scribehook::application::ports::{TranscriptionEngine, TranscriptionError};
use scribehook::domain::AudioFormat;
use scribehook::infrastructure::audio::{OpenAiWhisperEngine, VerboseTranscription};

fn verbose(json: serde_json::Value) -> VerboseTranscription {
    serde_json::from_value(json).unwrap()
}

#[test]
fn given_verbose_response_when_mapping_then_language_name_becomes_code() {
    let transcription = verbose(serde_json::json!({
        "language": "english",
        "text": "Hello there. Bye.",
        "duration": 3.2,
        "segments": [
            { "id": 0, "start": 0.0, "end": 1.4, "text": " Hello there." },
            { "id": 1, "start": 1.4, "end": 3.2, "text": " Bye." }
        ]
    }))
    .into_engine_transcription();

    assert_eq!(transcription.language_code, "en");
    assert_eq!(transcription.language_probability, 1.0);
    assert_eq!(transcription.segments.len(), 2);
    assert_eq!(transcription.segments[1].text, " Bye.");
    assert_eq!(transcription.segments[1].end, 3.2);
}

#[test]
fn given_unknown_language_when_mapping_then_probability_is_zero() {
    let transcription = verbose(serde_json::json!({
        "language": "Elvish",
        "text": "",
        "segments": []
    }))
    .into_engine_transcription();

    assert_eq!(transcription.language_code, "elvish");
    assert_eq!(transcription.language_probability, 0.0);
    assert!(transcription.segments.is_empty());
}

#[test]
fn given_text_without_segments_when_mapping_then_one_segment_spans_the_audio() {
    let transcription = verbose(serde_json::json!({
        "language": "german",
        "text": " Guten Tag ",
        "duration": 2.5
    }))
    .into_engine_transcription();

    assert_eq!(transcription.language_code, "de");
    assert_eq!(transcription.segments.len(), 1);
    assert_eq!(transcription.segments[0].text, "Guten Tag");
    assert_eq!(transcription.segments[0].start, 0.0);
    assert_eq!(transcription.segments[0].end, 2.5);
}

async fn spawn_server(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn fake_transcriptions(mut multipart: Multipart) -> axum::Json<serde_json::Value> {
    let mut model = String::new();
    let mut file_name = String::new();
    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("model") => model = field.text().await.unwrap(),
            Some("file") => file_name = field.file_name().unwrap_or_default().to_string(),
            _ => {}
        }
    }
    axum::Json(serde_json::json!({
        "language": "swedish",
        "text": format!("{} {}", model, file_name),
        "duration": 1.0,
        "segments": [{ "start": 0.0, "end": 1.0, "text": format!("{} {}", model, file_name) }]
    }))
}

#[tokio::test]
async fn given_api_server_when_transcribing_then_verbose_response_is_mapped() {
    let base = spawn_server(
        Router::new().route("/v1/audio/transcriptions", post(fake_transcriptions)),
    )
    .await;
    let engine = OpenAiWhisperEngine::new(
        "sk-test".to_string(),
        Some(format!("{}/v1/", base)),
        None,
    );

    let transcription = engine
        .transcribe(b"fake audio", AudioFormat::Mp3)
        .await
        .unwrap();

    assert_eq!(transcription.language_code, "sv");
    assert_eq!(transcription.segments[0].text, "whisper-1 audio.mp3");
}

#[tokio::test]
async fn given_api_error_when_transcribing_then_returns_api_request_failed() {
    let base = spawn_server(Router::new().route(
        "/v1/audio/transcriptions",
        post(|| async { (axum::http::StatusCode::UNAUTHORIZED, "bad key") }),
    ))
    .await;
    let engine = OpenAiWhisperEngine::new(
        "sk-wrong".to_string(),
        Some(format!("{}/v1", base)),
        Some("whisper-large".to_string()),
    );

    let result = engine.transcribe(b"fake audio", AudioFormat::Wav).await;

    match result {
        Err(TranscriptionError::ApiRequestFailed(message)) => assert!(message.contains("401")),
        other => panic!("unexpected result: {:?}", other.map(|t| t.segments)),
    }
}
