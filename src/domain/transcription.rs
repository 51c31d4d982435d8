use serde::{Deserialize, Serialize};

use super::language;

/// A time-bounded span of transcribed speech. Times are in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub text: String,
    pub start: f64,
    pub end: f64,
}

impl Segment {
    pub fn new(text: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            text: text.into(),
            start,
            end,
        }
    }
}

/// What a speech recognition engine hands back for one audio file.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineTranscription {
    pub segments: Vec<Segment>,
    pub language_code: String,
    pub language_probability: f64,
}

/// The transcript persisted next to the audio as `<stem>.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionResult {
    pub segments: Vec<Segment>,
    pub full_text: String,
    pub language: String,
    pub language_probability: f64,
    pub language_code: String,
}

impl TranscriptionResult {
    /// Segment texts are trimmed and joined with a single space in start order.
    pub const SEGMENT_SEPARATOR: &'static str = " ";

    pub fn from_engine(transcription: EngineTranscription) -> Self {
        let mut segments: Vec<Segment> = transcription
            .segments
            .into_iter()
            .filter_map(|segment| {
                let text = segment.text.trim();
                if text.is_empty() {
                    return None;
                }
                let start = non_negative(segment.start);
                let end = non_negative(segment.end).max(start);
                Some(Segment::new(text, start, end))
            })
            .collect();
        // Remote engines may answer out of order; ties keep emission order.
        segments.sort_by(|a, b| a.start.total_cmp(&b.start));

        let full_text = segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(Self::SEGMENT_SEPARATOR);

        let language_code = transcription.language_code.trim().to_ascii_lowercase();
        let language = language::name_for(&language_code)
            .map(str::to_string)
            .unwrap_or_else(|| language_code.clone());

        let language_probability = if transcription.language_probability.is_nan() {
            0.0
        } else {
            transcription.language_probability.clamp(0.0, 1.0)
        };

        Self {
            segments,
            full_text,
            language,
            language_probability,
            language_code,
        }
    }

    pub fn to_json_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
    }
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() { value.max(0.0) } else { 0.0 }
}
