mod audio_attachment;
mod content_path;
pub mod language;
mod transcription;

pub use audio_attachment::{AudioAttachment, AudioFormat};
pub use content_path::{ContentPath, sanitize_stem};
pub use transcription::{EngineTranscription, Segment, TranscriptionResult};
