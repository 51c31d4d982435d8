mod audio_intake_service;
mod transcription_worker;

pub use audio_intake_service::{AudioIntakeService, IntakeError, TranscriptionJob};
pub use transcription_worker::{TranscriptionWorker, TranscriptionWorkerError};
