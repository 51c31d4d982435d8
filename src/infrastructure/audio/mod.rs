pub mod audio_decoder;
mod candle_whisper_engine;
pub mod decoding;
mod openai_whisper_engine;
mod transcription_engine_factory;

pub use candle_whisper_engine::{
    CandleWhisperEngine, DEFAULT_BEAM_WIDTH, DEFAULT_MODEL_SIZE, Precision, WhisperOptions,
};
pub use openai_whisper_engine::{OpenAiWhisperEngine, VerboseSegment, VerboseTranscription};
pub use transcription_engine_factory::{TranscriptionEngineFactory, TranscriptionProvider};
