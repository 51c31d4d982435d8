mod attachment_fetcher;
mod content_store;
mod transcription_engine;

pub use attachment_fetcher::{AttachmentFetchError, AttachmentFetcher};
pub use content_store::{ContentStore, ContentStoreError};
pub use transcription_engine::{TranscriptionEngine, TranscriptionError};
