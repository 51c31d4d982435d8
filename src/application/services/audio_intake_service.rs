use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::application::ports::{
    AttachmentFetchError, AttachmentFetcher, ContentStore, ContentStoreError,
};
use crate::domain::{AudioAttachment, AudioFormat, ContentPath};

const MAX_NAME_ATTEMPTS: u32 = 1_000;

/// Unit of work handed from the webhook to the transcription worker.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptionJob {
    pub audio_path: ContentPath,
    pub format: AudioFormat,
}

/// Validates incoming audio, persists it without overwriting anything and
/// schedules it for transcription.
pub struct AudioIntakeService {
    store: Arc<dyn ContentStore>,
    fetcher: Arc<dyn AttachmentFetcher>,
    sender: mpsc::Sender<TranscriptionJob>,
    max_file_size_bytes: u64,
}

impl AudioIntakeService {
    pub fn new(
        store: Arc<dyn ContentStore>,
        fetcher: Arc<dyn AttachmentFetcher>,
        sender: mpsc::Sender<TranscriptionJob>,
        max_file_size_bytes: u64,
    ) -> Self {
        Self {
            store,
            fetcher,
            sender,
            max_file_size_bytes,
        }
    }

    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_bytes
    }

    /// Checks an uploaded payload and turns it into an [`AudioAttachment`].
    pub fn validate(
        &self,
        filename: &str,
        content_type: Option<&str>,
        data: Bytes,
    ) -> Result<AudioAttachment, IntakeError> {
        let format = self.resolve_format(filename, content_type)?;
        self.check_payload(filename, &data)?;
        Ok(AudioAttachment::new(filename.to_string(), format, data))
    }

    /// Downloads an attachment the sender only referenced by URL.
    ///
    /// The format is checked before anything is downloaded.
    pub async fn fetch_remote(
        &self,
        filename: &str,
        content_type: Option<&str>,
        url: &str,
    ) -> Result<AudioAttachment, IntakeError> {
        let format = self.resolve_format(filename, content_type)?;

        let data = self
            .fetcher
            .fetch(url, self.max_file_size_bytes)
            .await
            .map_err(|e| match e {
                AttachmentFetchError::TooLarge { limit } => IntakeError::PayloadTooLarge {
                    filename: filename.to_string(),
                    limit,
                },
                other => IntakeError::AttachmentDownloadFailure(other.to_string()),
            })?;

        tracing::debug!(filename = %filename, bytes = data.len(), "Attachment downloaded");

        self.check_payload(filename, &data)?;
        Ok(AudioAttachment::new(filename.to_string(), format, data))
    }

    /// Persists the attachment and enqueues it. The stored path is returned
    /// once the worker has been handed the job.
    pub async fn accept(&self, attachment: AudioAttachment) -> Result<ContentPath, IntakeError> {
        let path = self.persist(&attachment).await?;

        let job = TranscriptionJob {
            audio_path: path.clone(),
            format: attachment.format,
        };

        if let Err(e) = self.sender.try_send(job) {
            let reason = match e {
                TrySendError::Full(_) => "transcription queue is full",
                TrySendError::Closed(_) => "transcription worker is not running",
            };
            tracing::error!(path = %path, reason, "Failed to enqueue transcription job");

            self.release(&path).await;
            return Err(IntakeError::QueueUnavailable(reason.to_string()));
        }

        tracing::info!(
            path = %path,
            original_filename = %attachment.filename,
            bytes = attachment.size_bytes(),
            "Audio accepted and scheduled for transcription"
        );

        Ok(path)
    }

    async fn persist(&self, attachment: &AudioAttachment) -> Result<ContentPath, IntakeError> {
        for attempt in 0..MAX_NAME_ATTEMPTS {
            let path = ContentPath::for_upload(&attachment.filename, attachment.format, attempt);

            // A transcript or another format under this stem would share the result path.
            if self.stem_taken(&path).await? {
                continue;
            }

            match self.store.create_new(&path, attachment.data.clone()).await {
                Ok(size) => {
                    // A concurrent upload may have claimed the stem with another format
                    // in the meantime. At most one of the two survives this check.
                    if self.stem_taken(&path).await? {
                        tracing::debug!(path = %path, attempt, "Stem claimed concurrently, retrying");
                        self.release(&path).await;
                        continue;
                    }
                    tracing::debug!(path = %path, bytes = size, attempt, "Audio persisted");
                    return Ok(path);
                }
                Err(ContentStoreError::AlreadyExists(_)) => continue,
                Err(e) => {
                    tracing::error!(error = %e, path = %path, "Failed to persist audio");
                    return Err(IntakeError::StorageWriteFailure(e.to_string()));
                }
            }
        }

        Err(IntakeError::StorageWriteFailure(format!(
            "no free name for {} after {} attempts",
            attachment.filename, MAX_NAME_ATTEMPTS
        )))
    }

    async fn release(&self, path: &ContentPath) {
        if let Err(e) = self.store.delete(path).await {
            tracing::warn!(error = %e, path = %path, "Failed to remove unscheduled audio");
        }
    }

    async fn stem_taken(&self, path: &ContentPath) -> Result<bool, IntakeError> {
        for sibling in path.siblings() {
            let exists = self
                .store
                .exists(&sibling)
                .await
                .map_err(|e| IntakeError::StorageWriteFailure(e.to_string()))?;
            if exists {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn resolve_format(
        &self,
        filename: &str,
        content_type: Option<&str>,
    ) -> Result<AudioFormat, IntakeError> {
        AudioFormat::resolve(content_type, filename).ok_or_else(|| {
            IntakeError::UnsupportedFormat(
                content_type
                    .filter(|ct| !ct.trim().is_empty())
                    .unwrap_or(filename)
                    .to_string(),
            )
        })
    }

    fn check_payload(&self, filename: &str, data: &Bytes) -> Result<(), IntakeError> {
        if data.is_empty() {
            return Err(IntakeError::MissingAttachment(format!(
                "{} is empty",
                filename
            )));
        }
        if data.len() as u64 > self.max_file_size_bytes {
            return Err(IntakeError::PayloadTooLarge {
                filename: filename.to_string(),
                limit: self.max_file_size_bytes,
            });
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("missing attachment: {0}")]
    MissingAttachment(String),
    #[error("unsupported audio format: {0}")]
    UnsupportedFormat(String),
    #[error("{filename} exceeds the {limit} byte upload limit")]
    PayloadTooLarge { filename: String, limit: u64 },
    #[error("attachment download failed: {0}")]
    AttachmentDownloadFailure(String),
    #[error("storage write failed: {0}")]
    StorageWriteFailure(String),
    #[error("queue unavailable: {0}")]
    QueueUnavailable(String),
}
