use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tracing::Instrument;

use crate::application::ports::{
    ContentStore, ContentStoreError, TranscriptionEngine, TranscriptionError,
};
use crate::domain::{ContentPath, TranscriptionResult};

use super::audio_intake_service::TranscriptionJob;

/// Drains the transcription queue, running at most `max_concurrent_jobs`
/// jobs at a time. Failures are terminal for their job and only logged.
pub struct TranscriptionWorker {
    receiver: mpsc::Receiver<TranscriptionJob>,
    processor: JobProcessor,
    limiter: Arc<Semaphore>,
}

#[derive(Clone)]
struct JobProcessor {
    engine: Arc<dyn TranscriptionEngine>,
    store: Arc<dyn ContentStore>,
    timeout: Option<Duration>,
}

impl TranscriptionWorker {
    pub fn new(
        receiver: mpsc::Receiver<TranscriptionJob>,
        engine: Arc<dyn TranscriptionEngine>,
        store: Arc<dyn ContentStore>,
        max_concurrent_jobs: usize,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            receiver,
            processor: JobProcessor {
                engine,
                store,
                timeout,
            },
            limiter: Arc::new(Semaphore::new(max_concurrent_jobs.max(1))),
        }
    }

    /// Runs until every sender is dropped, then waits for in-flight jobs.
    pub async fn run(mut self) {
        tracing::info!(
            max_concurrent_jobs = self.limiter.available_permits(),
            "Transcription worker started"
        );

        let mut in_flight = JoinSet::new();

        while let Some(job) = self.receiver.recv().await {
            let permit = match Arc::clone(&self.limiter).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };

            let span = tracing::info_span!(
                "transcription_job",
                audio = %job.audio_path,
                format = ?job.format,
            );
            let processor = self.processor.clone();

            in_flight.spawn(
                async move {
                    let _permit = permit;
                    processor.handle(job).await;
                }
                .instrument(span),
            );

            while let Some(finished) = in_flight.try_join_next() {
                log_task_outcome(finished);
            }
        }

        while let Some(finished) = in_flight.join_next().await {
            log_task_outcome(finished);
        }

        tracing::info!("Transcription worker stopped: channel closed");
    }
}

impl JobProcessor {
    async fn handle(&self, job: TranscriptionJob) {
        match self.process(&job).await {
            Ok((result_path, segments)) => {
                tracing::info!(
                    result = %result_path,
                    segments,
                    "Transcription completed"
                );
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    audio = %job.audio_path,
                    "Transcription failed, no result written"
                );
            }
        }
    }

    async fn process(
        &self,
        job: &TranscriptionJob,
    ) -> Result<(ContentPath, usize), TranscriptionWorkerError> {
        let data = self
            .store
            .fetch(&job.audio_path)
            .await
            .map_err(TranscriptionWorkerError::AudioFetch)?;

        tracing::debug!(bytes = data.len(), "Starting audio transcription");

        let transcription = match self.timeout {
            Some(limit) => {
                tokio::time::timeout(limit, self.engine.transcribe(&data, job.format))
                    .await
                    .map_err(|_| TranscriptionWorkerError::Timeout(limit))?
            }
            None => self.engine.transcribe(&data, job.format).await,
        }
        .map_err(TranscriptionWorkerError::Engine)?;

        let result = TranscriptionResult::from_engine(transcription);
        let segments = result.segments.len();
        let json = result
            .to_json_bytes()
            .map_err(TranscriptionWorkerError::Serialization)?;

        let result_path = job.audio_path.result_path();
        self.store
            .write_atomic(&result_path, Bytes::from(json))
            .await
            .map_err(TranscriptionWorkerError::ResultWrite)?;

        Ok((result_path, segments))
    }
}

fn log_task_outcome(outcome: Result<(), tokio::task::JoinError>) {
    if let Err(e) = outcome {
        tracing::error!(error = %e, "Transcription task aborted");
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TranscriptionWorkerError {
    #[error("audio fetch: {0}")]
    AudioFetch(ContentStoreError),
    #[error("engine: {0}")]
    Engine(TranscriptionError),
    #[error("engine timed out after {0:?}")]
    Timeout(Duration),
    #[error("result serialization: {0}")]
    Serialization(serde_json::Error),
    #[error("result write: {0}")]
    ResultWrite(ContentStoreError),
}
