use bytes::Bytes;

/// Downloads attachments that a webhook only references by URL.
#[async_trait::async_trait]
pub trait AttachmentFetcher: Send + Sync {
    async fn fetch(&self, url: &str, max_bytes: u64) -> Result<Bytes, AttachmentFetchError>;
}

#[derive(Debug, thiserror::Error)]
pub enum AttachmentFetchError {
    #[error("request failed: {0}")]
    RequestFailed(String),
    #[error("unexpected status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },
    #[error("attachment exceeds {limit} bytes")]
    TooLarge { limit: u64 },
}
