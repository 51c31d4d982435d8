use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::StreamExt;

use crate::application::ports::{AttachmentFetchError, AttachmentFetcher};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Downloads webhook attachments over HTTP(S), enforcing a size cap while streaming.
pub struct ReqwestAttachmentFetcher {
    client: reqwest::Client,
}

impl ReqwestAttachmentFetcher {
    pub fn new() -> Result<Self, AttachmentFetchError> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| AttachmentFetchError::RequestFailed(format!("client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl AttachmentFetcher for ReqwestAttachmentFetcher {
    async fn fetch(&self, url: &str, max_bytes: u64) -> Result<Bytes, AttachmentFetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AttachmentFetchError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AttachmentFetchError::UnexpectedStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        if response.content_length().is_some_and(|len| len > max_bytes) {
            return Err(AttachmentFetchError::TooLarge { limit: max_bytes });
        }

        let mut body = BytesMut::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| AttachmentFetchError::RequestFailed(e.to_string()))?;
            if (body.len() + chunk.len()) as u64 > max_bytes {
                return Err(AttachmentFetchError::TooLarge { limit: max_bytes });
            }
            body.extend_from_slice(&chunk);
        }

        Ok(body.freeze())
    }
}
