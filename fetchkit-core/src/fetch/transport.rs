//! HTTP transport used by the fetcher.

use std::io::Write;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderName, CONTENT_DISPOSITION, IF_MODIFIED_SINCE, LAST_MODIFIED};
use reqwest::{Client, StatusCode};
use url::Url;

use crate::error::{BoxError, Error, Result};

use super::config::FetchConfig;

/// Response metadata the fetcher inspects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteMetadata {
    pub status: StatusCode,
    /// Raw `Last-Modified` header value, if present.
    pub last_modified: Option<String>,
    /// Raw `Content-Disposition` header value, if present.
    pub content_disposition: Option<String>,
}

impl RemoteMetadata {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            last_modified: None,
            content_disposition: None,
        }
    }

    pub fn with_last_modified(mut self, value: impl Into<String>) -> Self {
        self.last_modified = Some(value.into());
        self
    }

    pub fn with_content_disposition(mut self, value: impl Into<String>) -> Self {
        self.content_disposition = Some(value.into());
        self
    }

    fn from_response(response: &reqwest::Response) -> Self {
        let header = |name: HeaderName| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        Self {
            status: response.status(),
            last_modified: header(LAST_MODIFIED),
            content_disposition: header(CONTENT_DISPOSITION),
        }
    }
}

/// Result of a body transfer.
#[derive(Debug)]
pub struct Transfer {
    pub metadata: RemoteMetadata,
    /// Bytes written to the sink. Zero when the status was not a success.
    pub bytes: u64,
}

/// Failure while transferring a body.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("network error: {0}")]
    Network(#[source] BoxError),

    #[error("write error: {0}")]
    Write(#[source] std::io::Error),
}

/// The two requests the fetcher issues.
///
/// Implementations follow redirects and apply their own deadlines; the
/// fetcher never retries.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issues a body-less request carrying `If-Modified-Since`.
    ///
    /// # Arguments
    ///
    /// * `url` - Resource to query
    /// * `if_modified_since` - HTTP date of the local copy
    ///
    /// # Errors
    ///
    /// Returns an error only for network-level failures. Any HTTP status,
    /// including errors, is reported through [`RemoteMetadata::status`].
    async fn head(&self, url: &Url, if_modified_since: &str) -> std::result::Result<RemoteMetadata, BoxError>;

    /// Issues an unconditional request and streams a successful body into `sink`.
    ///
    /// The body is only written when the status is a success.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::Network`] if the request or body stream fails
    /// and [`TransferError::Write`] if `sink` rejects data.
    async fn get(
        &self,
        url: &Url,
        sink: &mut (dyn Write + Send),
    ) -> std::result::Result<Transfer, TransferError>;
}

/// [`Transport`] backed by `reqwest`.
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Creates a transport from the timeout and user agent in `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let mut builder = Client::builder().user_agent(config.user_agent.clone());
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder.build().map_err(|e| Error::Client(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn head(&self, url: &Url, if_modified_since: &str) -> std::result::Result<RemoteMetadata, BoxError> {
        let response = self
            .client
            .head(url.clone())
            .header(IF_MODIFIED_SINCE, if_modified_since)
            .send()
            .await?;
        Ok(RemoteMetadata::from_response(&response))
    }

    async fn get(
        &self,
        url: &Url,
        sink: &mut (dyn Write + Send),
    ) -> std::result::Result<Transfer, TransferError> {
        let mut response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| TransferError::Network(e.into()))?;

        let metadata = RemoteMetadata::from_response(&response);
        if !metadata.status.is_success() {
            return Ok(Transfer { metadata, bytes: 0 });
        }

        let mut bytes = 0u64;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| TransferError::Network(e.into()))?
        {
            sink.write_all(&chunk).map_err(TransferError::Write)?;
            bytes += chunk.len() as u64;
        }

        Ok(Transfer { metadata, bytes })
    }
}
