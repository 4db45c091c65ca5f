//! Object repository access
//!
//! Fetches datastreams of Islandora objects: the `RELS-EXT` relationship
//! document as text and page images as bytes streamed to disk.

use crate::cancel::CancelToken;
use crate::config::RepositoryConfig;
use crate::error::FetchError;
use crate::retry::RetryPolicy;
use std::path::Path;
use tokio::io::AsyncWriteExt;

/// Datastream holding an object's relationship metadata
pub const RELS_EXT: &str = "RELS-EXT";

/// Read access to object datastreams
#[async_trait::async_trait]
pub trait ObjectRepository: Send + Sync {
    /// Fetch a datastream as text
    async fn datastream_text(&self, pid: &str, dsid: &str) -> Result<String, FetchError>;

    /// Stream a datastream into `dest`, returning bytes written
    ///
    /// `dest` is created or truncated.
    async fn download_datastream(
        &self,
        pid: &str,
        dsid: &str,
        dest: &Path,
    ) -> Result<u64, FetchError>;
}

/// HTTP client for `{islandora_url}/{pid}/datastream/{dsid}/view`
#[derive(Debug, Clone)]
pub struct IslandoraRepository {
    client: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
    cancel: CancelToken,
}

impl IslandoraRepository {
    /// Create repository client from configuration
    ///
    /// # Errors
    /// Returns the underlying error if the HTTP client cannot be built.
    pub fn new(config: &RepositoryConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self::with_client(client, config))
    }

    /// Create repository client sharing an existing HTTP client
    #[must_use]
    pub fn with_client(client: reqwest::Client, config: &RepositoryConfig) -> Self {
        Self {
            client,
            base_url: config.islandora_url.clone(),
            retry: RetryPolicy::from_tuning(&config.tuning),
            cancel: CancelToken::new(),
        }
    }

    /// Honor `cancel` on every request
    #[inline]
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Override retry policy
    #[inline]
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// View URL of a datastream
    #[must_use]
    pub fn datastream_url(&self, pid: &str, dsid: &str) -> String {
        format!("{}/{}/datastream/{}/view", self.base_url, pid, dsid)
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| FetchError::Http {
                url: url.to_string(),
                source,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }

    async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        self.get(url)
            .await?
            .text()
            .await
            .map_err(|source| FetchError::Http {
                url: url.to_string(),
                source,
            })
    }

    async fn fetch_to_file(&self, url: &str, dest: &Path) -> Result<u64, FetchError> {
        let io_err = |source| FetchError::Io {
            path: dest.to_path_buf(),
            source,
        };
        let mut response = self.get(url).await?;
        let mut file = tokio::fs::File::create(dest).await.map_err(io_err)?;
        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await.map_err(|source| FetchError::Http {
            url: url.to_string(),
            source,
        })? {
            file.write_all(&chunk).await.map_err(io_err)?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(io_err)?;
        Ok(written)
    }
}

#[async_trait::async_trait]
impl ObjectRepository for IslandoraRepository {
    async fn datastream_text(&self, pid: &str, dsid: &str) -> Result<String, FetchError> {
        let url = self.datastream_url(pid, dsid);
        let fetch = self.retry.run(&url, || self.fetch_text(&url));
        self.cancel
            .run(fetch)
            .await
            .unwrap_or(Err(FetchError::Cancelled))
    }

    async fn download_datastream(
        &self,
        pid: &str,
        dsid: &str,
        dest: &Path,
    ) -> Result<u64, FetchError> {
        let url = self.datastream_url(pid, dsid);
        let fetch = self.retry.run(&url, || self.fetch_to_file(&url, dest));
        self.cancel
            .run(fetch)
            .await
            .unwrap_or(Err(FetchError::Cancelled))
    }
}
