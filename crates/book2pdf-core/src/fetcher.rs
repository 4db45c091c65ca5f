//! Page image download
//!
//! Each page's image datastream is written into the assembly's scratch
//! directory under its sortable name. A page that cannot be downloaded is
//! replaced by an empty placeholder so the page count never shifts and the
//! converter's failure points at the missing page.

use crate::error::{BuildError, FetchError};
use crate::repository::ObjectRepository;
use crate::types::{PageImage, PageRef, PageStatus, SequenceNumber};
use std::path::Path;
use std::sync::Arc;

/// Result of fetching one page
#[derive(Debug)]
pub struct PageFetch {
    /// The materialized image or placeholder
    pub image: PageImage,
    /// Why the download failed, if it did
    pub error: Option<FetchError>,
}

/// Downloads page images into a scratch directory
#[derive(Clone)]
pub struct PageFetcher {
    repository: Arc<dyn ObjectRepository>,
    datastream: String,
}

impl std::fmt::Debug for PageFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageFetcher")
            .field("datastream", &self.datastream)
            .finish_non_exhaustive()
    }
}

impl PageFetcher {
    /// Create fetcher for the given image datastream (e.g. `LARGE_JPG`)
    pub fn new(repository: Arc<dyn ObjectRepository>, datastream: impl Into<String>) -> Self {
        Self {
            repository,
            datastream: datastream.into(),
        }
    }

    /// Download `page` into `dir` as `{sequence:06}-{page}.jpg`
    ///
    /// # Errors
    /// Only when the placeholder for a failed download cannot be written.
    /// Download failures are reported through [`PageFetch::error`].
    pub async fn fetch(
        &self,
        page: &PageRef,
        sequence: SequenceNumber,
        dir: &Path,
    ) -> Result<PageFetch, BuildError> {
        let path = dir.join(PageImage::file_name(page, sequence));
        match self
            .repository
            .download_datastream(page.as_str(), &self.datastream, &path)
            .await
        {
            Ok(bytes) => {
                tracing::debug!("fetched {} ({} bytes)", page, bytes);
                Ok(PageFetch {
                    image: PageImage {
                        page: page.clone(),
                        sequence,
                        path,
                        status: PageStatus::Fetched { bytes },
                    },
                    error: None,
                })
            }
            Err(e) => {
                tracing::warn!("Failed to fetch {} for page {}: {}", self.datastream, page, e);
                // truncate whatever a partial download left behind
                tokio::fs::File::create(&path)
                    .await
                    .map_err(|source| BuildError::io(&path, source))?;
                Ok(PageFetch {
                    image: PageImage {
                        page: page.clone(),
                        sequence,
                        path,
                        status: PageStatus::Placeholder,
                    },
                    error: Some(e),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FlakyRepository;

    #[async_trait::async_trait]
    impl ObjectRepository for FlakyRepository {
        async fn datastream_text(&self, _pid: &str, _dsid: &str) -> Result<String, FetchError> {
            Ok(String::new())
        }

        async fn download_datastream(
            &self,
            pid: &str,
            _dsid: &str,
            dest: &Path,
        ) -> Result<u64, FetchError> {
            // write a partial body before failing
            tokio::fs::write(dest, b"partial").await.unwrap();
            if pid == "smith:bad" {
                return Err(FetchError::Status {
                    url: pid.to_string(),
                    status: 500,
                });
            }
            tokio::fs::write(dest, b"jpegdata").await.unwrap();
            Ok(8)
        }
    }

    #[tokio::test]
    async fn writes_sortable_file() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = PageFetcher::new(Arc::new(FlakyRepository), "LARGE_JPG");
        let fetched = fetcher
            .fetch(&PageRef::new("smith:good"), SequenceNumber(3), dir.path())
            .await
            .unwrap();
        assert!(fetched.error.is_none());
        assert_eq!(fetched.image.status, PageStatus::Fetched { bytes: 8 });
        assert_eq!(fetched.image.path, dir.path().join("000003-smith:good.jpg"));
        assert_eq!(std::fs::read(&fetched.image.path).unwrap(), b"jpegdata");
    }

    #[tokio::test]
    async fn failed_download_leaves_empty_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = PageFetcher::new(Arc::new(FlakyRepository), "LARGE_JPG");
        let fetched = fetcher
            .fetch(&PageRef::new("smith:bad"), SequenceNumber(1), dir.path())
            .await
            .unwrap();
        assert!(fetched.error.is_some());
        assert_eq!(fetched.image.status, PageStatus::Placeholder);
        assert_eq!(std::fs::metadata(&fetched.image.path).unwrap().len(), 0);
    }
}
