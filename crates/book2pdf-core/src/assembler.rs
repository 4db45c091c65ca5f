//! Book assembly
//!
//! Turns one book object into one PDF:
//! 1. Enumerate the book's pages from the index
//! 2. Resolve every page's sequence number and download its image
//! 3. Sort the images by their sequence-prefixed file names
//! 4. Run the converter into a staging file beside the final output
//! 5. Publish the staging file by atomic rename on success
//!
//! Page images live in a scratch directory owned by one call to
//! [`BookAssembler::assemble`]; it is removed on every exit path.

use crate::cancel::CancelToken;
use crate::config::RepositoryConfig;
use crate::converter::Converter;
use crate::error::{BuildError, FetchError, IndexError, PageFailure, PageFailureKind, SequenceError};
use crate::fetcher::PageFetcher;
use crate::index::IndexClient;
use crate::repository::ObjectRepository;
use crate::sequence::SequenceResolver;
use crate::types::{AssembledArtifact, BookId, PageImage, PageRef, SequenceNumber};
use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::Instrument;

/// Suffix of a converter output kept after a failed conversion
pub const PARTIAL_SUFFIX: &str = ".partial";

/// Order images for conversion by `(sequence, page)`
///
/// Matches the lexicographic order of the scratch file names for the usual
/// identifiers and sequences below 1,000,000, and stays correct beyond them.
pub fn sort_for_conversion(images: &mut [PageImage]) {
    images.sort_by(|a, b| a.order_key().cmp(&b.order_key()));
}

/// A materialized page plus any recovered failures
struct Materialized {
    image: PageImage,
    failures: Vec<PageFailure>,
}

/// Assembles book objects into PDFs
#[derive(Clone)]
pub struct BookAssembler {
    index: Arc<dyn IndexClient>,
    resolver: SequenceResolver,
    fetcher: PageFetcher,
    converter: Arc<dyn Converter>,
    output_dir: PathBuf,
    scratch_root: Option<PathBuf>,
    page_concurrency: usize,
    cancel: CancelToken,
    locks: Arc<DashMap<BookId, Arc<tokio::sync::Mutex<()>>>>,
}

impl std::fmt::Debug for BookAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BookAssembler")
            .field("output_dir", &self.output_dir)
            .field("scratch_root", &self.scratch_root)
            .field("page_concurrency", &self.page_concurrency)
            .field("converter", &self.converter.name())
            .finish_non_exhaustive()
    }
}

impl BookAssembler {
    /// Create assembler writing into the current directory
    pub fn new(
        config: &RepositoryConfig,
        index: Arc<dyn IndexClient>,
        repository: Arc<dyn ObjectRepository>,
        converter: Arc<dyn Converter>,
    ) -> Self {
        Self {
            index,
            resolver: SequenceResolver::new(repository.clone(), config.tuning.sequence_tag.clone()),
            fetcher: PageFetcher::new(repository, config.tuning.image_datastream.clone()),
            converter,
            output_dir: PathBuf::from("."),
            scratch_root: None,
            page_concurrency: config.tuning.page_concurrency.max(1),
            cancel: CancelToken::new(),
            locks: Arc::new(DashMap::new()),
        }
    }

    /// Write PDFs into `dir`
    #[inline]
    #[must_use]
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Create scratch directories under `dir` instead of the system temp dir
    #[inline]
    #[must_use]
    pub fn with_scratch_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(dir.into());
        self
    }

    /// Stop between pages once `cancel` fires
    #[inline]
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Output directory
    #[inline]
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Final location of a book's PDF
    #[must_use]
    pub fn artifact_path(&self, book: &BookId) -> PathBuf {
        self.output_dir.join(book.artifact_file_name())
    }

    /// Assemble one book into `<id>_PDF.pdf`
    ///
    /// Concurrent calls for the same book are serialized.
    ///
    /// # Errors
    /// - `IndexUnavailable` if the page query fails
    /// - `NoPagesFound` if the book has no pages; nothing is written
    /// - `ConversionFailed` if the converter exits non-zero
    /// - `ConverterLaunch`, `Io`, `Cancelled`
    pub async fn assemble(&self, book: &BookId) -> Result<AssembledArtifact, BuildError> {
        let lock = self
            .locks
            .entry(book.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        let result = {
            let _guard = lock.lock().await;
            self.assemble_unlocked(book)
                .instrument(tracing::info_span!("book", %book))
                .await
        };
        drop(lock);
        self.locks
            .remove_if(book, |_, held| Arc::strong_count(held) == 1);
        result
    }

    async fn assemble_unlocked(&self, book: &BookId) -> Result<AssembledArtifact, BuildError> {
        tracing::info!("Building PDF for {}", book);
        if self.cancel.is_cancelled() {
            return Err(BuildError::Cancelled);
        }

        let pages = self.index.pages_of(book).await.map_err(|e| match e {
            IndexError::Cancelled => BuildError::Cancelled,
            other => BuildError::IndexUnavailable(other),
        })?;
        let pages = dedup_pages(pages);
        if pages.is_empty() {
            return Err(BuildError::NoPagesFound { book: book.clone() });
        }
        tracing::info!("{} pages found", pages.len());

        let scratch = self.scratch_dir()?;
        let materialized: Vec<Result<Materialized, BuildError>> = stream::iter(pages.iter())
            .map(|page| self.materialize(page, scratch.path()))
            .buffer_unordered(self.page_concurrency)
            .collect()
            .await;

        let mut images = Vec::with_capacity(pages.len());
        let mut page_failures = Vec::new();
        for item in materialized {
            let item = item?;
            images.push(item.image);
            page_failures.extend(item.failures);
        }
        sort_for_conversion(&mut images);
        let inputs: Vec<PathBuf> = images.iter().map(|image| image.path.clone()).collect();

        let path = self.convert(book, &inputs).await?;
        tracing::info!("wrote {} ({} pages)", path.display(), inputs.len());

        drop(scratch);
        Ok(AssembledArtifact {
            book: book.clone(),
            path,
            page_count: inputs.len(),
            page_failures,
        })
    }

    fn scratch_dir(&self) -> Result<tempfile::TempDir, BuildError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("book2pdf-");
        match &self.scratch_root {
            Some(root) => builder
                .tempdir_in(root)
                .map_err(|source| BuildError::io(root, source)),
            None => builder
                .tempdir()
                .map_err(|source| BuildError::io(std::env::temp_dir(), source)),
        }
    }

    /// Resolve and download one page
    async fn materialize(&self, page: &PageRef, dir: &Path) -> Result<Materialized, BuildError> {
        if self.cancel.is_cancelled() {
            return Err(BuildError::Cancelled);
        }
        let mut failures = Vec::new();

        let sequence = match self.resolver.resolve_detailed(page).await {
            Ok(sequence) => sequence,
            Err(SequenceError::Fetch(FetchError::Cancelled)) => return Err(BuildError::Cancelled),
            Err(e) => {
                tracing::warn!("Failed to get sequence number for page {}: {}", page, e);
                failures.push(PageFailure::new(
                    page.clone(),
                    PageFailureKind::SequenceUnresolvable,
                    e.to_string(),
                ));
                SequenceNumber::FALLBACK
            }
        };

        let fetched = self.fetcher.fetch(page, sequence, dir).await?;
        match fetched.error {
            Some(FetchError::Cancelled) => return Err(BuildError::Cancelled),
            Some(e) => failures.push(PageFailure::new(
                page.clone(),
                PageFailureKind::PageFetchFailed,
                e.to_string(),
            )),
            None => {}
        }

        Ok(Materialized {
            image: fetched.image,
            failures,
        })
    }

    /// Run the converter into a staging file and publish it
    async fn convert(&self, book: &BookId, inputs: &[PathBuf]) -> Result<PathBuf, BuildError> {
        let final_path = self.artifact_path(book);
        let file_name = book.artifact_file_name();
        let staging = tempfile::Builder::new()
            .prefix(&format!(".{file_name}."))
            .suffix(".part")
            .tempfile_in(&self.output_dir)
            .map_err(|source| BuildError::io(&self.output_dir, source))?;

        let outcome = self.converter.convert(inputs, staging.path()).await?;
        if outcome.success {
            staging
                .persist(&final_path)
                .map_err(|e| BuildError::io(&final_path, e.error))?;
            return Ok(final_path);
        }

        tracing::error!("Failed to build PDF for {}: {}", book, outcome.status);
        let partial = self
            .output_dir
            .join(format!("{file_name}{PARTIAL_SUFFIX}"));
        if let Err(e) = staging.persist(&partial) {
            tracing::warn!("could not keep partial output {}: {}", partial.display(), e.error);
        }
        Err(BuildError::ConversionFailed {
            book: book.clone(),
            status: outcome.status,
            stderr: outcome.stderr,
        })
    }
}

/// Drop repeated page identifiers, keeping first occurrence
fn dedup_pages(pages: Vec<PageRef>) -> Vec<PageRef> {
    let mut seen = HashSet::with_capacity(pages.len());
    pages
        .into_iter()
        .filter(|page| {
            let fresh = seen.insert(page.clone());
            if !fresh {
                tracing::warn!("index listed page {} more than once", page);
            }
            fresh
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PageStatus;

    fn image(seq: u32, page: &str) -> PageImage {
        PageImage {
            page: PageRef::new(page),
            sequence: SequenceNumber(seq),
            path: PathBuf::from("/scratch").join(PageImage::file_name(&PageRef::new(page), SequenceNumber(seq))),
            status: PageStatus::Placeholder,
        }
    }

    #[test]
    fn sorts_by_sequence_then_page() {
        let mut images = vec![
            image(2, "smith:pageA"),
            image(1, "smith:pageB"),
            image(0, "smith:pageC"),
            image(1, "smith:pageA"),
        ];
        sort_for_conversion(&mut images);
        let order: Vec<(u32, &str)> = images
            .iter()
            .map(|i| (i.sequence.0, i.page.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![
                (0, "smith:pageC"),
                (1, "smith:pageA"),
                (1, "smith:pageB"),
                (2, "smith:pageA"),
            ]
        );
    }

    #[test]
    fn prefix_ids_sort_by_identifier() {
        let mut images = vec![image(0, "a:1-x"), image(0, "a:1")];
        sort_for_conversion(&mut images);
        assert_eq!(images[0].page.as_str(), "a:1");
        assert_eq!(images[1].page.as_str(), "a:1-x");
    }

    #[test]
    fn large_sequences_sort_numerically() {
        let mut images = vec![image(1_000_000, "a:1"), image(999_999, "a:2")];
        sort_for_conversion(&mut images);
        assert_eq!(images[0].sequence, SequenceNumber(999_999));
        assert_eq!(images[1].sequence, SequenceNumber(1_000_000));
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let pages = vec![
            PageRef::new("a:2"),
            PageRef::new("a:1"),
            PageRef::new("a:2"),
        ];
        assert_eq!(dedup_pages(pages), vec![PageRef::new("a:2"), PageRef::new("a:1")]);
    }
}
