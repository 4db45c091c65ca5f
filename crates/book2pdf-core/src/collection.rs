//! Collection mode
//!
//! Enumerates the book objects of a collection, decides per book whether
//! its PDF needs rebuilding, and hands rebuilds to the [`BookAssembler`].
//! A failed book is logged and counted; the run continues with the next.

use crate::assembler::BookAssembler;
use crate::cancel::CancelToken;
use crate::config::RepositoryConfig;
use crate::error::{BuildError, IndexError};
use crate::index::IndexClient;
use crate::types::{BookId, CollectionEntry, CollectionId, CollectionSummary, RebuildDecision};
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::Instrument;

/// Drives the assembler over every book of a collection
#[derive(Clone)]
pub struct CollectionDriver {
    index: Arc<dyn IndexClient>,
    assembler: BookAssembler,
    book_concurrency: usize,
    cancel: CancelToken,
}

impl std::fmt::Debug for CollectionDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionDriver")
            .field("assembler", &self.assembler)
            .field("book_concurrency", &self.book_concurrency)
            .finish_non_exhaustive()
    }
}

impl CollectionDriver {
    /// Create driver
    pub fn new(
        config: &RepositoryConfig,
        index: Arc<dyn IndexClient>,
        assembler: BookAssembler,
    ) -> Self {
        Self {
            index,
            assembler,
            book_concurrency: config.tuning.book_concurrency.max(1),
            cancel: CancelToken::new(),
        }
    }

    /// Stop starting new books once `cancel` fires
    #[inline]
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The assembler used for rebuilds
    #[inline]
    #[must_use]
    pub fn assembler(&self) -> &BookAssembler {
        &self.assembler
    }

    /// Rebuild the PDFs of a collection's books
    ///
    /// With `force` every book is rebuilt; otherwise only books whose PDF
    /// datastream is missing or reported below one byte.
    ///
    /// # Errors
    /// `IndexUnavailable` if the collection cannot be enumerated,
    /// `Cancelled` if the run was cancelled. Per-book failures are
    /// reported in the summary instead.
    pub async fn process_collection(
        &self,
        collection: &CollectionId,
        force: bool,
    ) -> Result<CollectionSummary, BuildError> {
        let span = tracing::info_span!("collection", %collection);
        async {
            tracing::info!("Processing collection {} (force: {})", collection, force);
            let entries = self
                .index
                .books_in_collection(collection)
                .await
                .map_err(|e| match e {
                    IndexError::Cancelled => BuildError::Cancelled,
                    other => BuildError::IndexUnavailable(other),
                })?;
            self.process_entries(entries, force).await
        }
        .instrument(span)
        .await
    }

    /// Apply rebuild decisions to already-enumerated entries
    ///
    /// # Errors
    /// `Cancelled` if the run was cancelled.
    pub async fn process_entries(
        &self,
        entries: Vec<CollectionEntry>,
        force: bool,
    ) -> Result<CollectionSummary, BuildError> {
        let mut summary = CollectionSummary {
            total: entries.len(),
            ..CollectionSummary::default()
        };

        let mut seen = HashSet::new();
        let mut rebuilds: Vec<BookId> = Vec::new();
        for entry in entries {
            if !seen.insert(entry.book.clone()) {
                tracing::warn!("index listed {} more than once", entry.book);
                summary.total -= 1;
                continue;
            }
            match RebuildDecision::for_entry(&entry, force) {
                RebuildDecision::Rebuild(reason) => {
                    tracing::debug!("rebuilding {}: {:?}", entry.book, reason);
                    rebuilds.push(entry.book);
                }
                RebuildDecision::Skip => {
                    tracing::info!(
                        "Skipping {}: PDF present ({} bytes)",
                        entry.book,
                        entry.artifact_size.unwrap_or_default()
                    );
                    summary.skipped += 1;
                }
            }
        }

        let outcomes: Vec<(BookId, Result<_, BuildError>)> = stream::iter(rebuilds)
            .map(|book| async move {
                if self.cancel.is_cancelled() {
                    return (book, Err(BuildError::Cancelled));
                }
                let result = self.assembler.assemble(&book).await;
                (book, result)
            })
            .buffer_unordered(self.book_concurrency)
            .collect()
            .await;

        for (book, result) in outcomes {
            match result {
                Ok(artifact) => {
                    if !artifact.page_failures.is_empty() {
                        tracing::warn!(
                            "{} built with {} page problems",
                            book,
                            artifact.page_failures.len()
                        );
                    }
                    summary.rebuilt += 1;
                }
                Err(BuildError::Cancelled) => summary.failed.push(book),
                Err(e) => {
                    if e.is_skippable() {
                        tracing::warn!("Skipping {}: {}", book, e);
                    } else {
                        tracing::error!("Failed to build PDF for {}: {}", book, e);
                    }
                    if e.is_retryable() {
                        summary.retryable.push(book.clone());
                    }
                    summary.failed.push(book);
                }
            }
        }

        if self.cancel.is_cancelled() {
            return Err(BuildError::Cancelled);
        }
        tracing::info!(
            "Collection done: {} rebuilt, {} skipped, {} failed ({} retryable)",
            summary.rebuilt,
            summary.skipped,
            summary.failed.len(),
            summary.retryable.len()
        );
        Ok(summary)
    }
}
