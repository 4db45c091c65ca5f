//! Core types for book2pdf
//!
//! Defines the fundamental types shared by every component:
//! - Repository identifiers (books, collections, pages)
//! - Page sequence numbers and their sortable rendering
//! - Materialized page images and assembled artifacts
//! - Collection entries and rebuild decisions

use crate::error::PageFailure;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Identifier of a book object (e.g. `smith:1322496`)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookId(String);

impl BookId {
    /// Create book identifier
    #[inline]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Raw identifier
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name of the PDF generated for this book
    ///
    /// Namespace separators are replaced so the name is filesystem-safe:
    /// `smith:1322496` becomes `smith_1322496_PDF.pdf`.
    #[must_use]
    pub fn artifact_file_name(&self) -> String {
        format!("{}_PDF.pdf", path_safe(&self.0).replace(':', "_"))
    }
}

impl std::fmt::Display for BookId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Escape an identifier for use as one path component
///
/// `%`, `/`, `\` and NUL are percent-encoded, so distinct identifiers keep
/// distinct names.
#[must_use]
pub fn path_safe(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    for c in id.chars() {
        match c {
            '%' => out.push_str("%25"),
            '/' => out.push_str("%2F"),
            '\\' => out.push_str("%5C"),
            '\0' => out.push_str("%00"),
            other => out.push(other),
        }
    }
    out
}

/// Identifier of a collection object
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectionId(String);

impl CollectionId {
    /// Create collection identifier
    #[inline]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Raw identifier
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CollectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a page object belonging to exactly one book
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageRef(String);

impl PageRef {
    /// Create page reference
    #[inline]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Raw identifier
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Declared ordinal position of a page within its book
///
/// Not unique, not contiguous. Zero is both a legal value and the fallback
/// for pages whose metadata cannot be read, so such pages sort first.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SequenceNumber(pub u32);

impl SequenceNumber {
    /// Fallback for unresolvable pages
    pub const FALLBACK: Self = Self(0);

    /// Width of the zero-padded rendering
    pub const RENDER_WIDTH: usize = 6;

    /// Zero-padded rendering, at least six digits wide
    ///
    /// Values of 1,000,000 and above render wider; conversion order comes
    /// from [`PageImage::order_key`], not from the rendered name.
    #[must_use]
    pub fn render(self) -> String {
        format!("{:0width$}", self.0, width = Self::RENDER_WIDTH)
    }
}

impl std::fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of fetching one page image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageStatus {
    /// Image bytes written
    Fetched {
        /// Bytes written
        bytes: u64,
    },
    /// Fetch failed; an empty placeholder stands in for the page
    Placeholder,
}

/// A page image materialized in the assembly's scratch directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    /// Page object
    pub page: PageRef,
    /// Resolved sequence number
    pub sequence: SequenceNumber,
    /// Location in scratch space
    pub path: PathBuf,
    /// Fetch outcome
    pub status: PageStatus,
}

impl PageImage {
    /// Scratch file name: `{sequence:06}-{page}.jpg`, page escaped by [`path_safe`]
    #[must_use]
    pub fn file_name(page: &PageRef, sequence: SequenceNumber) -> String {
        format!("{}-{}.jpg", sequence.render(), path_safe(page.as_str()))
    }

    /// Conversion order key
    #[inline]
    #[must_use]
    pub fn order_key(&self) -> (SequenceNumber, &str) {
        (self.sequence, self.page.as_str())
    }
}

/// The PDF produced for one book
#[derive(Debug, Clone)]
pub struct AssembledArtifact {
    /// Book the artifact belongs to
    pub book: BookId,
    /// Final location of the PDF
    pub path: PathBuf,
    /// Number of pages fed to the converter
    pub page_count: usize,
    /// Page-level failures recovered during assembly
    pub page_failures: Vec<PageFailure>,
}

/// A book listed in a collection with the state of its PDF datastream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionEntry {
    /// Book object
    pub book: BookId,
    /// Whether the index lists a PDF datastream
    pub artifact_present: bool,
    /// Reported size of the PDF datastream, if any
    pub artifact_size: Option<i64>,
}

impl CollectionEntry {
    /// Create new collection entry
    #[inline]
    pub fn new(book: BookId, artifact_present: bool, artifact_size: Option<i64>) -> Self {
        Self {
            book,
            artifact_present,
            artifact_size,
        }
    }
}

/// Why a book is rebuilt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RebuildReason {
    /// Force flag set
    Forced,
    /// No PDF datastream
    ArtifactMissing,
    /// PDF datastream reported below one byte
    ArtifactTooSmall,
}

/// Whether a collection entry needs its PDF rebuilt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RebuildDecision {
    /// Assemble the book
    Rebuild(RebuildReason),
    /// Leave the existing PDF alone
    Skip,
}

impl RebuildDecision {
    /// Smallest datastream size considered a real PDF
    pub const MIN_ARTIFACT_SIZE: i64 = 1;

    /// Decide for an entry; rules are evaluated in order
    #[must_use]
    pub fn for_entry(entry: &CollectionEntry, force: bool) -> Self {
        if force {
            return Self::Rebuild(RebuildReason::Forced);
        }
        if !entry.artifact_present {
            return Self::Rebuild(RebuildReason::ArtifactMissing);
        }
        match entry.artifact_size {
            Some(size) if size >= Self::MIN_ARTIFACT_SIZE => Self::Skip,
            _ => Self::Rebuild(RebuildReason::ArtifactTooSmall),
        }
    }

    /// Check if the book will be assembled
    #[inline]
    #[must_use]
    pub fn is_rebuild(&self) -> bool {
        matches!(self, Self::Rebuild(_))
    }
}

/// Result of a collection run
#[derive(Debug, Clone, Default)]
pub struct CollectionSummary {
    /// Entries returned by the index
    pub total: usize,
    /// Books assembled successfully
    pub rebuilt: usize,
    /// Books left as they were
    pub skipped: usize,
    /// Books whose assembly failed
    pub failed: Vec<BookId>,
    /// Subset of `failed` that a later run could plausibly build
    pub retryable: Vec<BookId>,
}
