//! Page sequence resolution
//!
//! The sequence number lives in the page's RELS-EXT document. It is pulled
//! out with a pattern match on the named element rather than an XML parse,
//! so namespace prefixes and schema revisions elsewhere in the document do
//! not matter. Unreadable sequences fall back to zero.

use crate::error::SequenceError;
use crate::repository::{ObjectRepository, RELS_EXT};
use crate::types::{PageRef, SequenceNumber};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

/// Any element whose entire text content is an unsigned integer
static NUMERIC_ELEMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<([A-Za-z_][\w:.\-]*)>\s*([0-9]+)\s*</([A-Za-z_][\w:.\-]*)>")
        .expect("numeric element pattern is valid")
});

/// Extract the first integer enclosed by `<tag>...</tag>`
///
/// Whitespace around the digits is tolerated.
///
/// # Errors
/// `TagMissing` if no element with that name holds digits,
/// `InvalidValue` if the digits do not fit a `u32`.
pub fn extract_sequence(document: &str, tag: &str) -> Result<SequenceNumber, SequenceError> {
    let digits = NUMERIC_ELEMENT
        .captures_iter(document)
        .find(|caps| &caps[1] == tag && &caps[3] == tag)
        .and_then(|caps| caps.get(2))
        .map(|m| m.as_str())
        .ok_or_else(|| SequenceError::TagMissing {
            tag: tag.to_string(),
        })?;
    digits
        .parse::<u32>()
        .map(SequenceNumber)
        .map_err(|_| SequenceError::InvalidValue {
            value: digits.to_string(),
        })
}

/// Resolves page sequence numbers from relationship metadata
#[derive(Clone)]
pub struct SequenceResolver {
    repository: Arc<dyn ObjectRepository>,
    tag: String,
}

impl std::fmt::Debug for SequenceResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequenceResolver")
            .field("tag", &self.tag)
            .finish_non_exhaustive()
    }
}

impl SequenceResolver {
    /// Create resolver reading `tag` from each page's RELS-EXT
    pub fn new(repository: Arc<dyn ObjectRepository>, tag: impl Into<String>) -> Self {
        Self {
            repository,
            tag: tag.into(),
        }
    }

    /// Element name being matched
    #[inline]
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Resolve a page's sequence, reporting why it could not be read
    ///
    /// # Errors
    /// Any fetch or extraction failure.
    pub async fn resolve_detailed(&self, page: &PageRef) -> Result<SequenceNumber, SequenceError> {
        let document = self
            .repository
            .datastream_text(page.as_str(), RELS_EXT)
            .await?;
        extract_sequence(&document, &self.tag)
    }

    /// Resolve a page's sequence, falling back to zero on any failure
    pub async fn resolve_sequence(&self, page: &PageRef) -> SequenceNumber {
        match self.resolve_detailed(page).await {
            Ok(sequence) => sequence,
            Err(e) => {
                tracing::warn!("Failed to get sequence number for page {}: {}", page, e);
                SequenceNumber::FALLBACK
            }
        }
    }
}
