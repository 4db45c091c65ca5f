//! Error types for book2pdf
//!
//! Provides error handling for:
//! - Search index connectivity and decoding failures
//! - Datastream fetch failures (retried when transient)
//! - Sequence number extraction failures (recovered locally)
//! - Book assembly and external conversion failures
//! - Configuration loading

use crate::types::{BookId, PageRef};
use std::path::PathBuf;

/// Terminal failure of one book assembly
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// The search index could not be queried
    #[error("index unavailable: {0}")]
    IndexUnavailable(#[from] IndexError),

    /// The book resolved to zero pages
    #[error("no pages found for {book}")]
    NoPagesFound { book: BookId },

    /// The external converter exited unsuccessfully
    #[error("conversion failed for {book} ({status}): {stderr}")]
    ConversionFailed {
        book: BookId,
        status: String,
        stderr: String,
    },

    /// The external converter could not be started
    #[error("failed to launch converter '{program}': {source}")]
    ConverterLaunch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Local filesystem error
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Cancelled
    #[error("operation cancelled")]
    Cancelled,
}

impl BuildError {
    /// Create IO error for path
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Check if a later run could plausibly succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::IndexUnavailable(e) => e.is_transient(),
            Self::ConversionFailed { .. } | Self::Io { .. } => true,
            Self::NoPagesFound { .. } | Self::ConverterLaunch { .. } | Self::Cancelled => false,
        }
    }

    /// Check if the caller should log and move on rather than treat this as a crash
    #[inline]
    #[must_use]
    pub fn is_skippable(&self) -> bool {
        matches!(self, Self::NoPagesFound { .. })
    }
}

/// Search index errors
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// Transport-level failure
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Non-success HTTP status
    #[error("index returned status {status} for {url}")]
    Status { url: String, status: u16 },

    /// Response body was not a valid result set
    #[error("malformed index response: {0}")]
    Decode(String),

    /// Cancelled
    #[error("index query cancelled")]
    Cancelled,
}

impl IndexError {
    /// Check if retrying the same query may succeed
    #[inline]
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http { .. } => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::Decode(_) | Self::Cancelled => false,
        }
    }
}

/// Datastream fetch errors
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Transport-level failure
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Non-success HTTP status
    #[error("repository returned status {status} for {url}")]
    Status { url: String, status: u16 },

    /// Local write failure
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Cancelled
    #[error("fetch cancelled")]
    Cancelled,
}

impl FetchError {
    /// Check if retrying the same fetch may succeed
    #[inline]
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http { .. } => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::Io { .. } | Self::Cancelled => false,
        }
    }
}

/// Reasons a page's sequence number could not be read
#[derive(Debug, thiserror::Error)]
pub enum SequenceError {
    /// Relationship metadata could not be fetched
    #[error("RELS-EXT unavailable: {0}")]
    Fetch(#[from] FetchError),

    /// The sequence tag is absent
    #[error("no <{tag}> element in RELS-EXT")]
    TagMissing { tag: String },

    /// The sequence tag holds something other than a u32
    #[error("invalid sequence value '{value}'")]
    InvalidValue { value: String },
}

/// Per-page failures that are recovered locally
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageFailureKind {
    /// Sequence fell back to zero
    SequenceUnresolvable,
    /// Image replaced by an empty placeholder
    PageFetchFailed,
}

/// A recovered per-page failure, reported with the assembled artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageFailure {
    /// The affected page
    pub page: PageRef,
    /// What went wrong
    pub kind: PageFailureKind,
    /// Human-readable cause
    pub reason: String,
}

impl PageFailure {
    /// Create new page failure
    #[inline]
    pub fn new(page: PageRef, kind: PageFailureKind, reason: impl Into<String>) -> Self {
        Self {
            page,
            kind,
            reason: reason.into(),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// No configuration file at path
    #[error("no configuration file found at {0}")]
    NotFound(PathBuf),

    /// Configuration file unreadable
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration file is not valid TOML for this schema
    #[error("invalid configuration in {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// Requested environment table is absent
    #[error("'{environment}' section not present in {path}")]
    MissingEnvironment { environment: String, path: PathBuf },

    /// HOME is not set
    #[error("cannot locate home directory for default configuration")]
    HomeDirUnknown,
}
