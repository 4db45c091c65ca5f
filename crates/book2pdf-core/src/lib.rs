//! book2pdf Core - Islandora book to PDF assembly
//!
//! Pulls the page images of a digitized book out of an Islandora/Fedora
//! repository and merges them into one page-ordered PDF:
//! - Enumerates a book's pages through the Solr index
//! - Resolves each page's sequence number from its RELS-EXT
//! - Downloads page images concurrently into scratch space
//! - Orders images and hands them to an external converter
//! - Rebuilds missing or empty PDFs across a whole collection
//!
//! # Example
//!
//! ```rust,ignore
//! use book2pdf_core::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RepositoryConfig::new(
//!     "https://compass.fivecolleges.edu/islandora/object",
//!     "http://compass-fedora-prod.fivecolleges.edu:8080/solr/collection1",
//! );
//! let index = Arc::new(SolrIndexClient::new(&config)?);
//! let repository = Arc::new(IslandoraRepository::new(&config)?);
//! let converter = Arc::new(Img2PdfConverter::from_tuning(&config.tuning));
//! let assembler = BookAssembler::new(&config, index, repository, converter);
//!
//! let artifact = assembler.assemble(&BookId::new("smith:1322496")).await?;
//! println!("wrote {}", artifact.path.display());
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

// Core modules
pub mod assembler;
pub mod cancel;
pub mod collection;
pub mod config;
pub mod converter;
pub mod error;
pub mod fetcher;
pub mod index;
pub mod repository;
pub mod retry;
pub mod sequence;
pub mod types;

// Re-exports for convenience
pub use assembler::{sort_for_conversion, BookAssembler};
pub use cancel::CancelToken;
pub use collection::CollectionDriver;
pub use config::{ConfigFile, Endpoint, EnvironmentConfig, RepositoryConfig, Tuning};
pub use converter::{ConversionOutcome, Converter, Img2PdfConverter};
pub use error::{
    BuildError, ConfigError, FetchError, IndexError, PageFailure, PageFailureKind, SequenceError,
};
pub use fetcher::PageFetcher;
pub use index::{IndexClient, SolrIndexClient};
pub use repository::{IslandoraRepository, ObjectRepository};
pub use retry::RetryPolicy;
pub use sequence::{extract_sequence, SequenceResolver};
pub use types::{
    AssembledArtifact, BookId, CollectionEntry, CollectionId, CollectionSummary, PageImage,
    PageRef, PageStatus, RebuildDecision, RebuildReason, SequenceNumber, path_safe,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with book2pdf
    pub use crate::{
        BookAssembler, BookId, BuildError, CancelToken, CollectionDriver, CollectionId,
        Img2PdfConverter, IslandoraRepository, RepositoryConfig, SolrIndexClient,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
