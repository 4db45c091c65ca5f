//! Testing utilities for book2pdf workspace
//!
//! In-memory stand-ins for the search index, the object repository and the
//! external converter.

#![allow(missing_docs)]

use book2pdf_core::{
    BookAssembler, BookId, BuildError, CollectionEntry, CollectionId, ConversionOutcome,
    Converter, FetchError, IndexClient, IndexError, ObjectRepository, PageRef, RepositoryConfig,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// RELS-EXT document declaring `sequence` for `pid`
pub fn rels_ext(pid: &str, book: &str, sequence: u32) -> String {
    format!(
        r#"<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#" xmlns:islandora="http://islandora.ca/ontology/relsext#">
  <rdf:Description rdf:about="info:fedora/{pid}">
    <islandora:isPageOf rdf:resource="info:fedora/{book}"/>
    <islandora:isSequenceNumber>{sequence}</islandora:isSequenceNumber>
    <islandora:isPageNumber>{sequence}</islandora:isPageNumber>
  </rdf:Description>
</rdf:RDF>"#
    )
}

/// Index with fixed page and collection listings
#[derive(Debug, Default)]
pub struct FakeIndex {
    pages: HashMap<BookId, Vec<PageRef>>,
    collections: HashMap<CollectionId, Vec<CollectionEntry>>,
    unavailable: bool,
    page_queries: Mutex<Vec<BookId>>,
}

impl FakeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_book(mut self, book: &str, pages: &[&str]) -> Self {
        self.pages.insert(
            BookId::new(book),
            pages.iter().map(|p| PageRef::new(*p)).collect(),
        );
        self
    }

    pub fn with_collection(mut self, collection: &str, entries: Vec<CollectionEntry>) -> Self {
        self.collections.insert(CollectionId::new(collection), entries);
        self
    }

    /// Every query fails with a 503
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    /// Books whose pages were requested, in call order
    pub fn page_queries(&self) -> Vec<BookId> {
        self.page_queries.lock().clone()
    }

    fn check(&self) -> Result<(), IndexError> {
        if self.unavailable {
            return Err(IndexError::Status {
                url: "fake://solr/select".to_string(),
                status: 503,
            });
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl IndexClient for FakeIndex {
    async fn pages_of(&self, book: &BookId) -> Result<Vec<PageRef>, IndexError> {
        self.check()?;
        self.page_queries.lock().push(book.clone());
        Ok(self.pages.get(book).cloned().unwrap_or_default())
    }

    async fn books_in_collection(
        &self,
        collection: &CollectionId,
    ) -> Result<Vec<CollectionEntry>, IndexError> {
        self.check()?;
        Ok(self.collections.get(collection).cloned().unwrap_or_default())
    }
}

/// Repository serving RELS-EXT documents and image bytes from memory
#[derive(Debug, Default)]
pub struct FakeRepository {
    rels_ext: HashMap<String, String>,
    images: HashMap<String, Vec<u8>>,
}

impl FakeRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Page with a readable sequence number and an image
    pub fn with_page(mut self, book: &str, pid: &str, sequence: u32, image: &[u8]) -> Self {
        self.rels_ext
            .insert(pid.to_string(), rels_ext(pid, book, sequence));
        self.images.insert(pid.to_string(), image.to_vec());
        self
    }

    /// Page whose RELS-EXT cannot be fetched
    pub fn with_unresolvable_page(mut self, pid: &str, image: &[u8]) -> Self {
        self.images.insert(pid.to_string(), image.to_vec());
        self
    }

    /// Page whose RELS-EXT exists but carries no sequence element
    pub fn with_untagged_page(mut self, pid: &str, image: &[u8]) -> Self {
        self.rels_ext
            .insert(pid.to_string(), "<rdf:RDF></rdf:RDF>".to_string());
        self.images.insert(pid.to_string(), image.to_vec());
        self
    }

    /// Page whose image cannot be fetched
    pub fn with_missing_image(mut self, book: &str, pid: &str, sequence: u32) -> Self {
        self.rels_ext
            .insert(pid.to_string(), rels_ext(pid, book, sequence));
        self
    }

    fn not_found(pid: &str, dsid: &str) -> FetchError {
        FetchError::Status {
            url: format!("fake://islandora/{pid}/datastream/{dsid}/view"),
            status: 404,
        }
    }
}

#[async_trait::async_trait]
impl ObjectRepository for FakeRepository {
    async fn datastream_text(&self, pid: &str, dsid: &str) -> Result<String, FetchError> {
        self.rels_ext
            .get(pid)
            .cloned()
            .ok_or_else(|| Self::not_found(pid, dsid))
    }

    async fn download_datastream(
        &self,
        pid: &str,
        dsid: &str,
        dest: &Path,
    ) -> Result<u64, FetchError> {
        let bytes = self
            .images
            .get(pid)
            .ok_or_else(|| Self::not_found(pid, dsid))?;
        tokio::fs::write(dest, bytes)
            .await
            .map_err(|source| FetchError::Io {
                path: dest.to_path_buf(),
                source,
            })?;
        Ok(bytes.len() as u64)
    }
}

/// One recorded converter invocation
#[derive(Debug, Clone)]
pub struct ConversionCall {
    /// Input paths, in the order given
    pub inputs: Vec<PathBuf>,
    /// Input file names, in the order given
    pub file_names: Vec<String>,
    /// Size of each input at call time
    pub sizes: Vec<u64>,
    /// Output path given to the converter
    pub output: PathBuf,
}

/// Converter that concatenates its inputs and records every call
#[derive(Debug, Default)]
pub struct RecordingConverter {
    calls: Mutex<Vec<ConversionCall>>,
    fail_all: bool,
    fail_on_empty_input: bool,
}

impl RecordingConverter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exit non-zero on every call, after writing partial output
    pub fn failing() -> Self {
        Self {
            fail_all: true,
            ..Self::default()
        }
    }

    /// Exit non-zero when any input image is empty, like img2pdf does
    pub fn strict() -> Self {
        Self {
            fail_on_empty_input: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<ConversionCall> {
        self.calls.lock().clone()
    }
}

#[async_trait::async_trait]
impl Converter for RecordingConverter {
    fn name(&self) -> &str {
        "recording"
    }

    async fn convert(
        &self,
        inputs: &[PathBuf],
        output: &Path,
    ) -> Result<ConversionOutcome, BuildError> {
        let mut body = Vec::new();
        let mut sizes = Vec::with_capacity(inputs.len());
        for input in inputs {
            let bytes = std::fs::read(input).map_err(|source| BuildError::io(input, source))?;
            sizes.push(bytes.len() as u64);
            body.extend_from_slice(&bytes);
        }
        self.calls.lock().push(ConversionCall {
            inputs: inputs.to_vec(),
            file_names: inputs
                .iter()
                .filter_map(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned())
                .collect(),
            sizes: sizes.clone(),
            output: output.to_path_buf(),
        });

        if self.fail_all || (self.fail_on_empty_input && sizes.contains(&0)) {
            std::fs::write(output, b"%PDF-partial").map_err(|source| BuildError::io(output, source))?;
            return Ok(ConversionOutcome::failed(
                "exit status: 1",
                "error: cannot read input image",
            ));
        }

        let mut pdf = b"%PDF-1.4\n".to_vec();
        pdf.extend_from_slice(&body);
        std::fs::write(output, pdf).map_err(|source| BuildError::io(output, source))?;
        Ok(ConversionOutcome::succeeded())
    }
}

/// Fakes wired into an assembler writing into `output_dir`
pub struct Harness {
    pub index: Arc<FakeIndex>,
    pub repository: Arc<FakeRepository>,
    pub converter: Arc<RecordingConverter>,
    pub assembler: BookAssembler,
}

impl Harness {
    pub fn new(
        index: FakeIndex,
        repository: FakeRepository,
        converter: RecordingConverter,
        output_dir: &Path,
        scratch_root: &Path,
    ) -> Self {
        let config = test_config();
        let index = Arc::new(index);
        let repository = Arc::new(repository);
        let converter = Arc::new(converter);
        let assembler = BookAssembler::new(
            &config,
            index.clone(),
            repository.clone(),
            converter.clone(),
        )
        .with_output_dir(output_dir)
        .with_scratch_root(scratch_root);
        Self {
            index,
            repository,
            converter,
            assembler,
        }
    }
}

/// Configuration pointing at nowhere, with retries disabled
pub fn test_config() -> RepositoryConfig {
    let mut config = RepositoryConfig::new("fake://islandora", "fake://solr");
    config.tuning.max_attempts = 1;
    config.tuning.initial_backoff_ms = 0;
    config
}

/// Entries present in `dir`
pub fn dir_entries(dir: &Path) -> HashSet<String> {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default()
}
