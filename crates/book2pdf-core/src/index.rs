//! Search index client
//!
//! Read-only queries against the Solr core that indexes Fedora objects:
//! - page children of a book (`RELS_EXT_isPageOf_uri_s`)
//! - book members of a collection with PDF datastream presence and size
//!
//! Results are paged with `start`/`rows` until `numFound` documents are
//! read. The index is eventually consistent, so a shortfall is logged
//! rather than treated as an error.

use crate::cancel::CancelToken;
use crate::config::RepositoryConfig;
use crate::error::IndexError;
use crate::retry::RetryPolicy;
use crate::types::{BookId, CollectionEntry, CollectionId, PageRef};
use serde::Deserialize;
use serde_json::{Map, Value};

/// Identifier field of every Fedora document
pub const PID_FIELD: &str = "PID";

/// Multi-valued list of datastream ids
pub const DATASTREAMS_FIELD: &str = "fedora_datastreams_ms";

/// Content model of book objects
pub const BOOK_MODEL: &str = "islandora:bookCModel";

/// Query access to the search index
#[async_trait::async_trait]
pub trait IndexClient: Send + Sync {
    /// All pages whose "is page of" relation targets `book`, in index order
    async fn pages_of(&self, book: &BookId) -> Result<Vec<PageRef>, IndexError>;

    /// All book objects that are members of `collection`
    async fn books_in_collection(
        &self,
        collection: &CollectionId,
    ) -> Result<Vec<CollectionEntry>, IndexError>;
}

/// Solr query for the pages of a book
#[must_use]
pub fn pages_query(book: &BookId) -> String {
    format!("RELS_EXT_isPageOf_uri_s:\"info:fedora/{book}\"")
}

/// Solr query for the books of a collection
#[must_use]
pub fn collection_query(collection: &CollectionId) -> String {
    format!(
        "RELS_EXT_isMemberOfCollection_uri_s:\"info:fedora/{collection}\" AND RELS_EXT_hasModel_uri_s:\"info:fedora/{BOOK_MODEL}\""
    )
}

/// Size field of the latest version of a datastream
#[must_use]
pub fn datastream_size_field(dsid: &str) -> String {
    format!("fedora_datastream_latest_{dsid}_SIZE_ms")
}

#[derive(Debug, Deserialize)]
struct SelectEnvelope {
    response: SelectResponse,
}

#[derive(Debug, Deserialize)]
struct SelectResponse {
    #[serde(rename = "numFound")]
    num_found: usize,
    #[serde(default)]
    docs: Vec<Map<String, Value>>,
}

/// HTTP client for `{solr_url}/select`
#[derive(Debug, Clone)]
pub struct SolrIndexClient {
    client: reqwest::Client,
    select_url: String,
    page_size: usize,
    artifact_datastream: String,
    retry: RetryPolicy,
    cancel: CancelToken,
}

impl SolrIndexClient {
    /// Create index client from configuration
    ///
    /// # Errors
    /// Returns the underlying error if the HTTP client cannot be built.
    pub fn new(config: &RepositoryConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self::with_client(client, config))
    }

    /// Create index client sharing an existing HTTP client
    #[must_use]
    pub fn with_client(client: reqwest::Client, config: &RepositoryConfig) -> Self {
        Self {
            client,
            select_url: format!("{}/select", config.solr_url),
            page_size: config.tuning.index_page_size.max(1),
            artifact_datastream: config.tuning.artifact_datastream.clone(),
            retry: RetryPolicy::from_tuning(&config.tuning),
            cancel: CancelToken::new(),
        }
    }

    /// Honor `cancel` on every query
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

    async fn select_once(
        &self,
        query: &str,
        fields: &str,
        start: usize,
    ) -> Result<SelectResponse, IndexError> {
        let params = [
            ("q", query.to_string()),
            ("fl", fields.to_string()),
            ("wt", "json".to_string()),
            ("rows", self.page_size.to_string()),
            ("start", start.to_string()),
        ];
        let response = self
            .client
            .get(&self.select_url)
            .query(&params)
            .send()
            .await
            .map_err(|source| IndexError::Http {
                url: self.select_url.clone(),
                source,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(IndexError::Status {
                url: self.select_url.clone(),
                status: status.as_u16(),
            });
        }
        let body = response.text().await.map_err(|source| IndexError::Http {
            url: self.select_url.clone(),
            source,
        })?;
        serde_json::from_str::<SelectEnvelope>(&body)
            .map(|envelope| envelope.response)
            .map_err(|e| IndexError::Decode(e.to_string()))
    }

    async fn select(
        &self,
        query: &str,
        fields: &str,
        start: usize,
    ) -> Result<SelectResponse, IndexError> {
        let attempt = self
            .retry
            .run(&self.select_url, || self.select_once(query, fields, start));
        self.cancel
            .run(attempt)
            .await
            .unwrap_or(Err(IndexError::Cancelled))
    }

    /// Read every document matching `query`
    async fn select_all(
        &self,
        query: &str,
        fields: &str,
    ) -> Result<Vec<Map<String, Value>>, IndexError> {
        let mut docs = Vec::new();
        loop {
            let page = self.select(query, fields, docs.len()).await?;
            let received = page.docs.len();
            let num_found = page.num_found;
            docs.extend(page.docs);
            if docs.len() >= num_found {
                break;
            }
            if received == 0 {
                tracing::warn!(
                    "index reported {} matches for {} but stopped yielding after {}",
                    num_found,
                    query,
                    docs.len()
                );
                break;
            }
            tracing::debug!("read {}/{} index documents", docs.len(), num_found);
        }
        Ok(docs)
    }
}

#[async_trait::async_trait]
impl IndexClient for SolrIndexClient {
    async fn pages_of(&self, book: &BookId) -> Result<Vec<PageRef>, IndexError> {
        let docs = self.select_all(&pages_query(book), PID_FIELD).await?;
        Ok(docs.iter().filter_map(|doc| pid_of(doc).map(PageRef::new)).collect())
    }

    async fn books_in_collection(
        &self,
        collection: &CollectionId,
    ) -> Result<Vec<CollectionEntry>, IndexError> {
        let size_field = datastream_size_field(&self.artifact_datastream);
        let fields = format!("{PID_FIELD},{DATASTREAMS_FIELD},{size_field}");
        let docs = self
            .select_all(&collection_query(collection), &fields)
            .await?;
        Ok(docs
            .iter()
            .filter_map(|doc| collection_entry(doc, &self.artifact_datastream, &size_field))
            .collect())
    }
}

/// Identifier of an index document; documents without one are skipped
fn pid_of(doc: &Map<String, Value>) -> Option<&str> {
    let pid = doc.get(PID_FIELD).and_then(first_scalar).and_then(Value::as_str);
    if pid.is_none() {
        tracing::warn!("index document without {}: {:?}", PID_FIELD, doc);
    }
    pid
}

/// Build a collection entry from an index document
pub(crate) fn collection_entry(
    doc: &Map<String, Value>,
    artifact_datastream: &str,
    size_field: &str,
) -> Option<CollectionEntry> {
    let book = BookId::new(pid_of(doc)?);
    let artifact_present = match doc.get(DATASTREAMS_FIELD) {
        Some(Value::Array(items)) => items
            .iter()
            .any(|item| item.as_str() == Some(artifact_datastream)),
        Some(Value::String(item)) => item == artifact_datastream,
        _ => false,
    };
    let artifact_size = doc.get(size_field).and_then(parse_size);
    Some(CollectionEntry::new(book, artifact_present, artifact_size))
}

/// First element of a multi-valued field, or the value itself
fn first_scalar(value: &Value) -> Option<&Value> {
    match value {
        Value::Array(items) => items.first(),
        other => Some(other),
    }
}

/// Parse a size reported as number, numeric string, or list of either
pub(crate) fn parse_size(value: &Value) -> Option<i64> {
    match first_scalar(value)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn queries_target_fedora_uris() {
        assert_eq!(
            pages_query(&BookId::new("smith:1322496")),
            "RELS_EXT_isPageOf_uri_s:\"info:fedora/smith:1322496\""
        );
        let q = collection_query(&CollectionId::new("smith:books"));
        assert!(q.contains("isMemberOfCollection_uri_s:\"info:fedora/smith:books\""));
        assert!(q.contains("info:fedora/islandora:bookCModel"));
        assert_eq!(
            datastream_size_field("PDF"),
            "fedora_datastream_latest_PDF_SIZE_ms"
        );
    }

    #[test]
    fn parse_size_accepts_solr_shapes() {
        assert_eq!(parse_size(&json!(["5000"])), Some(5000));
        assert_eq!(parse_size(&json!([5000])), Some(5000));
        assert_eq!(parse_size(&json!("0")), Some(0));
        assert_eq!(parse_size(&json!(-1)), Some(-1));
        assert_eq!(parse_size(&json!("12.0")), Some(12));
        assert_eq!(parse_size(&json!([])), None);
        assert_eq!(parse_size(&json!("n/a")), None);
        assert_eq!(parse_size(&json!(null)), None);
    }

    #[test]
    fn collection_entry_with_pdf() {
        let size_field = datastream_size_field("PDF");
        let d = doc(json!({
            "PID": "smith:1",
            "fedora_datastreams_ms": ["RELS-EXT", "PDF", "TN"],
            "fedora_datastream_latest_PDF_SIZE_ms": ["5000"],
        }));
        let entry = collection_entry(&d, "PDF", &size_field).unwrap();
        assert_eq!(entry.book, BookId::new("smith:1"));
        assert!(entry.artifact_present);
        assert_eq!(entry.artifact_size, Some(5000));
    }

    #[test]
    fn collection_entry_without_pdf() {
        let size_field = datastream_size_field("PDF");
        let d = doc(json!({
            "PID": "smith:2",
            "fedora_datastreams_ms": ["RELS-EXT", "TN"],
        }));
        let entry = collection_entry(&d, "PDF", &size_field).unwrap();
        assert!(!entry.artifact_present);
        assert_eq!(entry.artifact_size, None);
    }

    #[test]
    fn document_without_pid_is_skipped() {
        let d = doc(json!({ "fedora_datastreams_ms": ["PDF"] }));
        assert!(collection_entry(&d, "PDF", "x").is_none());
    }

    #[test]
    fn envelope_decodes() {
        let body = r#"{"responseHeader":{"status":0},"response":{"numFound":2,"start":0,"docs":[{"PID":"a:1"},{"PID":"a:2"}]}}"#;
        let envelope: SelectEnvelope = serde_json::from_str(body).unwrap();
        assert_eq!(envelope.response.num_found, 2);
        assert_eq!(envelope.response.docs.len(), 2);
        assert_eq!(pid_of(&envelope.response.docs[1]), Some("a:2"));
    }
}
