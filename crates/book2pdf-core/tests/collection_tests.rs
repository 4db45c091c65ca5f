use book2pdf_core::{BookId, BuildError, CollectionDriver, CollectionEntry, CollectionId};
use book2pdf_test_utils::{
    dir_entries, test_config, FakeIndex, FakeRepository, Harness, RecordingConverter,
};
use pretty_assertions::assert_eq;
use std::collections::HashSet;
use tempfile::tempdir;

const COLLECTION: &str = "smith:collection";

fn entry(book: &str, present: bool, size: Option<i64>) -> CollectionEntry {
    CollectionEntry::new(BookId::new(book), present, size)
}

/// Three books: empty PDF, good PDF, no PDF; each with one page
fn library() -> (FakeIndex, FakeRepository) {
    let index = FakeIndex::new()
        .with_collection(
            COLLECTION,
            vec![
                entry("smith:b1", true, Some(0)),
                entry("smith:b2", true, Some(5000)),
                entry("smith:b3", false, None),
            ],
        )
        .with_book("smith:b1", &["smith:b1p1"])
        .with_book("smith:b2", &["smith:b2p1"])
        .with_book("smith:b3", &["smith:b3p1"]);
    let repository = FakeRepository::new()
        .with_page("smith:b1", "smith:b1p1", 1, b"1")
        .with_page("smith:b2", "smith:b2p1", 1, b"2")
        .with_page("smith:b3", "smith:b3p1", 1, b"3");
    (index, repository)
}

fn driver(harness: &Harness) -> CollectionDriver {
    CollectionDriver::new(
        &test_config(),
        harness.index.clone(),
        harness.assembler.clone(),
    )
}

fn queried(harness: &Harness) -> HashSet<String> {
    harness
        .index
        .page_queries()
        .into_iter()
        .map(|b| b.as_str().to_string())
        .collect()
}

#[tokio::test]
async fn test_rebuilds_missing_and_empty_only() {
    let output = tempdir().unwrap();
    let scratch = tempdir().unwrap();
    let (index, repository) = library();
    let harness = Harness::new(
        index,
        repository,
        RecordingConverter::new(),
        output.path(),
        scratch.path(),
    );

    let summary = driver(&harness)
        .process_collection(&CollectionId::new(COLLECTION), false)
        .await
        .unwrap();

    assert_eq!(summary.total, 3);
    assert_eq!(summary.rebuilt, 2);
    assert_eq!(summary.skipped, 1);
    assert!(summary.failed.is_empty());
    assert!(summary.retryable.is_empty());
    assert_eq!(
        queried(&harness),
        ["smith:b1".to_string(), "smith:b3".to_string()]
            .into_iter()
            .collect()
    );
    assert_eq!(
        dir_entries(output.path()),
        ["smith_b1_PDF.pdf".to_string(), "smith_b3_PDF.pdf".to_string()]
            .into_iter()
            .collect()
    );
}

#[tokio::test]
async fn test_force_rebuilds_everything() {
    let output = tempdir().unwrap();
    let scratch = tempdir().unwrap();
    let (index, repository) = library();
    let harness = Harness::new(
        index,
        repository,
        RecordingConverter::new(),
        output.path(),
        scratch.path(),
    );

    let summary = driver(&harness)
        .process_collection(&CollectionId::new(COLLECTION), true)
        .await
        .unwrap();

    assert_eq!(summary.rebuilt, 3);
    assert_eq!(summary.skipped, 0);
    assert_eq!(queried(&harness).len(), 3);
}

#[tokio::test]
async fn test_failed_book_does_not_stop_run() {
    let output = tempdir().unwrap();
    let scratch = tempdir().unwrap();
    let index = FakeIndex::new()
        .with_collection(
            COLLECTION,
            vec![
                entry("smith:empty", false, None),
                entry("smith:broken", false, None),
                entry("smith:good", false, None),
            ],
        )
        .with_book("smith:empty", &[])
        .with_book("smith:broken", &["smith:brokenp1"])
        .with_book("smith:good", &["smith:goodp1"]);
    let repository = FakeRepository::new()
        .with_missing_image("smith:broken", "smith:brokenp1", 1)
        .with_page("smith:good", "smith:goodp1", 1, b"g");
    let harness = Harness::new(
        index,
        repository,
        RecordingConverter::strict(),
        output.path(),
        scratch.path(),
    );

    let summary = driver(&harness)
        .process_collection(&CollectionId::new(COLLECTION), false)
        .await
        .unwrap();

    assert_eq!(summary.rebuilt, 1);
    let failed: HashSet<&str> = summary.failed.iter().map(BookId::as_str).collect();
    assert_eq!(failed, ["smith:empty", "smith:broken"].into_iter().collect());
    assert_eq!(summary.retryable, vec![BookId::new("smith:broken")]);
    assert!(dir_entries(output.path()).contains("smith_good_PDF.pdf"));
    assert!(dir_entries(output.path()).contains("smith_broken_PDF.pdf.partial"));
}

#[tokio::test]
async fn test_duplicate_entries_processed_once() {
    let output = tempdir().unwrap();
    let scratch = tempdir().unwrap();
    let index = FakeIndex::new()
        .with_collection(
            COLLECTION,
            vec![entry("smith:b1", false, None), entry("smith:b1", false, None)],
        )
        .with_book("smith:b1", &["smith:b1p1"]);
    let repository = FakeRepository::new().with_page("smith:b1", "smith:b1p1", 1, b"1");
    let harness = Harness::new(
        index,
        repository,
        RecordingConverter::new(),
        output.path(),
        scratch.path(),
    );

    let summary = driver(&harness)
        .process_collection(&CollectionId::new(COLLECTION), false)
        .await
        .unwrap();

    assert_eq!(summary.total, 1);
    assert_eq!(summary.rebuilt, 1);
    assert_eq!(harness.converter.calls().len(), 1);
}

#[tokio::test]
async fn test_empty_collection() {
    let output = tempdir().unwrap();
    let scratch = tempdir().unwrap();
    let harness = Harness::new(
        FakeIndex::new(),
        FakeRepository::new(),
        RecordingConverter::new(),
        output.path(),
        scratch.path(),
    );

    let summary = driver(&harness)
        .process_collection(&CollectionId::new("smith:nothing"), false)
        .await
        .unwrap();

    assert_eq!(summary.total, 0);
    assert_eq!(summary.rebuilt, 0);
}

#[tokio::test]
async fn test_collection_query_failure() {
    let output = tempdir().unwrap();
    let scratch = tempdir().unwrap();
    let harness = Harness::new(
        FakeIndex::new().unavailable(),
        FakeRepository::new(),
        RecordingConverter::new(),
        output.path(),
        scratch.path(),
    );

    let err = driver(&harness)
        .process_collection(&CollectionId::new(COLLECTION), false)
        .await
        .unwrap_err();

    assert!(matches!(err, BuildError::IndexUnavailable(_)));
}

#[tokio::test]
async fn test_cancelled_run_starts_no_books() {
    let output = tempdir().unwrap();
    let scratch = tempdir().unwrap();
    let (index, repository) = library();
    let harness = Harness::new(
        index,
        repository,
        RecordingConverter::new(),
        output.path(),
        scratch.path(),
    );
    let cancel = book2pdf_core::CancelToken::new();
    cancel.cancel();

    let err = driver(&harness)
        .with_cancel(cancel)
        .process_collection(&CollectionId::new(COLLECTION), true)
        .await
        .unwrap_err();

    assert!(matches!(err, BuildError::Cancelled));
    assert!(harness.converter.calls().is_empty());
}
