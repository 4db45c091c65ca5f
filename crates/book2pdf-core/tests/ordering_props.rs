use book2pdf_core::{sort_for_conversion, PageImage, PageRef, PageStatus, SequenceNumber};
use proptest::prelude::*;
use std::path::PathBuf;

fn image(sequence: u32, page: &str) -> PageImage {
    let page = PageRef::new(page);
    let sequence = SequenceNumber(sequence);
    PageImage {
        path: PathBuf::from("scratch").join(PageImage::file_name(&page, sequence)),
        page,
        sequence,
        status: PageStatus::Fetched { bytes: 1 },
    }
}

fn page_id() -> impl Strategy<Value = String> {
    "[a-z]{1,6}:[0-9a-z_./-]{1,8}"
}

proptest! {
    #[test]
    fn prop_conversion_order_is_sequence_then_page(
        pages in proptest::collection::vec((any::<u32>(), page_id()), 0..40),
        seed in any::<u64>(),
    ) {
        let mut images: Vec<PageImage> = pages.iter().map(|(s, p)| image(*s, p)).collect();

        let mut expected: Vec<(u32, String)> = pages.clone();
        expected.sort();

        // deterministic shuffle
        let mut state = seed | 1;
        for i in (1..images.len()).rev() {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            let j = (state % (i as u64 + 1)) as usize;
            images.swap(i, j);
        }

        sort_for_conversion(&mut images);
        let actual: Vec<(u32, String)> = images
            .iter()
            .map(|i| (i.sequence.0, i.page.as_str().to_string()))
            .collect();
        prop_assert_eq!(actual, expected);
    }

    #[test]
    fn prop_file_names_are_single_components(
        sequence in any::<u32>(),
        page in "[a-z]{1,6}:[ -~]{1,12}",
    ) {
        let name = PageImage::file_name(&PageRef::new(page), SequenceNumber(sequence));
        prop_assert_eq!(std::path::Path::new(&name).components().count(), 1);
    }

    #[test]
    fn prop_render_is_fixed_width_below_million(n in 0..1_000_000u32) {
        let rendered = SequenceNumber(n).render();
        prop_assert_eq!(rendered.len(), SequenceNumber::RENDER_WIDTH);
        prop_assert_eq!(rendered.parse::<u32>().unwrap(), n);
    }
}

#[test]
fn test_identifier_prefix_sorts_first() {
    let mut images = vec![image(0, "a:1-x"), image(0, "a:1")];
    sort_for_conversion(&mut images);
    let order: Vec<&str> = images.iter().map(|i| i.page.as_str()).collect();
    assert_eq!(order, vec!["a:1", "a:1-x"]);
}

#[test]
fn test_seven_digit_sequence_sorts_last() {
    let mut images = vec![image(1_000_000, "a:1"), image(999_999, "a:2")];
    sort_for_conversion(&mut images);
    let order: Vec<u32> = images.iter().map(|i| i.sequence.0).collect();
    assert_eq!(order, vec![999_999, 1_000_000]);
}

#[test]
fn test_unresolved_pages_sort_before_page_one() {
    let mut images = vec![
        image(1, "smith:first"),
        image(SequenceNumber::FALLBACK.0, "smith:zzz"),
    ];
    sort_for_conversion(&mut images);
    assert_eq!(images[0].page.as_str(), "smith:zzz");
}
