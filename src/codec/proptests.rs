//! Property-based tests for normalization and the format codecs

use super::partition::part_sizes;
use super::{card, concat_chunks, text};
use crate::normalize::canonical_phone;
use proptest::prelude::*;

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_phone_line() -> impl Strategy<Value = String> {
    prop_oneof![
        "[0-9]{8,13}",
        "\\+[0-9]{2} [0-9]{3}-[0-9]{4}-[0-9]{3}",
        "[a-z ]{0,6}",
        "[0-9]{1,7}",
    ]
}

fn arb_text_file() -> impl Strategy<Value = String> {
    prop::collection::vec(arb_phone_line(), 0..40).prop_map(|lines| lines.join("\n"))
}

fn arb_card_file() -> impl Strategy<Value = String> {
    prop::collection::vec(("[A-Z][a-z]{1,6}", 0u8..6), 0..30).prop_map(|entries| {
        let contacts: Vec<card::Contact> = entries
            .into_iter()
            .map(|(name, n)| card::Contact {
                name,
                phone: format!("+6281100000{n}"),
            })
            .collect();
        card::render(&contacts)
    })
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn canonical_phone_shape(raw in ".{0,30}") {
        let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
        match canonical_phone(&raw) {
            None => prop_assert!(digits.len() < 8),
            Some(canonical) => {
                prop_assert_eq!(&canonical, &format!("+{digits}"));
                prop_assert_eq!(canonical_phone(&canonical), Some(canonical.clone()));
            }
        }
    }

    #[test]
    fn part_sizes_are_even_and_front_loaded(total in 0usize..500, parts in 1usize..50) {
        let sizes = part_sizes(total, parts);
        prop_assert_eq!(sizes.len(), parts);
        prop_assert_eq!(sizes.iter().sum::<usize>(), total);
        let small = total / parts;
        let large_count = sizes.iter().filter(|&&s| s == small + 1).count();
        prop_assert_eq!(large_count, total % parts);
        prop_assert!(sizes.iter().all(|&s| s == small || s == small + 1));
        prop_assert!(sizes.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn text_split_then_merge_restores_content(content in arb_text_file(), parts in 1usize..8) {
        let merged = concat_chunks(text::split(&content, parts));
        prop_assert_eq!(merged, content);
    }

    #[test]
    fn card_split_then_merge_restores_records(content in arb_card_file(), parts in 1usize..8) {
        let merged = concat_chunks(card::split(&content, parts));
        prop_assert_eq!(card::count_records(&merged), card::count_records(&content));
        prop_assert_eq!(merged, content);
    }

    #[test]
    fn text_dedupe_is_idempotent(content in arb_text_file()) {
        let (once, _) = text::dedupe(&content);
        let (twice, removed) = text::dedupe(&once);
        prop_assert!(!removed);
        prop_assert_eq!(twice, once);
    }

    #[test]
    fn card_dedupe_is_idempotent(content in arb_card_file()) {
        let (once, _) = card::dedupe(&content);
        let (twice, removed) = card::dedupe(&once);
        prop_assert!(!removed);
        prop_assert_eq!(twice, once);
    }
}
