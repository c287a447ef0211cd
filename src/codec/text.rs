//! Line-delimited phone number lists

use super::partition::split_even;
use super::CodecError;
use crate::normalize::{canonical_phone, digit_token, phone_numbers};
use encoding_rs::{UTF_8, WINDOWS_1252};
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Decode uploaded text: UTF-8 first, Windows-1252 (a Latin-1 superset) when
/// the bytes are not valid UTF-8. A leading byte-order mark is dropped.
pub fn decode(bytes: &[u8]) -> String {
    let text = match UTF_8.decode_without_bom_handling_and_without_replacement(bytes) {
        Some(text) => text.into_owned(),
        None => {
            tracing::debug!("Text is not UTF-8, decoding as Windows-1252");
            WINDOWS_1252.decode_without_bom_handling(bytes).0.into_owned()
        }
    };
    match text.strip_prefix('\u{feff}') {
        Some(stripped) => stripped.to_string(),
        None => text,
    }
}

pub async fn read(path: &Path) -> Result<String, CodecError> {
    let bytes = tokio::fs::read(path).await?;
    Ok(decode(&bytes))
}

pub async fn write(path: &Path, content: &str) -> Result<(), CodecError> {
    tokio::fs::write(path, content).await?;
    Ok(())
}

/// Canonical numbers, one per valid line.
pub fn numbers(content: &str) -> Vec<String> {
    phone_numbers(content)
}

pub fn render_numbers(numbers: &[String]) -> String {
    numbers.join("\n")
}

/// Lines that survive deletion: a line is removed when any of `needles`
/// occurs in it. Blank needles are ignored.
pub fn remove_matching(content: &str, needles: &[String]) -> String {
    let needles: Vec<&str> = needles
        .iter()
        .map(|n| n.trim())
        .filter(|n| !n.is_empty())
        .collect();
    content
        .split_inclusive('\n')
        .filter(|line| {
            let line = line.trim();
            !needles.iter().any(|needle| line.contains(needle))
        })
        .collect()
}

/// Drop repeated numbers, keeping the first occurrence of each.
///
/// Lines are compared by canonical number when valid, by trimmed text
/// otherwise. Blank lines are kept as-is. Returns the new content and
/// whether anything was removed.
pub fn dedupe(content: &str) -> (String, bool) {
    let mut seen = HashSet::new();
    let mut removed = false;
    let mut out = String::with_capacity(content.len());
    for line in content.split_inclusive('\n') {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            out.push_str(line);
            continue;
        }
        let key = canonical_phone(trimmed).unwrap_or_else(|| trimmed.to_string());
        if seen.insert(key) {
            out.push_str(line);
        } else {
            removed = true;
        }
    }
    (out, removed)
}

/// Canonical numbers ordered by descending frequency, ties by ascending
/// value. Repeats are kept.
pub fn frequency_sort(content: &str) -> Vec<String> {
    let mut numbers = numbers(content);
    let mut counts: HashMap<String, usize> = HashMap::new();
    for number in &numbers {
        *counts.entry(number.clone()).or_default() += 1;
    }
    numbers.sort_by(|a, b| counts[b].cmp(&counts[a]).then_with(|| a.cmp(b)));
    numbers
}

/// Number of lines holding an 8 to 15 digit token.
pub fn count_digit_tokens(content: &str) -> usize {
    content.lines().filter_map(digit_token).count()
}

/// Split into `parts` contiguous chunks of lines.
pub fn split(content: &str, parts: usize) -> Vec<String> {
    let lines: Vec<&str> = content.split_inclusive('\n').collect();
    split_even(&lines, parts)
        .into_iter()
        .map(<[&str]>::concat)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_falls_back_to_latin() {
        assert_eq!(decode("0812345678\n".as_bytes()), "0812345678\n");
        assert_eq!(decode(b"caf\xe9 0812345678"), "café 0812345678");
        assert_eq!(decode("\u{feff}+62812345678".as_bytes()), "+62812345678");
    }

    #[test]
    fn dedupe_keeps_first_occurrence() {
        let (out, removed) = dedupe("+111\n+222\n+111\n");
        assert_eq!(out, "+111\n+222\n");
        assert!(removed);

        let (again, removed_again) = dedupe(&out);
        assert_eq!(again, out);
        assert!(!removed_again);
    }

    #[test]
    fn dedupe_matches_canonical_forms() {
        let (out, removed) = dedupe("0812-345-678\n+62 1\n0812345678\n");
        assert_eq!(out, "0812-345-678\n+62 1\n");
        assert!(removed);
    }

    #[test]
    fn remove_matching_ignores_blank_needles() {
        let content = "+62811111111\n+62822222222\n+62833333333";
        let out = remove_matching(content, &["822222".to_string(), "  ".to_string()]);
        assert_eq!(out, "+62811111111\n+62833333333");
    }

    #[test]
    fn frequency_sort_orders_by_count_then_value() {
        let content = "0833333333\n0811111111\n0833333333\n0822222222\n0811111111\n0833333333";
        assert_eq!(
            frequency_sort(content),
            vec![
                "+0833333333",
                "+0833333333",
                "+0833333333",
                "+0811111111",
                "+0811111111",
                "+0822222222",
            ]
        );
    }

    #[test]
    fn split_keeps_line_order() {
        let parts = split("a\nb\nc\nd\ne\n", 2);
        assert_eq!(parts, vec!["a\nb\nc\n", "d\ne\n"]);
    }

    #[test]
    fn counts_digit_tokens_per_line() {
        assert_eq!(count_digit_tokens("+62 812 3456\nshort 123\n0812345678901234567"), 1);
    }
}
