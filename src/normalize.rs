//! Phone number, file name and contact name normalization

use regex::Regex;
use std::sync::LazyLock;

/// Fewest digits a string needs to count as a phone number.
pub const MIN_PHONE_DIGITS: usize = 8;

/// Bounds for digit tokens scraped from card files and counted per line.
const TOKEN_DIGITS: std::ops::RangeInclusive<usize> = 8..=15;

static UNSAFE_NAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[\\/:*?"<>|]"#).expect("valid regex"));

static TRAILING_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\D*$").expect("valid regex"));

fn digits(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}

/// Canonicalize a phone number: every non-digit is dropped, fewer than
/// eight remaining digits is invalid, otherwise the digits get a `+` prefix.
pub fn canonical_phone(raw: &str) -> Option<String> {
    let digits = digits(raw);
    if digits.len() < MIN_PHONE_DIGITS {
        return None;
    }
    Some(format!("+{digits}"))
}

/// Canonical numbers from newline-separated text, invalid lines dropped.
pub fn phone_numbers(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| canonical_phone(line.trim()))
        .collect()
}

/// Digits of a line when they form an 8 to 15 digit token.
///
/// Looser than [`canonical_phone`]: no `+` prefix, and field labels or
/// punctuation on the line are ignored.
pub fn digit_token(line: &str) -> Option<String> {
    let digits = digits(line);
    TOKEN_DIGITS.contains(&digits.len()).then_some(digits)
}

/// Replace characters that are unsafe in file names with `_`.
pub fn sanitize_file_name(name: &str) -> String {
    UNSAFE_NAME_CHARS.replace_all(name.trim(), "_").into_owned()
}

/// Contact names follow the same character rules as file names.
pub fn sanitize_contact_name(name: &str) -> String {
    sanitize_file_name(name)
}

/// Last run of digits in a name, e.g. `batch12` -> 12.
pub fn trailing_number(name: &str) -> Option<u64> {
    TRAILING_NUMBER
        .captures(name)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Drop a trailing digit run and surrounding whitespace: `Team 07` -> `Team`.
pub fn strip_trailing_digits(name: &str) -> &str {
    name.trim_end_matches(|c: char| c.is_ascii_digit()).trim()
}

/// Single-letter group suffix for the n-th input file (A, B, C, ...).
pub fn group_letter(index: usize) -> char {
    const LETTERS: &[u8; 26] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    char::from(LETTERS[index % LETTERS.len()])
}
