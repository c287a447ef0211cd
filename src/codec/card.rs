//! vCard contact files
//!
//! A record runs from a `BEGIN:VCARD` line through the matching
//! `END:VCARD` line. Records are handled as raw text so that fields this
//! module does not know about pass through untouched.

use super::partition::split_even;
use crate::normalize::{canonical_phone, digit_token};
use std::collections::HashSet;
use std::fmt::Write as _;

const BEGIN: &str = "BEGIN:VCARD";
const END: &str = "END:VCARD";

/// One generated contact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    pub name: String,
    pub phone: String,
}

/// Contacts named `"{base} 1"`, `"{base} 2"`, ... starting at `first`.
pub fn numbered(base: &str, phones: &[String], first: usize) -> Vec<Contact> {
    phones
        .iter()
        .enumerate()
        .map(|(i, phone)| Contact {
            name: format!("{base} {}", first + i),
            phone: phone.clone(),
        })
        .collect()
}

pub fn render(contacts: &[Contact]) -> String {
    let mut out = String::new();
    for contact in contacts {
        let _ = write!(
            out,
            "{BEGIN}\nVERSION:3.0\nFN:{}\nTEL:{}\n{END}\n",
            contact.name, contact.phone
        );
    }
    out
}

fn is_marker(line: &str, marker: &str) -> bool {
    line.trim().eq_ignore_ascii_case(marker)
}

/// Raw record strings, line endings included. Lines outside any record are
/// dropped; a record missing its end marker is kept as-is.
pub fn records(content: &str) -> Vec<String> {
    let mut records = Vec::new();
    let mut current: Option<String> = None;
    for line in content.split_inclusive('\n') {
        if is_marker(line, BEGIN) {
            if let Some(open) = current.take() {
                records.push(open);
            }
            current = Some(line.to_string());
        } else if let Some(record) = current.as_mut() {
            record.push_str(line);
            if is_marker(line, END) {
                records.extend(current.take());
            }
        }
    }
    records.extend(current);
    records
}

/// Record count, by begin markers.
pub fn count_records(content: &str) -> usize {
    content.lines().filter(|line| is_marker(line, BEGIN)).count()
}

/// Every 8 to 15 digit token found on any line.
pub fn extract_numbers(content: &str) -> Vec<String> {
    content.lines().filter_map(digit_token).collect()
}

pub fn count_digit_tokens(content: &str) -> usize {
    content.lines().filter_map(digit_token).count()
}

/// Property name of a content line, without parameters: `TEL;TYPE=CELL:..` -> `TEL`.
fn property(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once(':')?;
    let name = key.split(';').next().unwrap_or(key).trim();
    Some((name, value))
}

/// Canonical form of the record's first phone field.
pub fn first_phone(record: &str) -> Option<String> {
    record.lines().find_map(|line| match property(line) {
        Some((name, value)) if name.eq_ignore_ascii_case("TEL") => canonical_phone(value),
        _ => None,
    })
}

/// Drop records whose first phone number was already seen. Records without
/// a phone field are kept. Returns the new content and whether any record
/// was removed.
pub fn dedupe(content: &str) -> (String, bool) {
    let records = records(content);
    let before = records.len();
    let mut seen = HashSet::new();
    let kept: Vec<String> = records
        .into_iter()
        .filter(|record| first_phone(record).map_or(true, |phone| seen.insert(phone)))
        .collect();
    let removed = kept.len() < before;
    (kept.concat(), removed)
}

/// Replace `old` with `new` inside name fields (`FN`, `N`) only.
/// Returns the new content and how many lines changed.
pub fn rename(content: &str, old: &str, new: &str) -> (String, usize) {
    if old.is_empty() {
        return (content.to_string(), 0);
    }
    let mut changed = 0;
    let mut out = String::with_capacity(content.len());
    for line in content.split_inclusive('\n') {
        let is_name = property(line).is_some_and(|(name, value)| {
            (name.eq_ignore_ascii_case("FN") || name.eq_ignore_ascii_case("N"))
                && value.contains(old)
        });
        match (is_name, line.split_once(':')) {
            (true, Some((key, value))) => {
                changed += 1;
                out.push_str(key);
                out.push(':');
                out.push_str(&value.replace(old, new));
            }
            _ => out.push_str(line),
        }
    }
    (out, changed)
}

/// New cards ahead of the existing content.
pub fn prepend(new_cards: &str, existing: &str) -> String {
    super::concat_chunks([new_cards, existing])
}

/// Split into `parts` contiguous groups of records.
pub fn split(content: &str, parts: usize) -> Vec<String> {
    let records = records(content);
    split_even(&records, parts)
        .into_iter()
        .map(<[String]>::concat)
        .collect()
}
