//! Planning card files from number lists
//!
//! Output naming: the requested file name's trailing number (default 1) is
//! the starting counter, and the name without that number is the base.
//!
//! | policy | inputs | output stems                   |
//! |--------|--------|--------------------------------|
//! | all    | one    | requested name as given        |
//! | all    | many   | `{base}{start + file}`         |
//! | chunk  | one    | `{base}{start + chunk}`        |
//! | chunk  | many   | `{base}{start + file}_{chunk}` |
//!
//! With several inputs, each input's contacts get a letter suffix on the
//! contact name (`Staff A`, `Staff B`, ...).

use super::card::{numbered, Contact};
use crate::normalize::{group_letter, strip_trailing_digits, trailing_number};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How many contacts go into each generated card file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitPolicy {
    /// One card file per input.
    All,
    /// Card files of at most this many contacts.
    Chunk(usize),
}

impl SplitPolicy {
    /// `all` / `semua` (any case) or a positive integer.
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if input.eq_ignore_ascii_case("all") || input.eq_ignore_ascii_case("semua") {
            return Some(Self::All);
        }
        match input.parse::<usize>() {
            Ok(n) if n > 0 => Some(Self::Chunk(n)),
            _ => None,
        }
    }
}

impl fmt::Display for SplitPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Chunk(n) => write!(f, "{n} per file"),
        }
    }
}

/// One card file to be written: stem without extension, plus its contacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardFile {
    pub stem: String,
    pub contacts: Vec<Contact>,
}

/// Batch-wide naming inputs shared by every file in one conversion.
#[derive(Debug, Clone, Copy)]
pub struct ConvertPlan<'a> {
    pub contact_name: &'a str,
    pub file_name: &'a str,
    pub policy: SplitPolicy,
    pub multiple_inputs: bool,
}

impl ConvertPlan<'_> {
    fn start(&self) -> u64 {
        trailing_number(self.file_name)
            .filter(|&n| n != 0)
            .unwrap_or(1)
    }

    fn base(&self) -> &str {
        strip_trailing_digits(self.file_name)
    }

    fn offset(&self, n: usize) -> u64 {
        self.start()
            .saturating_add(u64::try_from(n).unwrap_or(u64::MAX))
    }

    /// Card files for the `index`-th input's numbers. Empty when there are
    /// no numbers.
    pub fn files_for(&self, index: usize, numbers: &[String]) -> Vec<CardFile> {
        if numbers.is_empty() {
            return Vec::new();
        }
        let contact_name = if self.multiple_inputs {
            format!("{} {}", self.contact_name, group_letter(index))
        } else {
            self.contact_name.to_string()
        };

        match self.policy {
            SplitPolicy::All => {
                let stem = if self.multiple_inputs {
                    format!("{}{}", self.base(), self.offset(index))
                } else {
                    self.file_name.to_string()
                };
                vec![CardFile {
                    stem,
                    contacts: numbered(&contact_name, numbers, 1),
                }]
            }
            SplitPolicy::Chunk(size) => numbers
                .chunks(size.max(1))
                .enumerate()
                .map(|(chunk, batch)| {
                    let stem = if self.multiple_inputs {
                        format!("{}{}_{}", self.base(), self.offset(index), chunk + 1)
                    } else {
                        format!("{}{}", self.base(), self.offset(chunk))
                    };
                    // Contact numbering continues across chunks of one input.
                    CardFile {
                        stem,
                        contacts: numbered(&contact_name, batch, chunk * size + 1),
                    }
                })
                .collect(),
        }
    }
}
