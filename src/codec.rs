//! Contact file formats
//!
//! Three formats are understood: newline-separated phone lists (`.txt`),
//! spreadsheets whose first column holds numbers (`.xlsx`) and vCard
//! contact files (`.vcf`).

pub mod card;
pub mod convert;
pub mod partition;
pub mod table;
pub mod text;

#[cfg(test)]
mod proptests;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Format of an uploaded or generated contact file, keyed by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileFormat {
    Text,
    Table,
    Card,
}

impl FileFormat {
    pub const ALL: [FileFormat; 3] = [FileFormat::Text, FileFormat::Table, FileFormat::Card];

    /// Detect the format from a file name's extension, case-insensitively.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let ext = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "txt" => Some(Self::Text),
            "xlsx" => Some(Self::Table),
            "vcf" => Some(Self::Card),
            _ => None,
        }
    }

    /// Extension including the leading dot.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Text => ".txt",
            Self::Table => ".xlsx",
            Self::Card => ".vcf",
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Spreadsheet read error: {0}")]
    SheetRead(#[from] calamine::XlsxError),
    #[error("Spreadsheet write error: {0}")]
    SheetWrite(#[from] rust_xlsxwriter::XlsxError),
    #[error("Workbook has no worksheet")]
    NoWorksheet,
    #[error("Spreadsheet exceeds the writable size")]
    TooLarge,
    #[error("Unsupported file: {0}")]
    Unsupported(String),
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Concatenate raw file contents, inserting a newline between chunks when
/// the previous chunk does not already end with one.
pub fn concat_chunks<I, S>(chunks: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = String::new();
    for chunk in chunks {
        let chunk = chunk.as_ref();
        if chunk.is_empty() {
            continue;
        }
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(chunk);
    }
    out
}

/// File stem of a user-facing name: `report.final.vcf` -> `report.final`.
pub fn file_stem(name: &str) -> &str {
    Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(name)
}
