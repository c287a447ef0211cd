//! Flows, their parameters, and chat commands

use crate::codec::convert::SplitPolicy;
use crate::codec::FileFormat;
use crate::normalize::{phone_numbers, sanitize_contact_name, sanitize_file_name};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One complete user-driven operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Flow {
    Convert,
    AdminNavy,
    Manual,
    Extract,
    AddContact,
    DeleteNumber,
    Count,
    RenameContact,
    RenameFile,
    Merge,
    Split,
    Dedupe,
    FormatNumbers,
}

impl Flow {
    pub const ALL: [Flow; 13] = [
        Flow::Convert,
        Flow::Extract,
        Flow::AdminNavy,
        Flow::Manual,
        Flow::AddContact,
        Flow::DeleteNumber,
        Flow::Merge,
        Flow::Split,
        Flow::RenameContact,
        Flow::RenameFile,
        Flow::Count,
        Flow::Dedupe,
        Flow::FormatNumbers,
    ];

    /// Primary command word, without the slash.
    pub fn command(self) -> &'static str {
        match self {
            Flow::Convert => "convert",
            Flow::AdminNavy => "admin",
            Flow::Manual => "manual",
            Flow::Extract => "extract",
            Flow::AddContact => "add",
            Flow::DeleteNumber => "delete",
            Flow::Count => "count",
            Flow::RenameContact => "rename_contact",
            Flow::RenameFile => "rename_file",
            Flow::Merge => "merge",
            Flow::Split => "split",
            Flow::Dedupe => "dedupe",
            Flow::FormatNumbers => "format",
        }
    }

    /// Older command words kept working for existing users.
    fn aliases(self) -> &'static [&'static str] {
        match self {
            Flow::AddContact => &["tambah"],
            Flow::DeleteNumber => &["hapus"],
            Flow::Count => &["jumlah"],
            Flow::RenameContact => &["rename_ctc"],
            Flow::Merge => &["gabung"],
            Flow::Split => &["pecah"],
            Flow::Dedupe => &["hapus_duplikat"],
            Flow::FormatNumbers => &["rapih"],
            _ => &[],
        }
    }

    fn description(self) -> &'static str {
        match self {
            Flow::Convert => "Convert .txt/.xlsx files to .vcf",
            Flow::AdminNavy => "Build an admin and navy .vcf",
            Flow::Manual => "Build a .vcf from typed numbers",
            Flow::Extract => "Extract numbers from .vcf to .txt",
            Flow::AddContact => "Add contacts to .vcf files",
            Flow::DeleteNumber => "Delete numbers from .txt/.xlsx files",
            Flow::Count => "Count contacts per file",
            Flow::RenameContact => "Rename contacts in .vcf files",
            Flow::RenameFile => "Rename files",
            Flow::Merge => "Merge files",
            Flow::Split => "Split files",
            Flow::Dedupe => "Remove duplicate numbers",
            Flow::FormatNumbers => "Sort numbers by frequency",
        }
    }

    /// Formats accepted as uploads. Empty for flows driven by text only.
    pub fn accepted_formats(self) -> &'static [FileFormat] {
        use FileFormat::{Card, Table, Text};
        match self {
            Flow::AdminNavy | Flow::Manual => &[],
            Flow::Convert | Flow::DeleteNumber => &[Text, Table],
            Flow::Extract | Flow::AddContact | Flow::RenameContact => &[Card],
            Flow::FormatNumbers => &[Text],
            Flow::Count | Flow::RenameFile | Flow::Merge | Flow::Split | Flow::Dedupe => {
                &FileFormat::ALL
            }
        }
    }

    pub fn accepts_uploads(self) -> bool {
        !self.accepted_formats().is_empty()
    }

    pub fn accepts(self, format: FileFormat) -> bool {
        self.accepted_formats().contains(&format)
    }

    /// Every upload must share the first upload's format.
    pub fn requires_same_format(self) -> bool {
        self == Flow::Merge
    }

    /// Text parameters collected after uploads, in order. Rename-file asks
    /// once per uploaded file instead.
    pub fn params(self) -> &'static [Param] {
        match self {
            Flow::Convert => &[Param::ContactName, Param::FileBaseName, Param::SplitPolicy],
            Flow::AdminNavy => &[
                Param::AdminNumbers,
                Param::AdminName,
                Param::NavyNumbers,
                Param::NavyName,
                Param::FileBaseName,
            ],
            Flow::Manual => &[Param::ManualNumbers, Param::ContactName, Param::FileBaseName],
            Flow::AddContact => &[Param::NewContactNumbers, Param::ContactName],
            Flow::DeleteNumber => &[Param::NumbersToRemove],
            Flow::RenameContact => &[Param::OldName, Param::NewName],
            Flow::Merge => &[Param::OutputFileName],
            Flow::Split => &[Param::PartCount],
            Flow::Extract
            | Flow::Count
            | Flow::RenameFile
            | Flow::Dedupe
            | Flow::FormatNumbers => &[],
        }
    }

    /// First message after the flow starts.
    pub fn start_prompt(self, batch_cap: usize) -> String {
        if let Some(first) = self.params().first().filter(|_| !self.accepts_uploads()) {
            return first.prompt().to_string();
        }
        let what = match self {
            Flow::RenameFile => "Send the files to rename".to_string(),
            Flow::Merge => "Send the files to merge, all in the same format".to_string(),
            Flow::AddContact => "Send the .vcf files to add contacts to".to_string(),
            _ => format!("Send {} files", format_list(self.accepted_formats())),
        };
        format!("{what} (max {batch_cap}):")
    }

    pub fn format_error(self) -> String {
        format!(
            "Unsupported format. Upload {} files.",
            format_list(self.accepted_formats())
        )
    }
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.command())
    }
}

/// `.txt`, `.txt or .xlsx`, `.txt, .xlsx or .vcf`
fn format_list(formats: &[FileFormat]) -> String {
    let names: Vec<&str> = formats.iter().map(|f| f.extension()).collect();
    match names.split_last() {
        None => String::new(),
        Some((last, [])) => (*last).to_string(),
        Some((last, rest)) => format!("{} or {last}", rest.join(", ")),
    }
}

/// A text answer a flow collects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Param {
    ContactName,
    FileBaseName,
    SplitPolicy,
    AdminNumbers,
    AdminName,
    NavyNumbers,
    NavyName,
    ManualNumbers,
    NewContactNumbers,
    NumbersToRemove,
    OldName,
    NewName,
    OutputFileName,
    PartCount,
}

/// A validated answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ParamValue {
    Text(String),
    Numbers(Vec<String>),
    Policy(SplitPolicy),
    Count(usize),
}

pub const EMPTY_NAME: &str = "Invalid input. The name cannot be empty.";
pub const NO_VALID_NUMBERS: &str = "Invalid input. Enter at least one valid number (8 or more digits).";
pub const NO_NUMBERS: &str = "Invalid input. Enter at least one number.";
pub const BAD_POLICY: &str = "Invalid input. Enter a positive number or 'all'.";
pub const BAD_PART_COUNT: &str = "Invalid input. Enter a valid number of parts.";

impl Param {
    pub fn prompt(self) -> &'static str {
        match self {
            Param::ContactName => "Enter the contact name:",
            Param::FileBaseName | Param::OutputFileName => "Enter the file name:",
            Param::SplitPolicy => "Contacts per file, or 'all':",
            Param::AdminNumbers => "Enter the admin numbers, one per line:",
            Param::AdminName => "Enter the admin contact name:",
            Param::NavyNumbers => "Enter the navy numbers, one per line:",
            Param::NavyName => "Enter the navy contact name:",
            Param::ManualNumbers => "Enter the numbers, one per line:",
            Param::NewContactNumbers => "Enter the contacts to add, one per line:",
            Param::NumbersToRemove => "Enter the numbers to delete, one per line:",
            Param::OldName => "Enter the contact name to replace:",
            Param::NewName => "Enter the new contact name:",
            Param::PartCount => "Enter the number of parts:",
        }
    }

    /// Validate and normalize an answer. The error is the reply to send.
    pub fn parse(self, input: &str) -> Result<ParamValue, &'static str> {
        match self {
            Param::ContactName | Param::AdminName | Param::NavyName | Param::OldName
            | Param::NewName => {
                let name = sanitize_contact_name(input);
                if name.is_empty() {
                    Err(EMPTY_NAME)
                } else {
                    Ok(ParamValue::Text(name))
                }
            }
            Param::FileBaseName | Param::OutputFileName => {
                let name = sanitize_file_name(input);
                if name.is_empty() {
                    Err(EMPTY_NAME)
                } else {
                    Ok(ParamValue::Text(name))
                }
            }
            Param::AdminNumbers | Param::NavyNumbers | Param::ManualNumbers
            | Param::NewContactNumbers => {
                let numbers = phone_numbers(input);
                if numbers.is_empty() {
                    Err(NO_VALID_NUMBERS)
                } else {
                    Ok(ParamValue::Numbers(numbers))
                }
            }
            Param::NumbersToRemove => {
                let needles: Vec<String> = input
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(str::to_string)
                    .collect();
                if needles.is_empty() {
                    Err(NO_NUMBERS)
                } else {
                    Ok(ParamValue::Numbers(needles))
                }
            }
            Param::SplitPolicy => SplitPolicy::parse(input)
                .map(ParamValue::Policy)
                .ok_or(BAD_POLICY),
            Param::PartCount => match input.trim().parse::<usize>() {
                Ok(n) if n > 0 => Ok(ParamValue::Count(n)),
                _ => Err(BAD_PART_COUNT),
            },
        }
    }
}

/// A slash command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Begin(Flow),
    Done,
    Status,
    ClearCache,
}

impl Command {
    /// Recognize `/word`, ignoring case, surrounding whitespace, trailing
    /// arguments and an `@botname` suffix.
    pub fn parse(text: &str) -> Option<Self> {
        let word = text.trim().strip_prefix('/')?.split_whitespace().next()?;
        let word = word.split('@').next().unwrap_or(word).to_ascii_lowercase();
        match word.as_str() {
            "start" => Some(Command::Start),
            "done" => Some(Command::Done),
            "status" => Some(Command::Status),
            "remove" => Some(Command::ClearCache),
            _ => Flow::ALL
                .into_iter()
                .find(|flow| flow.command() == word || flow.aliases().contains(&word.as_str()))
                .map(Command::Begin),
        }
    }
}

/// Greeting listing every command.
pub fn main_menu(first_name: &str) -> String {
    let mut menu = format!("Welcome {first_name}\n\nCommands:\n");
    for flow in Flow::ALL {
        menu.push_str(&format!("/{} - {}\n", flow.command(), flow.description()));
    }
    menu.push_str("/done - Finish uploading files");
    menu
}
