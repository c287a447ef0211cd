//! Effects produced by state transitions

use super::state::{UploadedFile, UserIdentity};
use crate::codec::convert::SplitPolicy;
use crate::codec::FileFormat;
use std::path::PathBuf;

/// Effects to be executed by the runtime
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Send a text message to the user's chat
    Reply(String),
    /// Delete cached files
    DiscardUploads(Vec<PathBuf>),
    /// Download a document into the cache and record it
    StoreUpload {
        file_id: String,
        file_name: String,
        forwarded_from: Option<UserIdentity>,
    },
    /// Hand a fully specified job to the orchestrator
    Execute(Job),
    /// Operator commands
    ReportStatus,
    ClearCache,
}

impl Effect {
    pub fn reply(text: impl Into<String>) -> Self {
        Effect::Reply(text.into())
    }
}

/// Named group of numbers turned into contacts `"{name} 1"`, `"{name} 2"`, ...
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactGroup {
    pub name: String,
    pub numbers: Vec<String>,
}

/// A unit of work with every parameter collected.
#[derive(Debug, Clone, PartialEq)]
pub enum Job {
    Convert {
        files: Vec<UploadedFile>,
        contact_name: String,
        file_name: String,
        policy: SplitPolicy,
    },
    AdminNavy {
        admin: ContactGroup,
        navy: ContactGroup,
        file_name: String,
    },
    Manual {
        group: ContactGroup,
        file_name: String,
    },
    Extract {
        files: Vec<UploadedFile>,
    },
    AddContacts {
        files: Vec<UploadedFile>,
        group: ContactGroup,
    },
    DeleteNumbers {
        files: Vec<UploadedFile>,
        needles: Vec<String>,
    },
    Count {
        files: Vec<UploadedFile>,
    },
    RenameContact {
        files: Vec<UploadedFile>,
        old_name: String,
        new_name: String,
    },
    RenameFiles {
        files: Vec<UploadedFile>,
        new_names: Vec<String>,
    },
    Merge {
        files: Vec<UploadedFile>,
        format: FileFormat,
        file_name: String,
    },
    Split {
        files: Vec<UploadedFile>,
        parts: usize,
    },
    Dedupe {
        files: Vec<UploadedFile>,
    },
    FormatNumbers {
        files: Vec<UploadedFile>,
    },
}

impl Job {
    /// Uploaded inputs, in upload order.
    pub fn files(&self) -> &[UploadedFile] {
        match self {
            Job::AdminNavy { .. } | Job::Manual { .. } => &[],
            Job::Convert { files, .. }
            | Job::Extract { files }
            | Job::AddContacts { files, .. }
            | Job::DeleteNumbers { files, .. }
            | Job::Count { files }
            | Job::RenameContact { files, .. }
            | Job::RenameFiles { files, .. }
            | Job::Merge { files, .. }
            | Job::Split { files, .. }
            | Job::Dedupe { files }
            | Job::FormatNumbers { files } => files,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Job::Convert { .. } => "convert",
            Job::AdminNavy { .. } => "admin_navy",
            Job::Manual { .. } => "manual",
            Job::Extract { .. } => "extract",
            Job::AddContacts { .. } => "add_contacts",
            Job::DeleteNumbers { .. } => "delete_numbers",
            Job::Count { .. } => "count",
            Job::RenameContact { .. } => "rename_contact",
            Job::RenameFiles { .. } => "rename_files",
            Job::Merge { .. } => "merge",
            Job::Split { .. } => "split",
            Job::Dedupe { .. } => "dedupe",
            Job::FormatNumbers { .. } => "format_numbers",
        }
    }
}
