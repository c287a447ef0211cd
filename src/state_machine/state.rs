//! Session state types

use super::flow::{Flow, Param, ParamValue};
use crate::codec::FileFormat;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Chat user as reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: i64,
    pub username: Option<String>,
    pub first_name: String,
}

impl UserIdentity {
    /// Name used for per-sender log files: username when set, numeric id
    /// otherwise. Telegram usernames start with a letter, so the two never
    /// collide. Sessions are keyed by `id`.
    pub fn log_name(&self) -> String {
        self.username
            .clone()
            .unwrap_or_else(|| self.id.to_string())
    }

    /// `@username`, or the numeric id.
    pub fn handle(&self) -> String {
        match &self.username {
            Some(username) => format!("@{username}"),
            None => self.id.to_string(),
        }
    }
}

/// An accepted upload stored in the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFile {
    pub path: PathBuf,
    pub original_name: String,
}

impl UploadedFile {
    pub fn format(&self) -> Option<FileFormat> {
        FileFormat::from_file_name(&self.original_name)
    }
}

/// Where an active flow is in its sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Stage {
    /// Accepting documents until `/done`.
    Uploading,
    /// Waiting for the answer to `flow.params()[cursor]`.
    Prompting { cursor: usize },
    /// Waiting for the new name of upload `index`.
    Renaming { index: usize },
    /// Job handed to the orchestrator.
    Executing,
}

/// Progress of the flow a user is in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveFlow {
    pub flow: Flow,
    pub stage: Stage,
    pub params: BTreeMap<Param, ParamValue>,
    pub uploads: Vec<UploadedFile>,
    /// New names collected by the rename-file flow, in upload order.
    pub renames: Vec<String>,
    /// Format every upload must share, for flows that require one.
    pub extension_lock: Option<FileFormat>,
    /// A rejected upload blocks further uploads and `/done` until restart.
    pub invalid_format_seen: bool,
    pub format_error_notified: bool,
    pub done_prompt_sent: bool,
}

impl ActiveFlow {
    pub fn new(flow: Flow) -> Self {
        let stage = if flow.accepts_uploads() {
            Stage::Uploading
        } else {
            Stage::Prompting { cursor: 0 }
        };
        Self {
            flow,
            stage,
            params: BTreeMap::new(),
            uploads: Vec::new(),
            renames: Vec::new(),
            extension_lock: None,
            invalid_format_seen: false,
            format_error_notified: false,
            done_prompt_sent: false,
        }
    }
}

/// Per-user session state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Active(ActiveFlow),
}

impl SessionState {
    pub fn active_flow(&self) -> Option<Flow> {
        match self {
            SessionState::Idle => None,
            SessionState::Active(active) => Some(active.flow),
        }
    }

    /// Cache paths this session owns.
    pub fn upload_paths(&self) -> Vec<PathBuf> {
        match self {
            SessionState::Idle => Vec::new(),
            SessionState::Active(active) => {
                active.uploads.iter().map(|u| u.path.clone()).collect()
            }
        }
    }
}

/// Immutable facts about a session, fixed when it is created.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub user: UserIdentity,
    pub chat_id: i64,
    pub is_operator: bool,
    pub batch_cap: usize,
}

impl SessionContext {
    pub fn new(user: UserIdentity, chat_id: i64, operator: Option<&str>, batch_cap: usize) -> Self {
        let is_operator = match (operator, user.username.as_deref()) {
            (Some(op), Some(name)) => op.eq_ignore_ascii_case(name),
            _ => false,
        };
        Self {
            user,
            chat_id,
            is_operator,
            batch_cap,
        }
    }
}
