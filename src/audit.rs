//! Append-only upload audit trail
//!
//! One JSON line per accepted upload, in one file per sender.

use crate::normalize::sanitize_file_name;
use crate::state_machine::state::UserIdentity;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

const ABSENT: &str = "---";

#[derive(Debug, Serialize)]
struct AuditRecord<'a> {
    timestamp: DateTime<Utc>,
    sender_username: String,
    sender_id: String,
    forwarder_username: String,
    forwarder_id: String,
    file_name: &'a str,
}

/// Username if set, otherwise the numeric id; the other slot is `---`.
fn identity_columns(user: Option<&UserIdentity>) -> (String, String) {
    match user {
        Some(UserIdentity {
            username: Some(username),
            ..
        }) => (username.clone(), ABSENT.to_string()),
        Some(user) => (ABSENT.to_string(), user.id.to_string()),
        None => (ABSENT.to_string(), ABSENT.to_string()),
    }
}

#[derive(Debug, Clone)]
pub struct AuditLog {
    dir: PathBuf,
}

impl AuditLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, sender: &UserIdentity) -> PathBuf {
        self.dir
            .join(format!("{}.jsonl", sanitize_file_name(&sender.log_name())))
    }

    pub async fn record(
        &self,
        sender: &UserIdentity,
        forwarder: Option<&UserIdentity>,
        file_name: &str,
    ) -> io::Result<()> {
        let (sender_username, sender_id) = identity_columns(Some(sender));
        let (forwarder_username, forwarder_id) = identity_columns(forwarder);
        let record = AuditRecord {
            timestamp: Utc::now(),
            sender_username,
            sender_id,
            forwarder_username,
            forwarder_id,
            file_name,
        };
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        tokio::fs::create_dir_all(&self.dir).await?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for(sender))
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }
}
