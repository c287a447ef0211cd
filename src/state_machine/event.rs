//! Events that drive a session

use super::flow::Command;
use super::state::{UploadedFile, UserIdentity};

/// Events that trigger state transitions
#[derive(Debug, Clone)]
pub enum Event {
    // User events
    Command(Command),
    Text(String),
    Document {
        file_id: String,
        file_name: String,
        forwarded_from: Option<UserIdentity>,
    },

    // Upload storage results
    UploadStored(UploadedFile),
    UploadFailed {
        file_name: String,
        message: String,
    },

    // Orchestrator result
    JobFinished(JobOutcome),
}

/// How a job ended. The user has already been told either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    /// Transient transport failures exhausted the retry budget.
    Busy,
    Failed,
}
