//! Pure state transition function
//!
//! Given the same state, context and event this always produces the same
//! new state and effects; all I/O happens in the runtime.

use super::effect::{ContactGroup, Job};
use super::flow::{main_menu, Command, Flow, Param, ParamValue, EMPTY_NAME};
use super::state::{ActiveFlow, SessionContext, SessionState, Stage, UploadedFile};
use super::{Effect, Event};
use crate::codec::FileFormat;
use crate::normalize::sanitize_file_name;
use thiserror::Error;

pub const FILE_RECEIVED: &str = "File received. Type /done to continue.";
pub const NO_FILES: &str = "No files received.";
pub const SAME_FORMAT: &str = "Send files with the same format.";
pub const DOWNLOAD_FAILED: &str = "File download failed, please try again.";
pub const NOT_PERMITTED: &str = "You do not have permission to use this command.";

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: SessionState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: SessionState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }
}

/// Events a session ignores. The runtime logs these and replies nothing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("No flow is active")]
    NoActiveFlow,
    #[error("No prompt is pending")]
    NoPendingPrompt,
    #[error("Flow is not accepting uploads")]
    NotCollectingUploads,
    #[error("Rejected upload blocks the flow until it is restarted")]
    InvalidFormatLocked,
    #[error("Missing collected parameter {0:?}")]
    MissingParam(Param),
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

/// Pure transition function
pub fn transition(
    state: &SessionState,
    context: &SessionContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    match (state, event) {
        // ============================================================
        // Commands
        // ============================================================
        (_, Event::Command(Command::Start)) => Ok(TransitionResult::new(SessionState::Idle)
            .with_effects(discard_uploads(state))
            .with_effect(Effect::reply(main_menu(&context.user.first_name)))),

        // Starting a flow always drops whatever the previous one collected
        (_, Event::Command(Command::Begin(flow))) => {
            Ok(TransitionResult::new(SessionState::Active(ActiveFlow::new(flow)))
                .with_effects(discard_uploads(state))
                .with_effect(Effect::reply(flow.start_prompt(context.batch_cap))))
        }

        (_, Event::Command(Command::Status)) => Ok(operator_only(state, context, Effect::ReportStatus)),
        (_, Event::Command(Command::ClearCache)) => Ok(operator_only(state, context, Effect::ClearCache)),

        (SessionState::Idle, Event::Command(Command::Done)) => Err(TransitionError::NoActiveFlow),
        (SessionState::Active(active), Event::Command(Command::Done)) => on_done(active, context),

        // ============================================================
        // Free text answers
        // ============================================================
        (SessionState::Idle, Event::Text(_)) => Err(TransitionError::NoActiveFlow),
        (SessionState::Active(active), Event::Text(text)) => on_text(active, context, &text),

        // ============================================================
        // Uploads
        // ============================================================
        (SessionState::Idle, Event::Document { .. }) => Err(TransitionError::NoActiveFlow),
        (
            SessionState::Active(active),
            Event::Document {
                file_id,
                file_name,
                forwarded_from,
            },
        ) => on_document(active, file_id, file_name, forwarded_from),

        (SessionState::Active(active), Event::UploadStored(file))
            if active.stage == Stage::Uploading =>
        {
            Ok(on_stored(active, file))
        }

        // Stored after the session moved on: nobody owns the file anymore
        (_, Event::UploadStored(file)) => Ok(TransitionResult::new(state.clone())
            .with_effect(Effect::DiscardUploads(vec![file.path]))),

        (_, Event::UploadFailed { file_name, message }) => {
            tracing::info!(file = %file_name, error = %message, "Upload was not stored");
            Ok(TransitionResult::new(state.clone()).with_effect(Effect::reply(DOWNLOAD_FAILED)))
        }

        // ============================================================
        // Job completion
        // ============================================================
        (
            SessionState::Active(ActiveFlow {
                stage: Stage::Executing,
                ..
            }),
            Event::JobFinished(_),
        ) => Ok(TransitionResult::new(SessionState::Idle)),

        (_, Event::JobFinished(outcome)) => Err(TransitionError::InvalidTransition(format!(
            "job finished ({outcome:?}) with no job running"
        ))),
    }
}

fn discard_uploads(state: &SessionState) -> Option<Effect> {
    let paths = state.upload_paths();
    (!paths.is_empty()).then_some(Effect::DiscardUploads(paths))
}

fn operator_only(state: &SessionState, context: &SessionContext, effect: Effect) -> TransitionResult {
    let effect = if context.is_operator {
        effect
    } else {
        Effect::reply(NOT_PERMITTED)
    };
    TransitionResult::new(state.clone()).with_effect(effect)
}

fn stay(active: &ActiveFlow) -> TransitionResult {
    TransitionResult::new(SessionState::Active(active.clone()))
}

fn on_done(active: &ActiveFlow, context: &SessionContext) -> Result<TransitionResult, TransitionError> {
    if !active.flow.accepts_uploads() || active.stage != Stage::Uploading {
        return Err(TransitionError::NotCollectingUploads);
    }
    if active.invalid_format_seen {
        return Err(TransitionError::InvalidFormatLocked);
    }
    if active.uploads.is_empty() {
        return Ok(stay(active).with_effect(Effect::reply(NO_FILES)));
    }

    let mut next = active.clone();
    if next.flow == Flow::RenameFile {
        next.stage = Stage::Renaming { index: 0 };
        let prompt = rename_prompt(&next.uploads[0]);
        return Ok(TransitionResult::new(SessionState::Active(next)).with_effect(Effect::reply(prompt)));
    }
    match next.flow.params().first() {
        Some(first) => {
            next.stage = Stage::Prompting { cursor: 0 };
            Ok(TransitionResult::new(SessionState::Active(next))
                .with_effect(Effect::reply(first.prompt())))
        }
        None => execute(next, context),
    }
}

fn rename_prompt(file: &UploadedFile) -> String {
    format!("Enter a new name for {}:", file.original_name)
}

fn on_text(
    active: &ActiveFlow,
    context: &SessionContext,
    text: &str,
) -> Result<TransitionResult, TransitionError> {
    match active.stage {
        Stage::Prompting { cursor } => {
            let params = active.flow.params();
            let Some(&param) = params.get(cursor) else {
                return Err(TransitionError::NoPendingPrompt);
            };
            let value = match param.parse(text) {
                Ok(value) => value,
                // Invalid answers re-prompt without advancing
                Err(message) => return Ok(stay(active).with_effect(Effect::reply(message))),
            };

            let mut next = active.clone();
            next.params.insert(param, value);
            match params.get(cursor + 1) {
                Some(following) => {
                    next.stage = Stage::Prompting { cursor: cursor + 1 };
                    Ok(TransitionResult::new(SessionState::Active(next))
                        .with_effect(Effect::reply(following.prompt())))
                }
                None => execute(next, context),
            }
        }
        Stage::Renaming { index } => {
            let name = sanitize_file_name(text);
            if name.is_empty() {
                return Ok(stay(active).with_effect(Effect::reply(EMPTY_NAME)));
            }
            let mut next = active.clone();
            next.renames.push(name);
            let batch = next.uploads.len().min(context.batch_cap);
            match next.uploads.get(index + 1).filter(|_| index + 1 < batch) {
                Some(following) => {
                    let prompt = rename_prompt(following);
                    next.stage = Stage::Renaming { index: index + 1 };
                    Ok(TransitionResult::new(SessionState::Active(next))
                        .with_effect(Effect::reply(prompt)))
                }
                None => execute(next, context),
            }
        }
        Stage::Uploading | Stage::Executing => Err(TransitionError::NoPendingPrompt),
    }
}

fn on_document(
    active: &ActiveFlow,
    file_id: String,
    file_name: String,
    forwarded_from: Option<super::state::UserIdentity>,
) -> Result<TransitionResult, TransitionError> {
    if !active.flow.accepts_uploads() || active.stage != Stage::Uploading {
        return Err(TransitionError::NotCollectingUploads);
    }
    if active.invalid_format_seen {
        return Err(TransitionError::InvalidFormatLocked);
    }

    let next = active.clone();
    let rejection = match FileFormat::from_file_name(&file_name) {
        Some(format) if active.flow.accepts(format) => {
            match (active.flow.requires_same_format(), active.extension_lock) {
                (true, Some(locked)) if locked != format => Some(SAME_FORMAT.to_string()),
                _ => None,
            }
        }
        _ => Some(active.flow.format_error()),
    };

    if let Some(message) = rejection {
        return Ok(reject_format(next, message));
    }

    Ok(
        TransitionResult::new(SessionState::Active(next)).with_effect(Effect::StoreUpload {
            file_id,
            file_name,
            forwarded_from,
        }),
    )
}

fn reject_format(mut next: ActiveFlow, message: String) -> TransitionResult {
    let notify = !next.format_error_notified;
    next.invalid_format_seen = true;
    next.format_error_notified = true;
    TransitionResult::new(SessionState::Active(next)).with_effects(notify.then(|| Effect::reply(message)))
}

/// A download finished. The merge format lock is taken by the first file
/// that actually arrives; a stored file that breaks the lock is dropped.
fn on_stored(active: &ActiveFlow, file: UploadedFile) -> TransitionResult {
    let mut next = active.clone();
    if next.flow.requires_same_format() {
        match (next.extension_lock, file.format()) {
            (Some(locked), Some(format)) if locked != format => {
                return reject_format(next, SAME_FORMAT.to_string())
                    .with_effect(Effect::DiscardUploads(vec![file.path]));
            }
            (None, format) => next.extension_lock = format,
            _ => {}
        }
    }
    next.uploads.push(file);
    let first_accept = !next.done_prompt_sent;
    next.done_prompt_sent = true;
    TransitionResult::new(SessionState::Active(next))
        .with_effects(first_accept.then(|| Effect::reply(FILE_RECEIVED)))
}

/// Move to `Executing` and emit the job built from everything collected.
fn execute(mut next: ActiveFlow, context: &SessionContext) -> Result<TransitionResult, TransitionError> {
    let job = build_job(&next, context)?;
    next.stage = Stage::Executing;
    Ok(TransitionResult::new(SessionState::Active(next)).with_effect(Effect::Execute(job)))
}

fn text_param(active: &ActiveFlow, param: Param) -> Result<String, TransitionError> {
    match active.params.get(&param) {
        Some(ParamValue::Text(text)) => Ok(text.clone()),
        _ => Err(TransitionError::MissingParam(param)),
    }
}

fn numbers_param(active: &ActiveFlow, param: Param) -> Result<Vec<String>, TransitionError> {
    match active.params.get(&param) {
        Some(ParamValue::Numbers(numbers)) => Ok(numbers.clone()),
        _ => Err(TransitionError::MissingParam(param)),
    }
}

fn build_job(active: &ActiveFlow, context: &SessionContext) -> Result<Job, TransitionError> {
    let files = active.uploads.clone();
    let job = match active.flow {
        Flow::Convert => Job::Convert {
            files,
            contact_name: text_param(active, Param::ContactName)?,
            file_name: text_param(active, Param::FileBaseName)?,
            policy: match active.params.get(&Param::SplitPolicy) {
                Some(ParamValue::Policy(policy)) => *policy,
                _ => return Err(TransitionError::MissingParam(Param::SplitPolicy)),
            },
        },
        Flow::AdminNavy => Job::AdminNavy {
            admin: ContactGroup {
                name: text_param(active, Param::AdminName)?,
                numbers: numbers_param(active, Param::AdminNumbers)?,
            },
            navy: ContactGroup {
                name: text_param(active, Param::NavyName)?,
                numbers: numbers_param(active, Param::NavyNumbers)?,
            },
            file_name: text_param(active, Param::FileBaseName)?,
        },
        Flow::Manual => Job::Manual {
            group: ContactGroup {
                name: text_param(active, Param::ContactName)?,
                numbers: numbers_param(active, Param::ManualNumbers)?,
            },
            file_name: text_param(active, Param::FileBaseName)?,
        },
        Flow::Extract => Job::Extract { files },
        Flow::AddContact => Job::AddContacts {
            files,
            group: ContactGroup {
                name: text_param(active, Param::ContactName)?,
                numbers: numbers_param(active, Param::NewContactNumbers)?,
            },
        },
        Flow::DeleteNumber => Job::DeleteNumbers {
            files,
            needles: numbers_param(active, Param::NumbersToRemove)?,
        },
        Flow::Count => Job::Count { files },
        Flow::RenameContact => Job::RenameContact {
            files,
            old_name: text_param(active, Param::OldName)?,
            new_name: text_param(active, Param::NewName)?,
        },
        Flow::RenameFile => {
            let expected = files.len().min(context.batch_cap);
            if active.renames.len() != expected {
                return Err(TransitionError::InvalidTransition(format!(
                    "{} names for {expected} files",
                    active.renames.len()
                )));
            }
            Job::RenameFiles {
                files,
                new_names: active.renames.clone(),
            }
        }
        Flow::Merge => Job::Merge {
            format: active
                .extension_lock
                .or_else(|| files.first().and_then(UploadedFile::format))
                .ok_or_else(|| TransitionError::InvalidTransition("merge without uploads".into()))?,
            file_name: text_param(active, Param::OutputFileName)?,
            files,
        },
        Flow::Split => Job::Split {
            files,
            parts: match active.params.get(&Param::PartCount) {
                Some(ParamValue::Count(parts)) => *parts,
                _ => return Err(TransitionError::MissingParam(Param::PartCount)),
            },
        },
        Flow::Dedupe => Job::Dedupe { files },
        Flow::FormatNumbers => Job::FormatNumbers { files },
    };
    Ok(job)
}
