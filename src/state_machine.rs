//! Per-user session state machine
//!
//! Implements the Elm Architecture pattern with pure state transitions.

mod effect;
pub mod event;
pub mod flow;
pub mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use effect::{ContactGroup, Effect, Job};
pub use event::{Event, JobOutcome};
pub use flow::{Command, Flow};
pub use state::{SessionContext, SessionState, UploadedFile, UserIdentity};
pub use transition::transition;
