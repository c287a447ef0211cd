//! Chat transport adapters and their error type

pub mod telegram;

pub use telegram::TelegramTransport;

use crate::runtime::Retryable;
use thiserror::Error;

/// Transport error with classification
#[derive(Debug, Error)]
#[error("{message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timed_out(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::TimedOut, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Network, message)
    }

    pub fn api(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Api, message)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Io, message)
    }
}

/// Error classification for retry logic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The request did not complete in time - retryable
    TimedOut,
    /// Connection failures
    Network,
    /// The API rejected the request
    Api,
    /// Local file access failed
    Io,
}

impl TransportErrorKind {
    pub fn is_retryable(self) -> bool {
        matches!(self, TransportErrorKind::TimedOut)
    }
}

impl Retryable for TransportError {
    fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_timeouts_retry() {
        assert!(TransportError::timed_out("slow").is_retryable());
        assert!(!TransportError::network("reset").is_retryable());
        assert!(!TransportError::api("400").is_retryable());
        assert!(!TransportError::io("denied").is_retryable());
    }
}
