//! Bounded retry with a fixed delay

use super::traits::Transport;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Errors that know whether trying again can help
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Attempt ceiling and the pause between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            delay: Duration::from_secs(6),
        }
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// the attempt ceiling is reached. The closure receives the 1-based attempt.
pub async fn with_retry<T, E, F, Fut>(policy: &RetryPolicy, operation: &str, mut op: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                tracing::warn!(
                    operation,
                    attempt,
                    max_attempts,
                    error = %e,
                    "Transient failure, retrying"
                );
                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::error!(operation, attempt, error = %e, "Retries exhausted");
                }
                return Err(e);
            }
        }
    }
}

/// Sends bot replies, retrying transient transport failures on its own
/// budget independent of the job that triggered the reply.
pub struct Notifier<T: Transport> {
    transport: Arc<T>,
    policy: RetryPolicy,
}

impl<T: Transport> Notifier<T> {
    pub fn new(transport: Arc<T>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    /// Deliver `text`. Failures are logged; the caller carries on.
    pub async fn reply(&self, chat_id: i64, text: &str) {
        tracing::info!(chat_id, reply = %text, "Sending reply");
        let result = with_retry(&self.policy, "send_text", move |_| {
            self.transport.send_text(chat_id, text)
        })
        .await;
        if let Err(e) = result {
            tracing::error!(chat_id, error = %e, "Reply was not delivered");
        }
    }
}
