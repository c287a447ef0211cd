//! Mock implementations for testing
//!
//! These mocks enable end-to-end testing of sessions without real I/O.

use super::retry::RetryPolicy;
use super::traits::Transport;
use crate::transport::TransportError;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Retry policy with the production ceiling and no waiting
#[allow(dead_code)]
pub fn test_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 10,
        delay: Duration::ZERO,
    }
}

// ============================================================================
// Mock Transport
// ============================================================================

/// A document as it was when sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentDocument {
    pub chat_id: i64,
    pub file_name: String,
    pub content: Vec<u8>,
}

impl SentDocument {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.content).into_owned()
    }
}

/// Mock transport that records everything sent and serves downloads from
/// a map of file id to bytes
#[allow(dead_code)]
#[derive(Default)]
pub struct MockTransport {
    files: Mutex<HashMap<String, Vec<u8>>>,
    send_errors: Mutex<VecDeque<TransportError>>,
    document_errors: Mutex<VecDeque<TransportError>>,
    download_errors: Mutex<VecDeque<TransportError>>,
    /// Chats whose text sends never complete
    stalled_chats: Mutex<HashSet<i64>>,
    /// How long each document send takes
    document_delay: Mutex<Duration>,
    documents_in_flight: AtomicUsize,
    peak_documents_in_flight: AtomicUsize,
    /// Record of delivered texts
    pub texts: Mutex<Vec<(i64, String)>>,
    /// Record of delivered documents
    pub documents: Mutex<Vec<SentDocument>>,
}

#[allow(dead_code)]
impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `file_id` downloadable with the given content
    pub fn with_file(self, file_id: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        self.files
            .lock()
            .unwrap()
            .insert(file_id.into(), content.into());
        self
    }

    /// Fail the next text send
    pub fn queue_send_error(&self, error: TransportError) {
        self.send_errors.lock().unwrap().push_back(error);
    }

    /// Fail the next document send
    pub fn queue_document_error(&self, error: TransportError) {
        self.document_errors.lock().unwrap().push_back(error);
    }

    /// Fail the next download
    pub fn queue_download_error(&self, error: TransportError) {
        self.download_errors.lock().unwrap().push_back(error);
    }

    /// Make every text send to `chat_id` hang forever
    pub fn stall_chat(&self, chat_id: i64) {
        self.stalled_chats.lock().unwrap().insert(chat_id);
    }

    /// Make every document send take `delay`
    pub fn with_document_delay(self, delay: Duration) -> Self {
        *self.document_delay.lock().unwrap() = delay;
        self
    }

    /// Most document sends observed in progress at once
    pub fn peak_documents_in_flight(&self) -> usize {
        self.peak_documents_in_flight.load(Ordering::SeqCst)
    }

    pub fn texts(&self) -> Vec<(i64, String)> {
        self.texts.lock().unwrap().clone()
    }

    /// Delivered texts without the chat id
    pub fn replies(&self) -> Vec<String> {
        self.texts().into_iter().map(|(_, text)| text).collect()
    }

    pub fn documents(&self) -> Vec<SentDocument> {
        self.documents.lock().unwrap().clone()
    }

    pub fn document_names(&self) -> Vec<String> {
        self.documents()
            .into_iter()
            .map(|d| d.file_name)
            .collect()
    }

    pub fn document(&self, file_name: &str) -> Option<SentDocument> {
        self.documents()
            .into_iter()
            .find(|d| d.file_name == file_name)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), TransportError> {
        let stalled = self.stalled_chats.lock().unwrap().contains(&chat_id);
        if stalled {
            std::future::pending::<()>().await;
        }
        if let Some(error) = self.send_errors.lock().unwrap().pop_front() {
            return Err(error);
        }
        self.texts.lock().unwrap().push((chat_id, text.to_string()));
        Ok(())
    }

    async fn send_document(&self, chat_id: i64, path: &Path) -> Result<(), TransportError> {
        if let Some(error) = self.document_errors.lock().unwrap().pop_front() {
            return Err(error);
        }
        let in_flight = self.documents_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_documents_in_flight
            .fetch_max(in_flight, Ordering::SeqCst);
        let delay = *self.document_delay.lock().unwrap();
        tokio::time::sleep(delay).await;
        self.documents_in_flight.fetch_sub(1, Ordering::SeqCst);

        // Capture content now: the file is deleted once the job ends
        let content = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.documents.lock().unwrap().push(SentDocument {
            chat_id,
            file_name,
            content,
        });
        Ok(())
    }

    async fn download(&self, file_id: &str, dest: &Path) -> Result<(), TransportError> {
        if let Some(error) = self.download_errors.lock().unwrap().pop_front() {
            return Err(error);
        }
        let content = self
            .files
            .lock()
            .unwrap()
            .get(file_id)
            .cloned()
            .ok_or_else(|| TransportError::api(format!("unknown file {file_id}")))?;
        tokio::fs::write(dest, content).await?;
        Ok(())
    }
}
