//! Trait abstractions for runtime I/O
//!
//! These traits enable testing the runtime with mock implementations.

use crate::transport::TransportError;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

/// Outbound side of the chat transport
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a plain text message
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), TransportError>;

    /// Send a local file as a document, named after the file
    async fn send_document(&self, chat_id: i64, path: &Path) -> Result<(), TransportError>;

    /// Download an inbound document to `dest`
    async fn download(&self, file_id: &str, dest: &Path) -> Result<(), TransportError>;
}

// ============================================================================
// Arc implementation for shared transports
// ============================================================================

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), TransportError> {
        (**self).send_text(chat_id, text).await
    }

    async fn send_document(&self, chat_id: i64, path: &Path) -> Result<(), TransportError> {
        (**self).send_document(chat_id, path).await
    }

    async fn download(&self, file_id: &str, dest: &Path) -> Result<(), TransportError> {
        (**self).download(file_id, dest).await
    }
}
