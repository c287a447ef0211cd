//! Telegram Bot API adapter
//!
//! Long polling for inbound updates; `sendMessage`, multipart
//! `sendDocument` and `getFile` downloads for everything else.

use super::TransportError;
use crate::runtime::{Inbound, InboundPayload, Transport};
use crate::state_machine::UserIdentity;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

const API_BASE: &str = "https://api.telegram.org";

/// Response envelope shared by every Bot API method
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub chat: Chat,
    pub from: Option<User>,
    pub text: Option<String>,
    pub document: Option<Document>,
    pub forward_origin: Option<ForwardOrigin>,
    /// Pre-7.0 Bot API field, still sent by some servers
    pub forward_from: Option<User>,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: String,
}

impl From<User> for UserIdentity {
    fn from(user: User) -> Self {
        UserIdentity {
            id: user.id,
            username: user.username,
            first_name: user.first_name,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Document {
    pub file_id: String,
    pub file_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ForwardOrigin {
    User { sender_user: User },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct File {
    file_path: Option<String>,
}

impl Update {
    /// Messages with a sender and either text or a document; everything
    /// else is of no interest.
    pub fn into_inbound(self) -> Option<Inbound> {
        let message = self.message?;
        let user: UserIdentity = message.from?.into();
        let chat_id = message.chat.id;

        let payload = if let Some(document) = message.document {
            let forwarded_from = match message.forward_origin {
                Some(ForwardOrigin::User { sender_user }) => Some(sender_user.into()),
                _ => message.forward_from.map(UserIdentity::from),
            };
            InboundPayload::Document {
                file_name: document
                    .file_name
                    .unwrap_or_else(|| document.file_id.clone()),
                file_id: document.file_id,
                forwarded_from,
            }
        } else {
            InboundPayload::Text(message.text?)
        };

        Some(Inbound {
            user,
            chat_id,
            payload,
        })
    }
}

fn request_error(e: reqwest::Error) -> TransportError {
    // The URL carries the bot token
    let e = e.without_url();
    if e.is_timeout() {
        TransportError::timed_out(format!("Request timeout: {e}"))
    } else if e.is_connect() {
        TransportError::network(format!("Connection failed: {e}"))
    } else {
        TransportError::network(format!("Request failed: {e}"))
    }
}

pub struct TelegramTransport {
    client: Client,
    token: String,
    base_url: String,
}

impl TelegramTransport {
    pub fn new(token: String, timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::network(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            token,
            base_url: API_BASE.to_string(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.base_url, self.token)
    }

    async fn parse<T: DeserializeOwned>(method: &str, response: Response) -> Result<T, TransportError> {
        let status = response.status();
        let body = response.text().await.map_err(request_error)?;
        let envelope: ApiResponse<T> = serde_json::from_str(&body).map_err(|e| {
            TransportError::api(format!("{method}: unparseable response ({status}): {e}"))
        })?;
        match envelope {
            ApiResponse {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            ApiResponse { description, .. } => Err(TransportError::api(format!(
                "{method} failed ({status}): {}",
                description.unwrap_or_default()
            ))),
        }
    }

    /// Long-poll for updates after `offset`, waiting up to `wait` for one.
    pub async fn get_updates(&self, offset: i64, wait: Duration) -> Result<Vec<Update>, TransportError> {
        let response = self
            .client
            .post(self.method_url("getUpdates"))
            // Outlive the server-side wait
            .timeout(wait + Duration::from_secs(10))
            .json(&serde_json::json!({
                "offset": offset,
                "timeout": wait.as_secs(),
                "allowed_updates": ["message"],
            }))
            .send()
            .await
            .map_err(request_error)?;
        Self::parse("getUpdates", response).await
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), TransportError> {
        let response = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&serde_json::json!({ "chat_id": chat_id, "text": text }))
            .send()
            .await
            .map_err(request_error)?;
        Self::parse::<IgnoredAny>("sendMessage", response).await?;
        Ok(())
    }

    async fn send_document(&self, chat_id: i64, path: &Path) -> Result<(), TransportError> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());
        let form = Form::new()
            .text("chat_id", chat_id.to_string())
            .part("document", Part::bytes(bytes).file_name(file_name));

        let response = self
            .client
            .post(self.method_url("sendDocument"))
            .multipart(form)
            .send()
            .await
            .map_err(request_error)?;
        Self::parse::<IgnoredAny>("sendDocument", response).await?;
        Ok(())
    }

    async fn download(&self, file_id: &str, dest: &Path) -> Result<(), TransportError> {
        let response = self
            .client
            .post(self.method_url("getFile"))
            .json(&serde_json::json!({ "file_id": file_id }))
            .send()
            .await
            .map_err(request_error)?;
        let file: File = Self::parse("getFile", response).await?;
        let file_path = file
            .file_path
            .ok_or_else(|| TransportError::api("getFile returned no file_path"))?;

        let url = format!("{}/file/bot{}/{file_path}", self.base_url, self.token);
        let response = self.client.get(url).send().await.map_err(request_error)?;
        if !response.status().is_success() {
            return Err(TransportError::api(format!(
                "File download failed: HTTP {}",
                response.status()
            )));
        }
        let bytes = response.bytes().await.map_err(request_error)?;
        tokio::fs::write(dest, &bytes).await?;
        Ok(())
    }
}
