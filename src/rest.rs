//! REST side-channel module
//!
//! Bulk reads and binary payloads stay off the persistent low-latency
//! socket by design: conversation lists and message history are fetched
//! over REST, and file attachments are uploaded as multipart requests.

use crate::chat::ConversationSummary;
use crate::protocol::ChatMessagePayload;
use crate::session::AuthProvider;
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Maximum accepted attachment size in bytes (checked client-side before
/// the upload is attempted)
pub const MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

/// MIME type prefixes accepted for attachments
pub const ALLOWED_MIME_PREFIXES: &[&str] = &[
    "image/",
    "application/pdf",
    "text/plain",
    "application/zip",
    "application/msword",
    "application/vnd.openxmlformats-officedocument",
];

/// One file queued for a multipart chat upload
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingFile {
    /// File name shown to the recipient
    pub name: String,
    /// MIME type of the content
    pub mime: String,
    /// Raw file content
    pub bytes: Vec<u8>,
}

impl OutgoingFile {
    /// Whether the file passes the client-side size limit
    pub fn within_size_limit(&self) -> bool {
        (self.bytes.len() as u64) <= MAX_UPLOAD_BYTES
    }

    /// Whether the file's MIME type is accepted for upload
    pub fn has_allowed_type(&self) -> bool {
        ALLOWED_MIME_PREFIXES
            .iter()
            .any(|prefix| self.mime.starts_with(prefix))
    }
}

/// REST operations this layer consumes from the marketplace backend
#[async_trait]
pub trait MarketplaceApi: Send + Sync {
    /// Fetch all conversation summaries for the signed-in user
    async fn conversation_list(&self) -> Result<Vec<ConversationSummary>>;

    /// Fetch the full message history of one conversation
    async fn message_history(&self, chat_id: &str) -> Result<Vec<ChatMessagePayload>>;

    /// Upload a message with file attachments as a multipart request
    async fn upload_message(
        &self,
        chat_id: &str,
        text: Option<&str>,
        files: &[OutgoingFile],
    ) -> Result<()>;
}

/// reqwest-backed implementation of [`MarketplaceApi`]
pub struct RestApi {
    base_url: String,
    http: reqwest::Client,
    auth: Arc<dyn AuthProvider>,
}

impl RestApi {
    /// Create a REST client rooted at the backend base URL
    pub fn new(base_url: impl Into<String>, auth: Arc<dyn AuthProvider>) -> Self {
        Self {
            base_url: base_url.into(),
            http: reqwest::Client::new(),
            auth,
        }
    }

    fn bearer_token(&self) -> Result<String> {
        self.auth
            .access_token()
            .ok_or_else(|| Error::Credential("No access credential for REST call".to_string()))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl MarketplaceApi for RestApi {
    async fn conversation_list(&self) -> Result<Vec<ConversationSummary>> {
        let token = self.bearer_token()?;
        let summaries = self
            .http
            .get(self.url("/api/chats"))
            .bearer_auth(token)
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<ConversationSummary>>()
            .await?;
        debug!(count = summaries.len(), "Fetched conversation list");
        Ok(summaries)
    }

    async fn message_history(&self, chat_id: &str) -> Result<Vec<ChatMessagePayload>> {
        let token = self.bearer_token()?;
        let history = self
            .http
            .get(self.url(&format!("/api/chats/{chat_id}/messages")))
            .bearer_auth(token)
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<ChatMessagePayload>>()
            .await?;
        debug!(chat_id, count = history.len(), "Fetched message history");
        Ok(history)
    }

    async fn upload_message(
        &self,
        chat_id: &str,
        text: Option<&str>,
        files: &[OutgoingFile],
    ) -> Result<()> {
        let token = self.bearer_token()?;

        let mut form = reqwest::multipart::Form::new();
        if let Some(text) = text {
            form = form.text("message", text.to_string());
        }
        for file in files {
            let part = reqwest::multipart::Part::bytes(file.bytes.clone())
                .file_name(file.name.clone())
                .mime_str(&file.mime)?;
            form = form.part("files", part);
        }

        let response = self
            .http
            .post(self.url(&format!("/api/chats/{chat_id}/messages")))
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Upload(format!(
                "Server rejected upload for chat {}: {}",
                chat_id,
                response.status()
            )));
        }
        debug!(chat_id, files = files.len(), "Uploaded chat message");
        Ok(())
    }
}
