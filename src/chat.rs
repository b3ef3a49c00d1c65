//! Chat cache module
//!
//! Per-conversation message state plus the conversation-summary list:
//! - Summaries for every conversation, updated in place by lightweight
//!   chat-update deltas and re-sorted most-recently-active first
//! - The message list of the single active conversation (switching the
//!   active conversation clears it)
//! - Outbound sends: text goes fire-and-forget over the socket, file
//!   attachments degrade to a REST multipart upload
//!
//! Upload failures surface on a dedicated error stream for transient UI
//! display; nothing here throws across the UI boundary.

use crate::chime::Chime;
use crate::connection::{BestEffort, Connection};
use crate::protocol::{
    topics, ChatMessagePayload, ChatUpdate, ChatUpdateKind, MessageKind, SendChatMessage,
    Timestamp, TypingSignal,
};
use crate::rest::{MarketplaceApi, OutgoingFile, MAX_UPLOAD_BYTES};
use crate::typing::TypingTracker;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex};
use tracing::{debug, info, warn};

/// One conversation's preview entry in the chat list
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    /// Stable conversation identifier
    pub chat_id: String,
    /// Conversation title (usually the related marketplace request)
    pub title: String,
    /// Preview of the most recent message
    #[serde(default)]
    pub last_message: Option<String>,
    /// Time of the most recent activity
    pub last_activity: Timestamp,
    /// Unread messages in this conversation
    #[serde(default)]
    pub unread_count: u32,
    /// Display name of the other party
    #[serde(default)]
    pub counterparty: Option<String>,
    /// Whether the conversation has been read
    #[serde(default)]
    pub is_read: bool,
}

/// Structured attachment derived from the flat wire fields
#[derive(Debug, Clone, PartialEq)]
pub struct FileAttachment {
    /// File name shown to the user
    pub name: String,
    /// Download URL
    pub url: String,
    /// MIME type, when the backend includes it
    pub mime: Option<String>,
    /// Size in bytes, when the backend includes it
    pub size: Option<u64>,
}

/// One message inside the active conversation
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    /// Server-assigned identifier, absent until persisted
    pub id: Option<i64>,
    /// Conversation this message belongs to
    pub chat_id: String,
    /// Sender email
    pub sender_email: String,
    /// Sender display name
    pub sender_name: String,
    /// Message text, absent for file-only messages
    pub text: Option<String>,
    /// Normalized send time
    pub sent_at: Timestamp,
    /// Whether the message has been read
    pub is_read: bool,
    /// Message kind
    pub kind: MessageKind,
    /// Attachment metadata for file/image messages
    pub attachment: Option<FileAttachment>,
}

impl ChatMessage {
    /// Convert a wire payload into the internal shape, deriving the
    /// attachment sub-object for file and image messages
    pub fn from_payload(chat_id: &str, payload: ChatMessagePayload) -> Self {
        let ChatMessagePayload {
            id,
            message,
            sender_name,
            sender_email,
            timestamp,
            is_read,
            message_type,
            file_name,
            file_url,
            file_type,
            file_size,
        } = payload;

        let kind = message_type.unwrap_or_default();
        let attachment = match kind {
            MessageKind::File | MessageKind::Image => file_url.map(|url| FileAttachment {
                name: file_name.unwrap_or_default(),
                url,
                mime: file_type,
                size: file_size,
            }),
            MessageKind::Text => None,
        };

        Self {
            id,
            chat_id: chat_id.to_string(),
            sender_email,
            sender_name,
            text: message,
            sent_at: timestamp,
            is_read,
            kind,
            attachment,
        }
    }
}

/// Upload failure surfaced on the chat error stream, intended for
/// transient UI display
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum UploadError {
    /// File exceeds the client-side size limit
    #[error("File '{name}' exceeds the {limit}-byte upload limit ({size} bytes)")]
    TooLarge {
        /// File name
        name: String,
        /// Actual size in bytes
        size: u64,
        /// Configured limit in bytes
        limit: u64,
    },
    /// File has a MIME type outside the allowed set
    #[error("File '{name}' has unsupported type '{mime}'")]
    UnsupportedType {
        /// File name
        name: String,
        /// Rejected MIME type
        mime: String,
    },
    /// The backend refused the upload
    #[error("Upload rejected: {0}")]
    Rejected(String),
}

/// Tunables for the chat cache
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Delay before the mark-as-read command is sent after opening a
    /// conversation
    pub mark_read_delay: Duration,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            mark_read_delay: Duration::from_millis(400),
        }
    }
}

/// Observable chat state: conversation summaries plus the active
/// conversation's message list and typing map
pub struct ChatCache {
    connection: Connection,
    api: Arc<dyn MarketplaceApi>,
    chime: Arc<dyn Chime>,
    config: ChatConfig,
    summaries: watch::Sender<Vec<ConversationSummary>>,
    messages: watch::Sender<Vec<ChatMessage>>,
    active: Mutex<Option<String>>,
    typing: TypingTracker,
    surface: broadcast::Sender<()>,
    upload_errors: broadcast::Sender<UploadError>,
}

impl ChatCache {
    /// Create a cache wired to the given connection and REST collaborator
    pub fn new(
        connection: Connection,
        api: Arc<dyn MarketplaceApi>,
        chime: Arc<dyn Chime>,
        config: ChatConfig,
    ) -> Self {
        let (summaries, _) = watch::channel(Vec::new());
        let (messages, _) = watch::channel(Vec::new());
        let (surface, _) = broadcast::channel(16);
        let (upload_errors, _) = broadcast::channel(16);
        Self {
            connection,
            api,
            chime,
            config,
            summaries,
            messages,
            active: Mutex::new(None),
            typing: TypingTracker::new(),
            surface,
            upload_errors,
        }
    }

    /// Fetch the authoritative conversation list and replace the local one
    pub async fn load_conversation_list(&self) -> Result<()> {
        let mut list = self.api.conversation_list().await?;
        list.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        let count = list.len();
        self.summaries.send_replace(list);
        debug!(count, "Conversation list replaced");
        Ok(())
    }

    /// Apply one conversation-summary delta.
    ///
    /// A `NewMessage` delta for the active conversation never bumps its
    /// unread count; for any other conversation the count becomes the
    /// server-provided value when present, else increments by one. A delta
    /// for an unknown conversation triggers a full list reload instead of
    /// being dropped. The list is re-sorted afterwards.
    pub async fn apply_update(&self, update: ChatUpdate) {
        match update.update_type {
            ChatUpdateKind::Typing => {
                debug!(chat_id = %update.chat_id, "Ignoring typing delta on the update queue");
                return;
            }
            ChatUpdateKind::ChatCreated => {
                info!(chat_id = %update.chat_id, "Conversation created, reloading list");
                if let Err(e) = self.load_conversation_list().await {
                    warn!(error = %e, "Conversation list reload failed");
                }
                self.signal_surface();
                return;
            }
            ChatUpdateKind::MessageRead => {
                if self.reload_for_unknown(&update.chat_id).await {
                    return;
                }
                self.summaries.send_modify(|list| {
                    if let Some(summary) =
                        list.iter_mut().find(|s| s.chat_id == update.chat_id)
                    {
                        summary.unread_count = 0;
                        summary.is_read = true;
                    }
                });
            }
            ChatUpdateKind::NewMessage => {
                if self.reload_for_unknown(&update.chat_id).await {
                    self.signal_surface();
                    return;
                }

                let is_active = self
                    .active
                    .lock()
                    .await
                    .as_deref()
                    .is_some_and(|active| active == update.chat_id);
                self.summaries.send_modify(|list| {
                    if let Some(summary) =
                        list.iter_mut().find(|s| s.chat_id == update.chat_id)
                    {
                        if update.message_preview.is_some() {
                            summary.last_message = update.message_preview.clone();
                        }
                        summary.last_activity = update.timestamp;
                        if !is_active {
                            summary.unread_count =
                                update.unread_count.unwrap_or(summary.unread_count + 1);
                            summary.is_read = false;
                        }
                    }
                });
                if !is_active {
                    self.signal_surface();
                }
            }
        }
        self.resort();
    }

    /// Make one conversation active: clear the previous message list and
    /// typing map, fetch its history, subscribe its topic, and schedule
    /// the delayed mark-as-read command
    pub async fn set_active_conversation(&self, chat_id: &str) -> Result<()> {
        if let Some(previous) = self.active.lock().await.take() {
            self.connection
                .unsubscribe_topic(&topics::conversation(&previous))
                .await;
        }
        self.messages.send_replace(Vec::new());
        self.typing.clear();

        let history = self.api.message_history(chat_id).await?;
        let messages: Vec<ChatMessage> = history
            .into_iter()
            .map(|payload| ChatMessage::from_payload(chat_id, payload))
            .collect();
        info!(chat_id, count = messages.len(), "Conversation opened");
        self.messages.send_replace(messages);

        *self.active.lock().await = Some(chat_id.to_string());
        self.connection
            .subscribe_topic(&topics::conversation(chat_id))
            .await;

        // The user is presumed to be reading; flag the conversation read
        // after a short beat so the open feels instantaneous
        let connection = self.connection.clone();
        let destination = topics::chat_read(chat_id);
        let delay = self.config.mark_read_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            connection
                .publish(&destination, &serde_json::json!({}))
                .await;
        });

        self.summaries.send_modify(|list| {
            if let Some(summary) = list.iter_mut().find(|s| s.chat_id == chat_id) {
                summary.unread_count = 0;
                summary.is_read = true;
            }
        });
        Ok(())
    }

    /// Leave the active conversation: unsubscribe its topic and clear the
    /// message list and typing map
    pub async fn clear_active_conversation(&self) {
        let Some(previous) = self.active.lock().await.take() else {
            return;
        };
        self.connection
            .unsubscribe_topic(&topics::conversation(&previous))
            .await;
        self.messages.send_replace(Vec::new());
        self.typing.clear();
        debug!(chat_id = %previous, "Conversation closed");
    }

    /// Identifier of the active conversation, if any
    pub async fn active_conversation(&self) -> Option<String> {
        self.active.lock().await.clone()
    }

    /// Append a pushed message to the active conversation's tail.
    ///
    /// Server delivery order is trusted; no client-side re-sort happens
    /// here. Plays the notification chime.
    pub async fn append_incoming(&self, payload: ChatMessagePayload) {
        let Some(active) = self.active.lock().await.clone() else {
            debug!("Dropping message push: no active conversation");
            return;
        };
        let message = ChatMessage::from_payload(&active, payload);
        self.messages.send_modify(|list| list.push(message));
        self.chime.play();
    }

    /// Send a text message to the active conversation, fire-and-forget.
    ///
    /// Delivery confirmation arrives later as an inbound message echo;
    /// no acknowledgment is awaited over the socket.
    pub async fn send_message(&self, text: &str) -> BestEffort {
        let Some(active) = self.active.lock().await.clone() else {
            warn!("send_message skipped: no active conversation");
            return BestEffort::Dropped;
        };
        let body = SendChatMessage {
            message: text.to_string(),
        };
        self.connection
            .publish(&topics::chat_send(&active), &body)
            .await
    }

    /// Send a message with file attachments via the REST multipart path.
    ///
    /// Validation and upload failures are emitted on the upload-error
    /// stream rather than returned.
    pub async fn send_message_with_files(&self, text: Option<&str>, files: Vec<OutgoingFile>) {
        let Some(active) = self.active.lock().await.clone() else {
            warn!("send_message_with_files skipped: no active conversation");
            return;
        };

        for file in &files {
            if !file.within_size_limit() {
                self.emit_upload_error(UploadError::TooLarge {
                    name: file.name.clone(),
                    size: file.bytes.len() as u64,
                    limit: MAX_UPLOAD_BYTES,
                });
                return;
            }
            if !file.has_allowed_type() {
                self.emit_upload_error(UploadError::UnsupportedType {
                    name: file.name.clone(),
                    mime: file.mime.clone(),
                });
                return;
            }
        }

        if let Err(e) = self.api.upload_message(&active, text, &files).await {
            self.emit_upload_error(UploadError::Rejected(e.to_string()));
        }
    }

    /// Publish the local user's typing state for the active conversation
    pub async fn send_typing(&self, is_typing: bool) -> BestEffort {
        let Some(active) = self.active.lock().await.clone() else {
            return BestEffort::Dropped;
        };
        self.connection
            .publish(&topics::chat_typing(&active), &TypingSignal { is_typing })
            .await
    }

    /// Typing tracker for the active conversation
    pub fn typing(&self) -> &TypingTracker {
        &self.typing
    }

    /// Synchronous snapshot of the conversation summaries
    pub fn current_summaries(&self) -> Vec<ConversationSummary> {
        self.summaries.borrow().clone()
    }

    /// Synchronous snapshot of the active conversation's messages
    pub fn current_messages(&self) -> Vec<ChatMessage> {
        self.messages.borrow().clone()
    }

    /// Unread count for one conversation
    pub fn unread_count_for(&self, chat_id: &str) -> u32 {
        self.summaries
            .borrow()
            .iter()
            .find(|s| s.chat_id == chat_id)
            .map_or(0, |s| s.unread_count)
    }

    /// Total unread count across all conversations
    pub fn total_unread_count(&self) -> u32 {
        self.summaries.borrow().iter().map(|s| s.unread_count).sum()
    }

    /// Subscribe to summary list changes
    pub fn subscribe_summaries(&self) -> watch::Receiver<Vec<ConversationSummary>> {
        self.summaries.subscribe()
    }

    /// Subscribe to active-conversation message changes
    pub fn subscribe_messages(&self) -> watch::Receiver<Vec<ChatMessage>> {
        self.messages.subscribe()
    }

    /// Subscribe to the "surface chat UI" signal
    pub fn subscribe_surface(&self) -> broadcast::Receiver<()> {
        self.surface.subscribe()
    }

    /// Subscribe to upload failures
    pub fn subscribe_upload_errors(&self) -> broadcast::Receiver<UploadError> {
        self.upload_errors.subscribe()
    }

    /// Drop all local state; called on session end
    pub async fn reset(&self) {
        self.active.lock().await.take();
        self.summaries.send_replace(Vec::new());
        self.messages.send_replace(Vec::new());
        self.typing.clear();
        debug!("Chat cache reset");
    }

    /// Reload the summary list when a delta names a conversation the local
    /// list has never seen. Returns true when a reload was triggered; the
    /// reload itself replaces and re-sorts the list.
    async fn reload_for_unknown(&self, chat_id: &str) -> bool {
        let known = self.summaries.borrow().iter().any(|s| s.chat_id == chat_id);
        if known {
            return false;
        }
        info!(chat_id, "Delta for unknown conversation, reloading list");
        if let Err(e) = self.load_conversation_list().await {
            warn!(error = %e, "Conversation list reload failed");
        }
        true
    }

    fn signal_surface(&self) {
        // No receivers is fine; the signal is advisory
        let _ = self.surface.send(());
    }

    fn emit_upload_error(&self, error: UploadError) {
        warn!(error = %error, "Chat upload failed");
        let _ = self.upload_errors.send(error);
    }

    fn resort(&self) {
        self.summaries.send_modify(|list| {
            list.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        });
    }
}
