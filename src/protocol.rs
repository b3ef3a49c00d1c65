//! Wire protocol module
//!
//! This module defines the message protocol spoken over the real-time
//! connection and the REST side-channel, including:
//! - Frame envelope and outbound command structures
//! - Destination/topic naming
//! - Inbound event payloads (notifications, chat updates, chat messages)
//! - Timestamp normalization across the three shapes the backend emits

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Numeric epoch values below this threshold are interpreted as seconds,
/// values at or above it as milliseconds.
pub const EPOCH_MILLIS_THRESHOLD: i64 = 10_000_000_000;

/// Destination names for inbound subscriptions and outbound publishes.
///
/// Inbound destinations are user-scoped queues pushed by the backend;
/// outbound destinations are application endpoints the client publishes to.
pub mod topics {
    /// Inbound queue carrying notification snapshots and pushes
    pub const NOTIFICATIONS: &str = "/user/queue/notifications";
    /// Inbound queue carrying conversation-summary deltas
    pub const CHAT_UPDATES: &str = "/user/queue/chat-updates";
    /// Inbound queue carrying the authentication acknowledgment
    pub const AUTH_ACK: &str = "/user/queue/auth";

    /// Outbound authentication endpoint
    pub const AUTH: &str = "/app/auth";
    /// Outbound mark-single-notification-read endpoint
    pub const NOTIFICATION_READ: &str = "/app/notifications/read";
    /// Outbound mark-all-notifications-read endpoint
    pub const NOTIFICATION_READ_ALL: &str = "/app/notifications/read-all";

    /// Inbound per-conversation topic (subscribed only while the
    /// conversation is active)
    pub fn conversation(chat_id: &str) -> String {
        format!("/topic/chats/{chat_id}")
    }

    /// Outbound send-message endpoint for one conversation
    pub fn chat_send(chat_id: &str) -> String {
        format!("/app/chats/{chat_id}/send")
    }

    /// Outbound typing-indicator endpoint for one conversation
    pub fn chat_typing(chat_id: &str) -> String {
        format!("/app/chats/{chat_id}/typing")
    }

    /// Outbound mark-conversation-read endpoint
    pub fn chat_read(chat_id: &str) -> String {
        format!("/app/chats/{chat_id}/read")
    }
}

/// One inbound push frame: a single JSON document per socket text message,
/// scoped to the destination it was pushed on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    /// Destination/topic the frame was delivered on
    pub destination: String,
    /// Raw payload, decoded further by the dispatcher
    pub payload: serde_json::Value,
}

/// Outbound command sent to the backend over the socket
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Command {
    /// Start receiving frames for a destination
    Subscribe {
        /// Destination to subscribe
        destination: String,
    },
    /// Stop receiving frames for a destination (immediate, no drain)
    Unsubscribe {
        /// Destination to unsubscribe
        destination: String,
    },
    /// Publish a payload to an application endpoint
    Publish {
        /// Target endpoint
        destination: String,
        /// JSON body
        payload: serde_json::Value,
    },
}

/// A server timestamp normalized to UTC.
///
/// The backend emits timestamps in three shapes: ISO-8601 strings, epoch
/// seconds, and epoch milliseconds. All three deserialize into this type;
/// numeric values below [`EPOCH_MILLIS_THRESHOLD`] are treated as seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "TimestampRepr", into = "String")]
pub struct Timestamp(pub DateTime<Utc>);

#[derive(Deserialize)]
#[serde(untagged)]
enum TimestampRepr {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl Timestamp {
    /// Current time
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Normalize a numeric epoch value (seconds or milliseconds)
    pub fn from_epoch(value: i64) -> Self {
        let millis = if value.abs() < EPOCH_MILLIS_THRESHOLD {
            value.saturating_mul(1000)
        } else {
            value
        };
        Self(Utc.timestamp_millis_opt(millis).single().unwrap_or_default())
    }

    /// The normalized UTC instant
    pub fn as_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

impl TryFrom<TimestampRepr> for Timestamp {
    type Error = String;

    fn try_from(repr: TimestampRepr) -> std::result::Result<Self, Self::Error> {
        match repr {
            TimestampRepr::Integer(n) => Ok(Self::from_epoch(n)),
            TimestampRepr::Float(f) => Ok(Self::from_epoch(f as i64)),
            TimestampRepr::Text(s) => s
                .parse::<DateTime<Utc>>()
                .map(Self)
                .map_err(|e| format!("Invalid timestamp '{}': {}", s, e)),
        }
    }
}

impl From<Timestamp> for String {
    fn from(ts: Timestamp) -> Self {
        ts.0.to_rfc3339()
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }
}

/// Notification category pushed by the backend
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    /// A new business request was posted in one of the user's industries
    NewRequestInIndustry,
    /// Someone responded to a request owned by the user
    ResponseToMyRequest,
    /// The user's response was chosen by the request owner
    MyResponseChosen,
    /// A request the user follows changed status
    RequestStatusChanged,
    /// A new company registered in one of the user's industries
    CompanyCreatedInIndustry,
}

/// One server-originated notification record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Unique notification identifier
    pub id: i64,
    /// Human-readable title
    pub title: String,
    /// Navigation target for the notification
    pub url: String,
    /// Notification category
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    /// Identifier of the request/company/response the notification refers to
    pub reference_id: String,
    /// Creation time
    pub created_at: Timestamp,
    /// Whether the user has read this notification
    pub is_read: bool,
    /// Device tag the notification originated from, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
}

/// Discriminated notification-channel event.
///
/// Every frame on the notifications queue carries an explicit `kind`
/// discriminator, so snapshots and incremental pushes are distinguished
/// by tag rather than by payload shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum NotificationEvent {
    /// Full-state replacement of the notification list
    Snapshot(Vec<Notification>),
    /// A single newly created notification
    Push(Notification),
}

/// Kind of conversation-summary delta
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChatUpdateKind {
    /// A message arrived in the conversation
    NewMessage,
    /// A peer started or stopped typing
    Typing,
    /// The other party read the conversation
    MessageRead,
    /// A new conversation was created for the user
    ChatCreated,
}

/// Lightweight conversation-summary delta pushed on the chat-updates queue
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatUpdate {
    /// Conversation identifier the delta applies to
    pub chat_id: String,
    /// Preview of the triggering message, when present
    #[serde(default)]
    pub message_preview: Option<String>,
    /// Display name of the sender, when present
    #[serde(default)]
    pub sender_name: Option<String>,
    /// Email of the sender, when present
    #[serde(default)]
    pub sender_email: Option<String>,
    /// Time of the triggering event
    pub timestamp: Timestamp,
    /// Server-computed unread count, when the backend includes it
    #[serde(default)]
    pub unread_count: Option<u32>,
    /// Delta kind
    pub update_type: ChatUpdateKind,
}

/// Kind of chat message
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Plain text message
    #[default]
    Text,
    /// Message carrying a generic file attachment
    File,
    /// Message carrying an image attachment
    Image,
}

/// Wire shape of one chat message, as delivered on a per-conversation
/// topic or returned by the REST history endpoint.
///
/// File metadata arrives as flat optional fields; [`crate::chat::ChatMessage`]
/// derives a structured attachment from them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessagePayload {
    /// Server-assigned identifier, absent until persisted
    #[serde(default)]
    pub id: Option<i64>,
    /// Message text, absent for file-only messages
    #[serde(default)]
    pub message: Option<String>,
    /// Sender display name
    pub sender_name: String,
    /// Sender email
    pub sender_email: String,
    /// Send time (ISO string or numeric epoch, both accepted)
    pub timestamp: Timestamp,
    /// Whether the message has been read
    #[serde(default)]
    pub is_read: bool,
    /// Message kind, defaulting to text when omitted
    #[serde(default)]
    pub message_type: Option<MessageKind>,
    /// Attachment file name
    #[serde(default)]
    pub file_name: Option<String>,
    /// Attachment download URL
    #[serde(default)]
    pub file_url: Option<String>,
    /// Attachment MIME type
    #[serde(default)]
    pub file_type: Option<String>,
    /// Attachment size in bytes
    #[serde(default)]
    pub file_size: Option<u64>,
}

/// A peer's transient typing state in the active conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TypingEvent {
    /// Numeric user identifier, when the backend includes it
    #[serde(default)]
    pub user_id: Option<i64>,
    /// Email of the typing user
    pub user_email: String,
    /// True while composing, false when the peer stopped
    pub is_typing: bool,
}

/// Discriminated per-conversation event (subscribed only while that
/// conversation is active)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum ConversationEvent {
    /// A chat message for the active conversation
    Message(ChatMessagePayload),
    /// A typing-indicator change
    Typing(TypingEvent),
}

/// Outbound authentication payload, published once per successful connection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuthPayload {
    /// Access credential from the token provider
    pub token: String,
    /// Identity derived from the credential
    pub email: String,
}

/// Outbound mark-single-notification-read command
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MarkNotificationRead {
    /// Notification to flag as read
    pub notification_id: i64,
    /// Device tag of this client instance
    pub device: String,
}

/// Outbound mark-all-notifications-read command
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MarkAllRead {
    /// Device tag of this client instance
    pub device: String,
}

/// Outbound chat message body for a conversation-scoped destination
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SendChatMessage {
    /// Message text
    pub message: String,
}

/// Outbound typing indicator for a conversation-scoped destination
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TypingSignal {
    /// True while the local user is composing
    pub is_typing: bool,
}
