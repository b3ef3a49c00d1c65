//! Shared fakes and fixtures for the test modules

use crate::chat::{ChatCache, ChatConfig, ConversationSummary};
use crate::chime::SilentChime;
use crate::connection::{Connection, ConnectionConfig, Transport, TransportLink};
use crate::notifications::NotificationCache;
use crate::protocol::{
    topics, ChatMessagePayload, ChatUpdate, ChatUpdateKind, Command, Frame, Notification,
    NotificationKind,
};
use crate::rest::{MarketplaceApi, OutgoingFile};
use crate::session::{AuthProvider, StaticCredentials};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

/// Auth provider with no signed-in user
pub struct NoCredentials;

impl AuthProvider for NoCredentials {
    fn access_token(&self) -> Option<String> {
        None
    }

    fn user_email(&self) -> Option<String> {
        None
    }
}

/// In-memory transport recording every activation and outbound command.
///
/// When `auto_ack` is set, a publish to the auth destination is answered
/// with an acknowledgment frame. Tests push inbound frames through
/// `push_frame`.
pub struct ScriptedTransport {
    pub activations: AtomicUsize,
    pub published: Arc<Mutex<Vec<Command>>>,
    frame_tx: Arc<Mutex<Option<mpsc::Sender<Frame>>>>,
    auto_ack: bool,
}

impl ScriptedTransport {
    pub fn new(auto_ack: bool) -> Self {
        Self {
            activations: AtomicUsize::new(0),
            published: Arc::new(Mutex::new(Vec::new())),
            frame_tx: Arc::new(Mutex::new(None)),
            auto_ack,
        }
    }

    pub async fn push_frame(&self, frame: Frame) {
        let guard = self.frame_tx.lock().await;
        let sender = guard.as_ref().expect("transport not activated");
        sender.send(frame).await.expect("link closed");
    }

    pub async fn published_commands(&self) -> Vec<Command> {
        self.published.lock().await.clone()
    }

    /// Whether the inbound side of the activated link has been dropped
    pub async fn link_closed(&self) -> bool {
        self.frame_tx
            .lock()
            .await
            .as_ref()
            .map_or(true, |tx| tx.is_closed())
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn activate(&self) -> Result<TransportLink> {
        self.activations.fetch_add(1, Ordering::SeqCst);

        let (command_tx, mut command_rx) = mpsc::channel::<Command>(64);
        let (frame_tx, frame_rx) = mpsc::channel::<Frame>(64);
        *self.frame_tx.lock().await = Some(frame_tx.clone());

        let published = Arc::clone(&self.published);
        let auto_ack = self.auto_ack;
        tokio::spawn(async move {
            while let Some(command) = command_rx.recv().await {
                let is_auth = matches!(
                    &command,
                    Command::Publish { destination, .. } if destination == topics::AUTH
                );
                published.lock().await.push(command);
                if auto_ack && is_auth {
                    let ack = Frame {
                        destination: topics::AUTH_ACK.to_string(),
                        payload: json!({"status": "ok"}),
                    };
                    let _ = frame_tx.send(ack).await;
                }
            }
        });

        Ok(TransportLink {
            commands: command_tx,
            frames: frame_rx,
        })
    }
}

/// Transport that always fails to activate
pub struct UnreachableTransport;

#[async_trait]
impl Transport for UnreachableTransport {
    async fn activate(&self) -> Result<TransportLink> {
        Err(Error::Transport("no route to backend".to_string()))
    }
}

/// Connection config with short windows so tests stay fast
pub fn fast_config() -> ConnectionConfig {
    ConnectionConfig {
        reconnect_delay: Duration::from_millis(50),
        auth_ack_window: Duration::from_millis(50),
    }
}

pub fn test_credentials() -> Arc<StaticCredentials> {
    Arc::new(StaticCredentials::new("token-123", "me@example.com"))
}

/// Connection that was never opened; publishes through it are dropped
pub fn offline_connection() -> Connection {
    let transport = Arc::new(ScriptedTransport::new(true));
    let (connection, _frames) = Connection::new(transport, test_credentials(), fast_config());
    connection
}

pub fn test_notification_cache() -> NotificationCache {
    NotificationCache::new(offline_connection(), Arc::new(SilentChime), "desktop")
}

/// REST fake serving canned summaries and histories, recording calls
pub struct FakeApi {
    pub summaries: Mutex<Vec<ConversationSummary>>,
    pub histories: Mutex<HashMap<String, Vec<ChatMessagePayload>>>,
    pub list_calls: AtomicUsize,
    pub uploads: Mutex<Vec<(String, Option<String>, usize)>>,
    pub fail_uploads: bool,
}

impl FakeApi {
    pub fn new() -> Self {
        Self {
            summaries: Mutex::new(Vec::new()),
            histories: Mutex::new(HashMap::new()),
            list_calls: AtomicUsize::new(0),
            uploads: Mutex::new(Vec::new()),
            fail_uploads: false,
        }
    }

    pub fn with_summaries(summaries: Vec<ConversationSummary>) -> Self {
        let api = Self::new();
        *api.summaries.try_lock().expect("fresh mutex") = summaries;
        api
    }
}

#[async_trait]
impl MarketplaceApi for FakeApi {
    async fn conversation_list(&self) -> Result<Vec<ConversationSummary>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.summaries.lock().await.clone())
    }

    async fn message_history(&self, chat_id: &str) -> Result<Vec<ChatMessagePayload>> {
        Ok(self
            .histories
            .lock()
            .await
            .get(chat_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn upload_message(
        &self,
        chat_id: &str,
        text: Option<&str>,
        files: &[OutgoingFile],
    ) -> Result<()> {
        if self.fail_uploads {
            return Err(Error::Upload("server said no".to_string()));
        }
        self.uploads
            .lock()
            .await
            .push((chat_id.to_string(), text.map(str::to_string), files.len()));
        Ok(())
    }
}

pub fn test_chat_cache(api: Arc<FakeApi>) -> ChatCache {
    let config = ChatConfig {
        mark_read_delay: Duration::from_millis(10),
    };
    ChatCache::new(offline_connection(), api, Arc::new(SilentChime), config)
}

pub fn at(epoch_secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(epoch_secs, 0).unwrap()
}

pub fn notification(id: i64, created_at: DateTime<Utc>, is_read: bool) -> Notification {
    Notification {
        id,
        title: format!("Notification {id}"),
        url: format!("/requests/{id}"),
        kind: NotificationKind::NewRequestInIndustry,
        reference_id: id.to_string(),
        created_at: created_at.into(),
        is_read,
        device: None,
    }
}

pub fn summary(chat_id: &str, unread_count: u32, last_activity: DateTime<Utc>) -> ConversationSummary {
    ConversationSummary {
        chat_id: chat_id.to_string(),
        title: format!("Request {chat_id}"),
        last_message: Some("hello".to_string()),
        last_activity: last_activity.into(),
        unread_count,
        counterparty: Some("Acme Oy".to_string()),
        is_read: unread_count == 0,
    }
}

pub fn message_payload(sender_email: &str, text: &str, sent_at: DateTime<Utc>) -> ChatMessagePayload {
    ChatMessagePayload {
        id: None,
        message: Some(text.to_string()),
        sender_name: sender_email.to_string(),
        sender_email: sender_email.to_string(),
        timestamp: sent_at.into(),
        is_read: false,
        message_type: None,
        file_name: None,
        file_url: None,
        file_type: None,
        file_size: None,
    }
}

pub fn new_message_update(
    chat_id: &str,
    unread_count: Option<u32>,
    timestamp: DateTime<Utc>,
) -> ChatUpdate {
    ChatUpdate {
        chat_id: chat_id.to_string(),
        message_preview: Some("new message".to_string()),
        sender_name: Some("Acme Oy".to_string()),
        sender_email: Some("acme@example.com".to_string()),
        timestamp: timestamp.into(),
        unread_count,
        update_type: ChatUpdateKind::NewMessage,
    }
}

pub fn update_of_kind(chat_id: &str, kind: ChatUpdateKind, timestamp: DateTime<Utc>) -> ChatUpdate {
    ChatUpdate {
        chat_id: chat_id.to_string(),
        message_preview: None,
        sender_name: None,
        sender_email: None,
        timestamp: timestamp.into(),
        unread_count: None,
        update_type: kind,
    }
}

pub fn frame(destination: &str, payload: serde_json::Value) -> Frame {
    Frame {
        destination: destination.to_string(),
        payload,
    }
}
