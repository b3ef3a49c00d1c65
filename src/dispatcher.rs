//! Event dispatcher module
//!
//! Fans parsed push frames out to the caches by destination and payload
//! tag. Parse failures are isolated per frame: one malformed payload is
//! logged and dropped without touching state or stalling the loop.

use crate::chat::ChatCache;
use crate::notifications::NotificationCache;
use crate::protocol::{topics, ChatUpdate, ConversationEvent, Frame, NotificationEvent};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Router from inbound frames to the notification cache, chat cache and
/// typing tracker
pub struct Dispatcher {
    notifications: Arc<NotificationCache>,
    chat: Arc<ChatCache>,
}

impl Dispatcher {
    /// Create a dispatcher feeding the given caches
    pub fn new(notifications: Arc<NotificationCache>, chat: Arc<ChatCache>) -> Self {
        Self {
            notifications,
            chat,
        }
    }

    /// Consume the connection's frame stream until it closes
    pub async fn run(self, mut frames: mpsc::Receiver<Frame>) {
        while let Some(frame) = frames.recv().await {
            self.dispatch(frame).await;
        }
        info!("Frame stream closed, dispatcher stopping");
    }

    /// Route one frame by destination and payload shape
    pub async fn dispatch(&self, frame: Frame) {
        if frame.destination == topics::NOTIFICATIONS {
            match serde_json::from_value::<NotificationEvent>(frame.payload) {
                Ok(NotificationEvent::Snapshot(snapshot)) => {
                    self.notifications.load_snapshot(snapshot);
                }
                Ok(NotificationEvent::Push(notification)) => {
                    self.notifications.add_notification(notification);
                }
                Err(e) => warn!(error = %e, "Dropping malformed notification event"),
            }
            return;
        }

        if frame.destination == topics::CHAT_UPDATES {
            match serde_json::from_value::<Vec<ChatUpdate>>(frame.payload) {
                Ok(updates) => {
                    for update in updates {
                        self.chat.apply_update(update).await;
                    }
                }
                Err(e) => warn!(error = %e, "Dropping malformed chat-update batch"),
            }
            return;
        }

        // Per-conversation topics: only the active conversation is
        // subscribed; frames in flight after an unsubscribe are dropped
        let active_topic = self
            .chat
            .active_conversation()
            .await
            .map(|id| topics::conversation(&id));
        if active_topic.as_deref() == Some(frame.destination.as_str()) {
            match serde_json::from_value::<ConversationEvent>(frame.payload) {
                Ok(ConversationEvent::Message(payload)) => {
                    self.chat.append_incoming(payload).await;
                }
                Ok(ConversationEvent::Typing(event)) => {
                    self.chat
                        .typing()
                        .set_typing(&event.user_email, event.is_typing);
                }
                Err(e) => warn!(error = %e, "Dropping malformed conversation event"),
            }
            return;
        }

        debug!(destination = %frame.destination, "Dropping frame for unsubscribed destination");
    }
}
