//! Client composition module
//!
//! Wires the connection, dispatcher and caches into one owned object the
//! host application embeds. The session-ended broadcast resets every
//! cache explicitly instead of relying on teardown ordering between
//! services.

use crate::chat::{ChatCache, ChatConfig};
use crate::chime::Chime;
use crate::connection::{Connection, ConnectionConfig, ConnectionState, Transport};
use crate::dispatcher::Dispatcher;
use crate::notifications::NotificationCache;
use crate::rest::MarketplaceApi;
use crate::session::{AuthProvider, SessionEvent, SessionEvents};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

/// Tunables for the assembled client
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    /// Connection lifecycle settings
    pub connection: ConnectionConfig,
    /// Chat cache settings
    pub chat: ChatConfig,
    /// Device tag attached to outbound mark-read commands
    pub device: DeviceTag,
}

/// Device tag for outbound commands
#[derive(Debug, Clone)]
pub struct DeviceTag(pub String);

impl Default for DeviceTag {
    fn default() -> Self {
        Self("desktop".to_string())
    }
}

/// Assembled real-time sync client.
///
/// Owns the connection manager, both caches and the background dispatch
/// loop. Dropping the client aborts its background tasks.
pub struct RealtimeClient {
    connection: Connection,
    notifications: Arc<NotificationCache>,
    chat: Arc<ChatCache>,
    session: SessionEvents,
    dispatch_task: JoinHandle<()>,
    reset_task: JoinHandle<()>,
}

impl RealtimeClient {
    /// Assemble a client from its injected collaborators
    pub fn new(
        transport: Arc<dyn Transport>,
        auth: Arc<dyn AuthProvider>,
        api: Arc<dyn MarketplaceApi>,
        chime: Arc<dyn Chime>,
        config: ClientConfig,
    ) -> Self {
        let (connection, frames) = Connection::new(transport, auth, config.connection);
        let notifications = Arc::new(NotificationCache::new(
            connection.clone(),
            Arc::clone(&chime),
            config.device.0,
        ));
        let chat = Arc::new(ChatCache::new(connection.clone(), api, chime, config.chat));

        let dispatcher = Dispatcher::new(Arc::clone(&notifications), Arc::clone(&chat));
        let dispatch_task = tokio::spawn(dispatcher.run(frames));

        let session = SessionEvents::new();
        let mut session_rx = session.subscribe();
        let reset_notifications = Arc::clone(&notifications);
        let reset_chat = Arc::clone(&chat);
        let reset_task = tokio::spawn(async move {
            while let Ok(SessionEvent::Ended) = session_rx.recv().await {
                info!("Session ended, resetting caches");
                reset_notifications.reset();
                reset_chat.reset().await;
            }
        });

        Self {
            connection,
            notifications,
            chat,
            session,
            dispatch_task,
            reset_task,
        }
    }

    /// Open the real-time connection (idempotent)
    pub async fn connect(&self) {
        self.connection.connect().await;
    }

    /// Close the real-time connection without clearing caches
    pub async fn disconnect(&self) {
        self.connection.disconnect().await;
    }

    /// End the user session: disconnect and reset every cache
    pub async fn end_session(&self) {
        self.connection.disconnect().await;
        self.session.end();
    }

    /// Current connection state
    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Subscribe to connection state changes
    pub fn subscribe_connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.connection.subscribe_state()
    }

    /// Connection manager handle
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Notification cache handle
    pub fn notifications(&self) -> &Arc<NotificationCache> {
        &self.notifications
    }

    /// Chat cache handle
    pub fn chat(&self) -> &Arc<ChatCache> {
        &self.chat
    }

    /// Session lifecycle broadcaster
    pub fn session(&self) -> &SessionEvents {
        &self.session
    }
}

impl Drop for RealtimeClient {
    fn drop(&mut self) {
        self.dispatch_task.abort();
        self.reset_task.abort();
        self.connection.abort_supervisor();
    }
}
