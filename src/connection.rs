//! Real-time connection module
//!
//! This module owns the single persistent socket connection to the
//! backend's real-time endpoint:
//! - Lazily-activated connection with idempotent `connect()`
//! - Authentication handshake with a single bounded retry
//! - Constant-delay auto-reconnect and bidirectional heartbeats
//! - Fire-and-forget publishing with an explicit best-effort marker

use crate::protocol::{topics, AuthPayload, Command, Frame};
use crate::session::AuthProvider;
use crate::Result;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Bytes, Message};
use tracing::{debug, error, info, warn};

/// Lifecycle state of the real-time connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No active connection
    Disconnected,
    /// Transport activation or handshake in progress
    Connecting,
    /// Subscribed and usable
    Connected,
}

/// Outcome of a fire-and-forget send.
///
/// Local state is a best-effort mirror, not a source of truth: `Published`
/// means the command was handed to the transport, never that the server
/// processed it. No queuing or retry-on-reconnect is performed for
/// `Dropped` sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BestEffort {
    /// Command was handed to the active transport
    Published,
    /// Command was skipped (connection down or payload unserializable)
    Dropped,
}

impl BestEffort {
    /// Whether the command reached the transport
    pub fn was_published(self) -> bool {
        self == BestEffort::Published
    }
}

/// Channels bridging one activated transport session.
///
/// The inbound receiver closing signals that the underlying socket
/// is gone and a reconnect attempt is due.
pub struct TransportLink {
    /// Outbound command sink; dropping it closes the socket gracefully
    pub commands: mpsc::Sender<Command>,
    /// Inbound frame stream, FIFO per destination
    pub frames: mpsc::Receiver<Frame>,
}

/// Activatable socket transport.
///
/// Production code uses [`WebSocketTransport`]; tests inject fakes to
/// observe activation counts and feed frames.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the underlying socket and return its channel pair
    async fn activate(&self) -> Result<TransportLink>;
}

/// WebSocket transport speaking one JSON document per text frame
pub struct WebSocketTransport {
    url: String,
    heartbeat: Duration,
}

impl WebSocketTransport {
    /// Default interval between outbound heartbeat pings
    pub const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(10);

    /// Create a transport for the given real-time endpoint URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            heartbeat: Self::DEFAULT_HEARTBEAT,
        }
    }

    /// Override the heartbeat interval
    pub fn with_heartbeat(mut self, heartbeat: Duration) -> Self {
        self.heartbeat = heartbeat;
        self
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn activate(&self) -> Result<TransportLink> {
        let (socket, _response) = connect_async(self.url.as_str()).await?;
        debug!(url = %self.url, "WebSocket established");

        let (mut sink, mut stream) = socket.split();
        let (command_tx, mut command_rx) = mpsc::channel::<Command>(64);
        let (frame_tx, frame_rx) = mpsc::channel::<Frame>(64);

        // Writer: serialize outbound commands and keep the socket warm
        let heartbeat = self.heartbeat;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(heartbeat);
            loop {
                tokio::select! {
                    command = command_rx.recv() => match command {
                        Some(command) => {
                            let text = match serde_json::to_string(&command) {
                                Ok(text) => text,
                                Err(e) => {
                                    warn!(error = %e, "Dropping unserializable command");
                                    continue;
                                }
                            };
                            if sink.send(Message::Text(text.into())).await.is_err() {
                                break;
                            }
                        }
                        None => {
                            let _ = sink.send(Message::Close(None)).await;
                            break;
                        }
                    },
                    _ = ticker.tick() => {
                        if sink.send(Message::Ping(Bytes::new())).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        // Reader: decode frame envelopes; inbound pings are answered by
        // the library. Dropping frame_tx on exit closes the link.
        tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                match message {
                    Ok(Message::Text(text)) => match serde_json::from_str::<Frame>(&text) {
                        Ok(frame) => {
                            if frame_tx.send(frame).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!(error = %e, "Dropping malformed frame envelope"),
                    },
                    Ok(Message::Close(_)) => {
                        debug!("Server closed the WebSocket");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "WebSocket read failed");
                        break;
                    }
                }
            }
        });

        Ok(TransportLink {
            commands: command_tx,
            frames: frame_rx,
        })
    }
}

/// Tunables for the connection lifecycle
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Constant delay between reconnect attempts (no exponential backoff)
    pub reconnect_delay: Duration,
    /// Window to wait for the authentication acknowledgment before the
    /// single retry
    pub auth_ack_window: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(5),
            auth_ack_window: Duration::from_secs(3),
        }
    }
}

struct ConnectionInner {
    transport: Arc<dyn Transport>,
    auth: Arc<dyn AuthProvider>,
    config: ConnectionConfig,
    state_tx: watch::Sender<ConnectionState>,
    commands: Mutex<Option<mpsc::Sender<Command>>>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
    frames_tx: mpsc::Sender<Frame>,
}

/// Owner of the single logical real-time connection for a session.
///
/// Cheap to clone; clones share the same underlying connection. The
/// manager is explicitly constructed and injected into the caches that
/// publish through it; there is no process-wide singleton. Callers
/// observe connection health only via [`ConnectionState`] - transport
/// errors never surface as exceptions.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl Connection {
    /// Create a connection manager.
    ///
    /// Returns the manager plus the inbound frame stream the dispatcher
    /// consumes. Frames are forwarded in transport delivery order; the
    /// authentication acknowledgment is consumed internally.
    pub fn new(
        transport: Arc<dyn Transport>,
        auth: Arc<dyn AuthProvider>,
        config: ConnectionConfig,
    ) -> (Self, mpsc::Receiver<Frame>) {
        let (frames_tx, frames_rx) = mpsc::channel(256);
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);

        let connection = Self {
            inner: Arc::new(ConnectionInner {
                transport,
                auth,
                config,
                state_tx,
                commands: Mutex::new(None),
                supervisor: Mutex::new(None),
                frames_tx,
            }),
        };
        (connection, frames_rx)
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        *self.inner.state_tx.borrow()
    }

    /// Subscribe to connection state changes
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Open the real-time connection.
    ///
    /// No-op when already connected or an attempt is in flight. A missing
    /// access credential is a fatal precondition for this session: the
    /// failure is logged and the call returns without retrying.
    pub async fn connect(&self) {
        let mut supervisor = self.inner.supervisor.lock().await;
        if supervisor.as_ref().is_some_and(|task| !task.is_finished()) {
            debug!("connect() ignored: connection already active or in flight");
            return;
        }

        if self.inner.auth.access_token().is_none() || self.inner.auth.user_email().is_none() {
            error!("Cannot open real-time connection: no access credential available");
            return;
        }

        let connection = self.clone();
        *supervisor = Some(tokio::spawn(async move {
            connection.run().await;
        }));
    }

    /// Close the real-time connection.
    ///
    /// Dependent caches are not cleared here; session-lifecycle logic
    /// owns that via [`crate::session::SessionEvents`].
    pub async fn disconnect(&self) {
        if let Some(task) = self.inner.supervisor.lock().await.take() {
            task.abort();
        }
        // Dropping the command sender lets the writer close the socket
        self.inner.commands.lock().await.take();
        self.inner
            .state_tx
            .send_replace(ConnectionState::Disconnected);
        info!("Real-time connection closed");
    }

    /// Publish a payload to an application destination, fire-and-forget
    pub async fn publish<T: Serialize>(&self, destination: &str, payload: &T) -> BestEffort {
        let payload = match serde_json::to_value(payload) {
            Ok(value) => value,
            Err(e) => {
                warn!(destination, error = %e, "Dropping unserializable outbound payload");
                return BestEffort::Dropped;
            }
        };
        self.send(Command::Publish {
            destination: destination.to_string(),
            payload,
        })
        .await
    }

    /// Start receiving frames for a destination
    pub async fn subscribe_topic(&self, destination: &str) -> BestEffort {
        self.send(Command::Subscribe {
            destination: destination.to_string(),
        })
        .await
    }

    /// Stop receiving frames for a destination.
    ///
    /// Immediate, with no drain period: frames already in flight for the
    /// destination are dropped by the dispatcher.
    pub async fn unsubscribe_topic(&self, destination: &str) -> BestEffort {
        self.send(Command::Unsubscribe {
            destination: destination.to_string(),
        })
        .await
    }

    /// Abort the supervisor task without awaiting, for teardown paths
    /// (such as `Drop`) that cannot call [`Connection::disconnect`]
    pub(crate) fn abort_supervisor(&self) {
        if let Ok(mut supervisor) = self.inner.supervisor.try_lock() {
            if let Some(task) = supervisor.take() {
                task.abort();
            }
        }
    }

    async fn send(&self, command: Command) -> BestEffort {
        let guard = self.inner.commands.lock().await;
        let Some(commands) = guard.as_ref() else {
            warn!("Command skipped: real-time connection is down");
            return BestEffort::Dropped;
        };
        if commands.send(command).await.is_err() {
            warn!("Command skipped: transport channel closed");
            return BestEffort::Dropped;
        }
        BestEffort::Published
    }

    /// Connection supervisor: activate, handshake, pump frames, and retry
    /// with a constant delay until aborted by `disconnect()`.
    async fn run(&self) {
        loop {
            let credentials = (
                self.inner.auth.access_token(),
                self.inner.auth.user_email(),
            );
            let (Some(token), Some(email)) = credentials else {
                error!("Real-time session lost its access credential, giving up");
                self.inner
                    .state_tx
                    .send_replace(ConnectionState::Disconnected);
                return;
            };

            self.inner
                .state_tx
                .send_replace(ConnectionState::Connecting);
            match self.inner.transport.activate().await {
                Ok(link) => {
                    if self.run_session(link, &token, &email).await {
                        // Dispatcher side was dropped; stop reconnecting
                        self.inner
                            .state_tx
                            .send_replace(ConnectionState::Disconnected);
                        return;
                    }
                    warn!("Real-time connection lost");
                }
                Err(e) => warn!(error = %e, "Real-time connection attempt failed"),
            }

            self.inner
                .state_tx
                .send_replace(ConnectionState::Disconnected);
            tokio::time::sleep(self.inner.config.reconnect_delay).await;
        }
    }

    /// Drive one activated transport session until it ends.
    ///
    /// Returns true when the frame consumer disappeared and the supervisor
    /// should stop instead of reconnecting.
    async fn run_session(&self, link: TransportLink, token: &str, email: &str) -> bool {
        let TransportLink {
            commands,
            mut frames,
        } = link;

        // Subscribe both user queues before marking the connection usable
        for destination in [topics::NOTIFICATIONS, topics::CHAT_UPDATES] {
            let subscribe = Command::Subscribe {
                destination: destination.to_string(),
            };
            if commands.send(subscribe).await.is_err() {
                warn!("Transport closed before subscriptions completed");
                return false;
            }
        }

        *self.inner.commands.lock().await = Some(commands.clone());
        self.inner.state_tx.send_replace(ConnectionState::Connected);
        info!("Real-time connection established");

        self.authenticate(&commands, &mut frames, token, email)
            .await;

        let consumer_gone = loop {
            match frames.recv().await {
                Some(frame) if frame.destination == topics::AUTH_ACK => continue,
                Some(frame) => {
                    if self.inner.frames_tx.send(frame).await.is_err() {
                        break true;
                    }
                }
                None => break false,
            }
        };

        self.inner.commands.lock().await.take();
        consumer_gone
    }

    /// Send the authentication payload and wait for its acknowledgment
    /// within a short window, retrying the send exactly once. An
    /// unacknowledged handshake is logged, never surfaced.
    async fn authenticate(
        &self,
        commands: &mpsc::Sender<Command>,
        frames: &mut mpsc::Receiver<Frame>,
        token: &str,
        email: &str,
    ) {
        let payload = AuthPayload {
            token: token.to_string(),
            email: email.to_string(),
        };

        for attempt in 0..2u8 {
            let value = match serde_json::to_value(&payload) {
                Ok(value) => value,
                Err(e) => {
                    warn!(error = %e, "Authentication payload failed to serialize");
                    return;
                }
            };
            let publish = Command::Publish {
                destination: topics::AUTH.to_string(),
                payload: value,
            };
            if commands.send(publish).await.is_err() {
                warn!("Transport closed during authentication");
                return;
            }

            let window = self.inner.config.auth_ack_window;
            match tokio::time::timeout(window, self.forward_until_ack(frames)).await {
                Ok(true) => {
                    debug!("Authentication acknowledged");
                    return;
                }
                Ok(false) => return, // link closed; supervisor reconnects
                Err(_) if attempt == 0 => {
                    warn!("No authentication ack within window, retrying once")
                }
                Err(_) => warn!("Authentication unacknowledged after retry"),
            }
        }
    }

    /// Forward non-ack frames to the dispatcher until the ack arrives.
    /// Returns false when the link closed first.
    async fn forward_until_ack(&self, frames: &mut mpsc::Receiver<Frame>) -> bool {
        while let Some(frame) = frames.recv().await {
            if frame.destination == topics::AUTH_ACK {
                return true;
            }
            let _ = self.inner.frames_tx.send(frame).await;
        }
        false
    }
}
