//! Session module
//!
//! This module defines the seams to the authentication service and the
//! explicit session-lifecycle broadcast:
//! - `AuthProvider` exposes the current access credential and user identity
//! - `SessionEvents` broadcasts session teardown so every cache resets
//!   itself, instead of relying on incidental ordering between services

use tokio::sync::broadcast;

/// Provider of the current access credential and user identity.
///
/// Implemented by the host application's authentication layer. Both
/// accessors return `None` when no user is signed in.
pub trait AuthProvider: Send + Sync {
    /// Current access token, if a session is active
    fn access_token(&self) -> Option<String>;

    /// Email of the signed-in user, if a session is active
    fn user_email(&self) -> Option<String>;
}

/// Fixed credentials, for tests and single-session tooling
#[derive(Debug, Clone)]
pub struct StaticCredentials {
    token: String,
    email: String,
}

impl StaticCredentials {
    /// Create a provider that always returns the given credentials
    pub fn new(token: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            email: email.into(),
        }
    }
}

impl AuthProvider for StaticCredentials {
    fn access_token(&self) -> Option<String> {
        Some(self.token.clone())
    }

    fn user_email(&self) -> Option<String> {
        Some(self.email.clone())
    }
}

/// Session lifecycle event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// The user session ended (logout); caches must reset
    Ended,
}

/// Broadcast channel for session lifecycle events
#[derive(Debug, Clone)]
pub struct SessionEvents {
    tx: broadcast::Sender<SessionEvent>,
}

impl SessionEvents {
    /// Create a new session event broadcaster
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(8);
        Self { tx }
    }

    /// Subscribe to session lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Announce that the session has ended
    pub fn end(&self) {
        // No receivers is fine; nothing to reset then
        let _ = self.tx.send(SessionEvent::Ended);
    }
}

impl Default for SessionEvents {
    fn default() -> Self {
        Self::new()
    }
}
