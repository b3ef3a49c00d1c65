//! Typing indicator module
//!
//! Transient who-is-typing state for the active conversation. Presence in
//! the set means "currently typing"; entries are removed by explicit stop
//! events, never flagged false. There is no timeout-based expiry: a peer
//! whose stop event is lost keeps typing until the conversation is left
//! or a later event corrects it.

use std::collections::HashSet;
use tokio::sync::watch;

/// Tracker of peers currently typing in the active conversation
#[derive(Debug)]
pub struct TypingTracker {
    typists: watch::Sender<HashSet<String>>,
}

impl TypingTracker {
    /// Create an empty tracker
    pub fn new() -> Self {
        let (typists, _) = watch::channel(HashSet::new());
        Self { typists }
    }

    /// Record a typing event: insert the peer when typing, remove the
    /// entry when the peer stopped
    pub fn set_typing(&self, user_email: &str, is_typing: bool) {
        self.typists.send_modify(|typists| {
            if is_typing {
                typists.insert(user_email.to_string());
            } else {
                typists.remove(user_email);
            }
        });
    }

    /// Whether the given peer is currently typing
    pub fn is_typing(&self, user_email: &str) -> bool {
        self.typists.borrow().contains(user_email)
    }

    /// Snapshot of all peers currently typing
    pub fn current(&self) -> HashSet<String> {
        self.typists.borrow().clone()
    }

    /// Subscribe to typing set changes
    pub fn subscribe(&self) -> watch::Receiver<HashSet<String>> {
        self.typists.subscribe()
    }

    /// Drop all entries; called whenever the active conversation changes
    pub fn clear(&self) {
        self.typists.send_modify(HashSet::clear);
    }
}

impl Default for TypingTracker {
    fn default() -> Self {
        Self::new()
    }
}
