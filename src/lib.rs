//! Marketwire - real-time sync client for a B2B marketplace backend
//!
//! This library maintains local, observable mirrors of server-side
//! notification and chat state over a single persistent WebSocket
//! connection, with REST side-channels for history retrieval and
//! file upload. It is the non-UI core of the marketplace front-end:
//! UI layers subscribe to the caches exposed here and never talk to
//! the socket directly.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod chat;
pub mod chime;
pub mod client;
pub mod connection;
pub mod dispatcher;
pub mod notifications;
pub mod protocol;
pub mod rest;
pub mod session;
pub mod typing;

#[cfg(test)]
mod tests;

/// Result type alias for Marketwire operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Marketwire operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transport layer error
    #[error("Transport error: {0}")]
    Transport(String),

    /// WebSocket protocol error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// REST request error
    #[error("REST error: {0}")]
    Rest(#[from] reqwest::Error),

    /// Missing access credential for an authenticated call
    #[error("Credential error: {0}")]
    Credential(String),

    /// File upload rejected (oversized, disallowed type, or server refusal)
    #[error("Upload error: {0}")]
    Upload(String),
}

/// Initialize the Marketwire library with logging
pub fn init() {
    tracing_subscriber::fmt::init();
}
