//! Audio cue module
//!
//! The notification chime is a best-effort collaborator: playback failures
//! are swallowed by the implementation and never reach the caches.

/// Best-effort audio cue played on new notifications and chat messages
pub trait Chime: Send + Sync {
    /// Play the cue. Implementations must not panic or block; failures
    /// should be logged and swallowed.
    fn play(&self);
}

/// No-op chime for headless embedding and tests
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentChime;

impl Chime for SilentChime {
    fn play(&self) {}
}
