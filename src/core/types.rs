use std::time::Duration;

use thiserror::Error;

use super::state::ConnectionState;

/// Convenience result alias for feed operations.
pub type FeedResult<T> = Result<T, FeedError>;

/// Canonical error surface of the crate.
///
/// Inside the connection manager every transport problem collapses into a
/// `ConnectionLost` close reason; nothing here is fatal to the feed.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Connection lost: {reason}")]
    ConnectionLost { reason: String },

    #[error("Transport error ({context}): {error}")]
    Transport {
        context: &'static str,
        error: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl FeedError {
    /// Close reason reported to the lifecycle hooks.
    pub fn close_reason(&self) -> String {
        match self {
            FeedError::ConnectionLost { reason } => reason.clone(),
            other => other.to_string(),
        }
    }
}

/// Abstract reconnect strategy trait.
pub trait WsReconnectStrategy: Send + Sync + 'static {
    fn next_delay(&mut self) -> Duration;
    fn reset(&mut self);
    fn should_retry(&self) -> bool;
}

/// Read-only view of the manager, returned by `GetFeedStatus`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeedSnapshot {
    pub state: ConnectionState,
    pub attempt_count: u64,
    /// Connect attempts started since the manager was spawned (initial one included).
    pub connects_started: u64,
    pub messages_received: u64,
    pub url: String,
}
