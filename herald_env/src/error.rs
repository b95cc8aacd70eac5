//! Error types for the Herald environment abstraction.

use thiserror::Error;

/// Errors raised when talking to tasks spawned on a context.
#[derive(Debug, Error)]
pub enum EnvError {
    /// The other end of a task channel has gone away
    #[error("Channel closed: {0}")]
    ChannelClosed(String),
}

impl EnvError {
    /// Creates a channel-closed error.
    pub fn closed(channel: impl Into<String>) -> Self {
        Self::ChannelClosed(channel.into())
    }
}
