//! Error types for the broadcast engine.

use herald_env::EnvError;
use thiserror::Error;

use crate::model::{BroadcastId, BroadcastStatus, SegmentId};

/// Request rejected at creation time. Nothing is stored.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Title must not be empty")]
    EmptyTitle,

    #[error("Message content must not be empty")]
    EmptyContent,

    #[error("No {0} selected")]
    EmptySelection(&'static str),
}

/// Audience resolution failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AudienceError {
    #[error("Unknown segment: {0}")]
    UnknownSegment(SegmentId),
}

/// Configuration loading / validation failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Engine-level errors.
#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Broadcast not found: {0}")]
    NotFound(BroadcastId),

    #[error("Broadcast {id}: invalid transition {from} -> {to}")]
    InvalidTransition {
        id: BroadcastId,
        from: BroadcastStatus,
        to: BroadcastStatus,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Environment error: {0}")]
    Env(#[from] EnvError),
}
