//! Error types for the relay.

use std::time::Duration;

/// Top-level error type for the relay.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Inference error: {0}")]
    Inference(#[from] InferenceError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Transport errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} disconnected: {reason}")]
    Disconnected { name: String, reason: String },

    #[error("Failed to receive on channel {name}: {reason}")]
    ReceiveFailed { name: String, reason: String },

    #[error("Failed to send on channel {name} (topic {topic}): {reason}")]
    SendFailed {
        name: String,
        topic: String,
        reason: String,
    },

    #[error("Authentication failed for channel {name}: {reason}")]
    AuthFailed { name: String, reason: String },

    #[error("Channel {name} is closed")]
    Closed { name: String },
}

impl ChannelError {
    /// Whether this error means the transport is gone and the loop must stop.
    ///
    /// Everything else only affects the message being handled.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Disconnected { .. } | Self::AuthFailed { .. } | Self::Closed { .. }
        )
    }
}

/// Inference backend errors.
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("Backend {backend} request failed: {reason}")]
    RequestFailed { backend: String, reason: String },

    #[error("Backend {backend} timed out after {timeout:?}")]
    Timeout { backend: String, timeout: Duration },

    #[error("Backend {backend} returned an empty response")]
    EmptyResponse { backend: String },

    #[error("Failed to create backend {backend}: {reason}")]
    ClientCreation { backend: String, reason: String },
}

/// Moderation engine errors.
#[derive(Debug, thiserror::Error)]
pub enum ModerationError {
    #[error("Moderation engine unavailable: {0}")]
    Unavailable(String),

    #[error("Moderation check failed: {0}")]
    CheckFailed(String),

    #[error("Invalid moderation rule {pattern}: {source}")]
    InvalidRule {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Result type alias for the relay.
pub type Result<T> = std::result::Result<T, Error>;
