//! Error types for voice sessions.

use thiserror::Error;

/// Result type for realtime operations.
pub type Result<T> = std::result::Result<T, RealtimeError>;

/// Errors that can occur while running a voice session.
///
/// Only [`DeviceAccess`](Self::DeviceAccess) and
/// [`TransportOpen`](Self::TransportOpen) ever reach the caller of
/// `connect()`. Everything else is absorbed inside the session and reported
/// through logs and the status callback.
#[derive(Error, Debug)]
pub enum RealtimeError {
    /// Microphone or speaker unavailable or permission denied.
    #[error("Device access error: {0}")]
    DeviceAccess(String),

    /// Connection refused or handshake failure.
    #[error("Transport open error: {0}")]
    TransportOpen(String),

    /// Failure on an established connection.
    #[error("Transport error: {0}")]
    TransportRuntime(String),

    /// A single audio chunk could not be decoded or scheduled.
    #[error("Playback decode error: {0}")]
    PlaybackDecode(String),

    /// A tool action failed.
    #[error("Action error: {0}")]
    Action(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// `connect()` called while a session is still open.
    #[error("A session is already open")]
    AlreadyConnected,

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RealtimeError {
    /// Create a new device access error.
    pub fn device<S: Into<String>>(msg: S) -> Self {
        Self::DeviceAccess(msg.into())
    }

    /// Create a new transport open error.
    pub fn transport_open<S: Into<String>>(msg: S) -> Self {
        Self::TransportOpen(msg.into())
    }

    /// Create a new runtime transport error.
    pub fn transport<S: Into<String>>(msg: S) -> Self {
        Self::TransportRuntime(msg.into())
    }

    /// Create a new playback decode error.
    pub fn decode<S: Into<String>>(msg: S) -> Self {
        Self::PlaybackDecode(msg.into())
    }

    /// Create a new action error.
    pub fn action<S: Into<String>>(msg: S) -> Self {
        Self::Action(msg.into())
    }

    /// Create a new configuration error.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// The message without the category prefix.
    pub fn detail(&self) -> String {
        match self {
            Self::DeviceAccess(msg)
            | Self::TransportOpen(msg)
            | Self::TransportRuntime(msg)
            | Self::PlaybackDecode(msg)
            | Self::Action(msg)
            | Self::Config(msg) => msg.clone(),
            other => other.to_string(),
        }
    }

    /// Whether this error is one of the ways `connect()` can fail.
    pub fn is_connect_failure(&self) -> bool {
        matches!(self, Self::DeviceAccess(_) | Self::TransportOpen(_))
    }
}
