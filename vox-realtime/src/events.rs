//! Event types exchanged with the transport.
//!
//! These are provider-neutral. A transport translates its wire format into
//! [`InboundEvent`]s and [`OutboundEvent`]s into its wire format; the session
//! only ever sees these types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Events received from the remote model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    /// The server confirmed the session setup.
    Opened,

    /// A chunk of synthesized speech as base64 PCM16.
    Audio {
        /// Base64-encoded PCM16 little-endian samples.
        data: String,
    },

    /// Partial transcript of the model's speech.
    OutputTranscript {
        /// Text fragment to append.
        text: String,
    },

    /// Partial transcript of the user's speech.
    InputTranscript {
        /// Text fragment to append.
        text: String,
    },

    /// The model finished its turn.
    TurnComplete,

    /// The user started speaking over the model.
    Interrupted,

    /// The model asks for one or more function calls.
    ToolCall {
        /// Calls to execute, each answered independently.
        calls: Vec<ToolCall>,
    },

    /// The transport was closed by the remote side.
    Closed {
        /// Close reason, if one was given.
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    /// The transport failed.
    Error {
        /// Human-readable error message.
        message: String,
    },
}

/// Events sent to the remote model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundEvent {
    /// A chunk of microphone audio.
    RealtimeAudio {
        /// MIME type, e.g. `audio/pcm;rate=16000`.
        mime_type: String,
        /// Base64-encoded PCM16 little-endian samples.
        data: String,
    },

    /// The answer to a tool call.
    ToolResponse(ToolResponse),
}

/// A function call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID (used for responses).
    pub id: String,
    /// Tool/function name.
    pub name: String,
    /// Arguments as JSON.
    #[serde(default)]
    pub args: Value,
}

impl ToolCall {
    /// Create a new tool call.
    pub fn new(id: impl Into<String>, name: impl Into<String>, args: Value) -> Self {
        Self { id: id.into(), name: name.into(), args }
    }
}

/// Payload of a tool response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Success message, or `Error: ...`.
    pub result: String,
}

/// A tool response correlated to its call by `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResponse {
    /// The call ID being responded to.
    pub id: String,
    /// Name of the function that was called.
    pub name: String,
    /// The outcome.
    pub response: ToolResult,
}

/// Prefix marking a failed tool result.
pub const ERROR_PREFIX: &str = "Error: ";

impl ToolResponse {
    /// A successful response.
    pub fn success(call: &ToolCall, message: impl Into<String>) -> Self {
        Self {
            id: call.id.clone(),
            name: call.name.clone(),
            response: ToolResult { result: message.into() },
        }
    }

    /// An error-shaped response.
    pub fn error(call: &ToolCall, message: impl std::fmt::Display) -> Self {
        Self {
            id: call.id.clone(),
            name: call.name.clone(),
            response: ToolResult { result: format!("{ERROR_PREFIX}{message}") },
        }
    }

    /// Whether this response reports a failure.
    pub fn is_error(&self) -> bool {
        self.response.result.starts_with(ERROR_PREFIX)
    }
}
