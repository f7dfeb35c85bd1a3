//! Span helpers for voice session operations
//!
//! Provides pre-configured spans for instrumenting sessions, transport
//! connections and tool calls.

use tracing::Span;

/// Create a span covering one voice session
///
/// # Arguments
/// * `session_id` - Unique ID for this session
/// * `voice` - Output voice selected at connect time
///
/// # Example
/// ```
/// use vox_telemetry::session_span;
/// let span = session_span("9f2c", "Kore");
/// let _enter = span.enter();
/// ```
pub fn session_span(session_id: &str, voice: &str) -> Span {
    tracing::info_span!("voice.session", session.id = session_id, voice = voice)
}

/// Create a span for opening a transport connection
///
/// # Arguments
/// * `provider` - Transport provider (e.g. "gemini")
/// * `model` - Model the session talks to
pub fn transport_open_span(provider: &str, model: &str) -> Span {
    tracing::info_span!("transport.open", provider = provider, model.name = model)
}

/// Create a span for one tool call round-trip
///
/// # Arguments
/// * `tool_name` - Name of the tool being executed
/// * `call_id` - ID correlating the call and its response
///
/// # Example
/// ```
/// use vox_telemetry::tool_dispatch_span;
/// let span = tool_dispatch_span("create_image", "call-1");
/// let _enter = span.enter();
/// ```
pub fn tool_dispatch_span(tool_name: &str, call_id: &str) -> Span {
    tracing::info_span!("tool.dispatch", tool.name = tool_name, call.id = call_id)
}

/// Create a debug-level span for a callback into the caller
///
/// # Arguments
/// * `callback_type` - Which callback fires (e.g., "transcript", "status")
pub fn callback_span(callback_type: &str) -> Span {
    tracing::debug_span!("callback", callback.type = callback_type)
}
