//! The session state machine.
//!
//! [`SessionMachine`] owns the lifecycle state and the transcript buffers and
//! decides, for every inbound event, what the session should do. It performs
//! no I/O: it returns [`SessionAction`]s that the client's session task
//! carries out. This keeps every transition testable without a transport or
//! audio devices.
//!
//! ```text
//!   Idle ──▶ Connecting ──Opened──▶ Active ◀──▶ ToolHandling
//!                │                  │  ▲
//!                │       Interrupted│  │model output
//!                │                  ▼  │
//!                │               Interrupted
//!                │
//!                └──── any state ──close/error──▶ Closing ──▶ Closed
//! ```

use std::fmt;

use crate::error::{RealtimeError, Result};
use crate::events::{InboundEvent, ToolCall};
use crate::pcm;
use crate::transcript::{TranscriptAccumulator, TranscriptUpdate};

/// Lifecycle state of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    /// Nothing started yet.
    #[default]
    Idle,
    /// Devices acquired, waiting for the open confirmation.
    Connecting,
    /// Streaming in both directions.
    Active,
    /// The user spoke over the model; waiting for the model's next output.
    Interrupted,
    /// At least one tool call is in flight.
    ToolHandling,
    /// Tearing down.
    Closing,
    /// Done. Terminal.
    Closed,
}

impl SessionState {
    /// Whether inbound model events are processed in this state.
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Active | Self::Interrupted | Self::ToolHandling)
    }

    /// Whether the session is closing or closed.
    pub fn is_shutting_down(&self) -> bool {
        matches!(self, Self::Closing | Self::Closed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Active => "active",
            Self::Interrupted => "interrupted",
            Self::ToolHandling => "tool_handling",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Why a session is closing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The caller asked to disconnect.
    Requested,
    /// The remote side closed the connection.
    RemoteClosed(Option<String>),
    /// The connection failed.
    TransportError(String),
    /// Connecting failed before the session became active.
    ConnectFailed(String),
    /// The owning client went away.
    ClientDropped,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requested => f.write_str("disconnect requested"),
            Self::RemoteClosed(Some(reason)) => write!(f, "remote closed: {reason}"),
            Self::RemoteClosed(None) => f.write_str("remote closed"),
            Self::TransportError(e) => write!(f, "transport error: {e}"),
            Self::ConnectFailed(e) => write!(f, "connect failed: {e}"),
            Self::ClientDropped => f.write_str("client dropped"),
        }
    }
}

/// Something the session task must do in response to an event.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionAction {
    /// Start the capture pipeline.
    StartCapture,
    /// Schedule decoded model audio.
    PlayAudio(Vec<f32>),
    /// Stop all playback immediately.
    StopPlayback,
    /// Fire the transcript callback.
    Transcript(TranscriptUpdate),
    /// Run these tool calls concurrently.
    DispatchTools(Vec<ToolCall>),
    /// Fire the status callback.
    Status(bool),
    /// Stop capture and release every device handle.
    Teardown(CloseReason),
}

/// Lifecycle state plus per-turn transcript buffers.
#[derive(Debug, Default)]
pub struct SessionMachine {
    state: SessionState,
    transcript: TranscriptAccumulator,
    pending_tools: Vec<String>,
}

impl SessionMachine {
    /// A fresh machine in `Idle`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Transcript buffers for the current turn.
    pub fn transcript(&self) -> &TranscriptAccumulator {
        &self.transcript
    }

    /// IDs of tool calls that have not completed.
    pub fn pending_tools(&self) -> &[String] {
        &self.pending_tools
    }

    /// `Idle → Connecting`.
    pub fn begin_connect(&mut self) -> Result<()> {
        match self.state {
            SessionState::Idle => {
                self.transition(SessionState::Connecting);
                Ok(())
            }
            _ => Err(RealtimeError::AlreadyConnected),
        }
    }

    /// Decide what to do with one inbound event.
    pub fn dispatch(&mut self, event: InboundEvent) -> Vec<SessionAction> {
        match event {
            InboundEvent::Closed { reason } => return self.close(CloseReason::RemoteClosed(reason)),
            InboundEvent::Error { message } => {
                tracing::error!(error = %message, "Transport failed");
                return self.close(CloseReason::TransportError(message));
            }
            _ => {}
        }

        match self.state {
            SessionState::Connecting => self.dispatch_connecting(event),
            state if state.is_live() => self.dispatch_live(event),
            state => {
                tracing::trace!(%state, ?event, "Ignoring event outside a live session");
                Vec::new()
            }
        }
    }

    fn dispatch_connecting(&mut self, event: InboundEvent) -> Vec<SessionAction> {
        match event {
            InboundEvent::Opened => {
                self.transition(SessionState::Active);
                vec![SessionAction::StartCapture, SessionAction::Status(true)]
            }
            other => {
                tracing::debug!(event = ?other, "Ignoring event before open confirmation");
                Vec::new()
            }
        }
    }

    fn dispatch_live(&mut self, event: InboundEvent) -> Vec<SessionAction> {
        match event {
            InboundEvent::Opened => {
                tracing::debug!("Duplicate open confirmation");
                Vec::new()
            }
            InboundEvent::Audio { data } => {
                self.resume_after_interruption();
                match pcm::decode(&data) {
                    Ok(samples) if samples.is_empty() => Vec::new(),
                    Ok(samples) => vec![SessionAction::PlayAudio(samples)],
                    Err(e) => {
                        tracing::warn!(error = %e, "Skipping undecodable audio chunk");
                        Vec::new()
                    }
                }
            }
            InboundEvent::OutputTranscript { text } => {
                self.resume_after_interruption();
                vec![SessionAction::Transcript(self.transcript.append_output(&text))]
            }
            InboundEvent::InputTranscript { text } => {
                vec![SessionAction::Transcript(self.transcript.append_input(&text))]
            }
            InboundEvent::TurnComplete => {
                self.resume_after_interruption();
                vec![SessionAction::Transcript(self.transcript.complete_turn())]
            }
            InboundEvent::Interrupted => {
                self.transcript.interrupt();
                if self.state == SessionState::Active {
                    self.transition(SessionState::Interrupted);
                }
                vec![SessionAction::StopPlayback]
            }
            InboundEvent::ToolCall { calls } => {
                if calls.is_empty() {
                    return Vec::new();
                }
                self.pending_tools.extend(calls.iter().map(|c| c.id.clone()));
                self.transition(SessionState::ToolHandling);
                vec![SessionAction::DispatchTools(calls)]
            }
            InboundEvent::Closed { .. } | InboundEvent::Error { .. } => Vec::new(),
        }
    }

    /// Record that the tool call `id` completed (success or error).
    ///
    /// Once nothing is pending, `ToolHandling` returns to `Active`.
    pub fn tool_finished(&mut self, id: &str) {
        if let Some(pos) = self.pending_tools.iter().position(|p| p == id) {
            self.pending_tools.remove(pos);
        } else {
            tracing::debug!(call_id = %id, "Completion for unknown tool call");
        }
        if self.pending_tools.is_empty() && self.state == SessionState::ToolHandling {
            self.transition(SessionState::Active);
        }
    }

    /// Begin closing. Returns the teardown actions exactly once.
    pub fn close(&mut self, reason: CloseReason) -> Vec<SessionAction> {
        match self.state {
            SessionState::Closing | SessionState::Closed => Vec::new(),
            SessionState::Idle => {
                self.transition(SessionState::Closed);
                Vec::new()
            }
            _ => {
                tracing::info!(%reason, "Closing session");
                self.transition(SessionState::Closing);
                self.transcript.clear();
                vec![SessionAction::Teardown(reason), SessionAction::Status(false)]
            }
        }
    }

    /// `Closing → Closed`.
    pub fn finish_close(&mut self) {
        self.pending_tools.clear();
        if self.state != SessionState::Closed {
            self.transition(SessionState::Closed);
        }
    }

    fn resume_after_interruption(&mut self) {
        if self.state == SessionState::Interrupted {
            self.transition(SessionState::Active);
        }
    }

    fn transition(&mut self, next: SessionState) {
        tracing::debug!(from = %self.state, to = %next, "Session state transition");
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn active() -> SessionMachine {
        let mut machine = SessionMachine::new();
        machine.begin_connect().unwrap();
        machine.dispatch(InboundEvent::Opened);
        machine
    }

    fn audio(samples: &[f32]) -> InboundEvent {
        InboundEvent::Audio { data: pcm::encode(samples) }
    }

    fn call(id: &str) -> ToolCall {
        ToolCall::new(id, "create_image", json!({"prompt": "a lighthouse"}))
    }

    #[test]
    fn test_open_confirmation_activates() {
        let mut machine = SessionMachine::new();
        machine.begin_connect().unwrap();
        assert_eq!(machine.state(), SessionState::Connecting);

        let actions = machine.dispatch(InboundEvent::Opened);
        assert_eq!(actions, vec![SessionAction::StartCapture, SessionAction::Status(true)]);
        assert_eq!(machine.state(), SessionState::Active);
    }

    #[test]
    fn test_begin_connect_twice_rejected() {
        let mut machine = active();
        assert!(matches!(machine.begin_connect(), Err(RealtimeError::AlreadyConnected)));
    }

    #[test]
    fn test_events_before_open_are_ignored() {
        let mut machine = SessionMachine::new();
        machine.begin_connect().unwrap();
        assert!(machine.dispatch(audio(&[0.5])).is_empty());
        assert!(machine.dispatch(InboundEvent::OutputTranscript { text: "x".into() }).is_empty());
        assert_eq!(machine.transcript().output(), "");
    }

    #[test]
    fn test_audio_decodes_to_play_action() {
        let mut machine = active();
        let actions = machine.dispatch(audio(&[0.5, -0.5]));
        assert_eq!(actions, vec![SessionAction::PlayAudio(vec![0.5, -0.5])]);
    }

    #[test]
    fn test_bad_audio_is_skipped() {
        let mut machine = active();
        assert!(machine.dispatch(InboundEvent::Audio { data: "%%%".into() }).is_empty());
        assert_eq!(machine.state(), SessionState::Active);
        // Next chunk is unaffected
        assert_eq!(machine.dispatch(audio(&[0.25])).len(), 1);
    }

    #[test]
    fn test_partials_then_turn_complete() {
        let mut machine = active();
        machine.dispatch(InboundEvent::InputTranscript { text: "Paint ".into() });
        machine.dispatch(InboundEvent::InputTranscript { text: "the sea".into() });
        machine.dispatch(InboundEvent::OutputTranscript { text: "On ".into() });
        let running = machine.dispatch(InboundEvent::OutputTranscript { text: "it".into() });
        assert_eq!(
            running,
            vec![SessionAction::Transcript(TranscriptUpdate {
                input: "Paint the sea".into(),
                output: "On it".into(),
                is_final: false,
            })]
        );

        let actions = machine.dispatch(InboundEvent::TurnComplete);
        assert_eq!(
            actions,
            vec![SessionAction::Transcript(TranscriptUpdate {
                input: "Paint the sea".into(),
                output: "On it".into(),
                is_final: true,
            })]
        );
        assert_eq!(machine.transcript().input(), "");
        assert_eq!(machine.transcript().output(), "");
    }

    #[test]
    fn test_interruption_stops_playback_and_keeps_input() {
        let mut machine = active();
        machine.dispatch(InboundEvent::InputTranscript { text: "no wait".into() });
        machine.dispatch(InboundEvent::OutputTranscript { text: "The answer is".into() });

        let actions = machine.dispatch(InboundEvent::Interrupted);
        assert_eq!(actions, vec![SessionAction::StopPlayback]);
        assert_eq!(machine.state(), SessionState::Interrupted);
        assert_eq!(machine.transcript().input(), "no wait");
        assert_eq!(machine.transcript().output(), "");

        // New model output resumes the session
        machine.dispatch(audio(&[0.1]));
        assert_eq!(machine.state(), SessionState::Active);
    }

    #[test]
    fn test_input_transcript_does_not_end_interruption() {
        let mut machine = active();
        machine.dispatch(InboundEvent::Interrupted);
        machine.dispatch(InboundEvent::InputTranscript { text: "hm".into() });
        assert_eq!(machine.state(), SessionState::Interrupted);
        machine.dispatch(InboundEvent::TurnComplete);
        assert_eq!(machine.state(), SessionState::Active);
    }

    #[test]
    fn test_tool_calls_tracked_until_all_finish() {
        let mut machine = active();
        let actions = machine.dispatch(InboundEvent::ToolCall { calls: vec![call("a"), call("b")] });
        assert_eq!(actions, vec![SessionAction::DispatchTools(vec![call("a"), call("b")])]);
        assert_eq!(machine.state(), SessionState::ToolHandling);

        machine.tool_finished("b");
        assert_eq!(machine.state(), SessionState::ToolHandling);
        machine.tool_finished("a");
        assert_eq!(machine.state(), SessionState::Active);
        assert!(machine.pending_tools().is_empty());
    }

    #[test]
    fn test_interruption_during_tool_handling_keeps_tool_state() {
        let mut machine = active();
        machine.dispatch(InboundEvent::ToolCall { calls: vec![call("a")] });
        assert_eq!(machine.dispatch(InboundEvent::Interrupted), vec![SessionAction::StopPlayback]);
        assert_eq!(machine.state(), SessionState::ToolHandling);
        machine.tool_finished("a");
        assert_eq!(machine.state(), SessionState::Active);
    }

    #[test]
    fn test_empty_tool_call_is_ignored() {
        let mut machine = active();
        assert!(machine.dispatch(InboundEvent::ToolCall { calls: vec![] }).is_empty());
        assert_eq!(machine.state(), SessionState::Active);
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut machine = active();
        machine.dispatch(InboundEvent::InputTranscript { text: "bye".into() });

        let actions = machine.close(CloseReason::Requested);
        assert_eq!(
            actions,
            vec![SessionAction::Teardown(CloseReason::Requested), SessionAction::Status(false)]
        );
        assert_eq!(machine.state(), SessionState::Closing);
        assert_eq!(machine.transcript().input(), "");

        assert!(machine.close(CloseReason::Requested).is_empty());
        machine.finish_close();
        assert_eq!(machine.state(), SessionState::Closed);
        assert!(machine.close(CloseReason::Requested).is_empty());
    }

    #[test]
    fn test_transport_error_closes() {
        let mut machine = active();
        let actions = machine.dispatch(InboundEvent::Error { message: "reset by peer".into() });
        assert_eq!(actions.last(), Some(&SessionAction::Status(false)));
        assert_eq!(machine.state(), SessionState::Closing);
        assert!(machine.dispatch(audio(&[0.3])).is_empty());
    }

    #[test]
    fn test_close_during_connecting_reports_inactive() {
        let mut machine = SessionMachine::new();
        machine.begin_connect().unwrap();
        let actions = machine.dispatch(InboundEvent::Closed { reason: Some("bad key".into()) });
        assert_eq!(actions.len(), 2);
        assert_eq!(machine.state(), SessionState::Closing);
    }

    #[test]
    fn test_idle_close_has_no_side_effects() {
        let mut machine = SessionMachine::new();
        assert!(machine.close(CloseReason::Requested).is_empty());
        assert_eq!(machine.state(), SessionState::Closed);
    }
}
