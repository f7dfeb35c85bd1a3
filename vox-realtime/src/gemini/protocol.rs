//! Gemini Live wire messages and their translation to session events.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::config::{SessionConfig, ToolDefinition};
use crate::error::Result;
use crate::events::{InboundEvent, OutboundEvent, ToolCall, ToolResult};

/// A client → server message. Exactly one field is set.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    setup: Option<Setup>,
    #[serde(skip_serializing_if = "Option::is_none")]
    realtime_input: Option<RealtimeInput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_response: Option<ToolResponseMessage>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct Setup {
    model: String,
    generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ToolSet>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    input_audio_transcription: Option<Enabled>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_audio_transcription: Option<Enabled>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: Vec<String>,
    speech_config: Value,
}

#[derive(Debug, Clone, Serialize)]
struct Content {
    parts: Vec<TextPart>,
}

#[derive(Debug, Clone, Serialize)]
struct TextPart {
    text: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolSet {
    function_declarations: Vec<Value>,
}

/// Serializes as `{}`.
#[derive(Debug, Clone, Serialize)]
struct Enabled {}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct RealtimeInput {
    media_chunks: Vec<MediaChunk>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct MediaChunk {
    mime_type: String,
    data: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolResponseMessage {
    function_responses: Vec<FunctionResponse>,
}

#[derive(Debug, Clone, Serialize)]
struct FunctionResponse {
    id: String,
    name: String,
    response: ToolResult,
}

/// The `setup` message opening a session.
pub fn setup_message(config: &SessionConfig) -> ClientMessage {
    let system_instruction = config
        .instruction
        .as_ref()
        .filter(|text| !text.trim().is_empty())
        .map(|text| Content { parts: vec![TextPart { text: text.clone() }] });

    let setup = Setup {
        model: config.model.clone(),
        generation_config: GenerationConfig {
            response_modalities: config.modalities.clone(),
            speech_config: json!({
                "voiceConfig": {
                    "prebuiltVoiceConfig": {
                        "voiceName": config.voice.as_str()
                    }
                }
            }),
        },
        system_instruction,
        tools: convert_tools(&config.tools),
        input_audio_transcription: config.input_transcription.then_some(Enabled {}),
        output_audio_transcription: config.output_transcription.then_some(Enabled {}),
    };
    ClientMessage { setup: Some(setup), ..Default::default() }
}

/// Wire form of an outbound session event.
pub fn outbound_message(event: OutboundEvent) -> ClientMessage {
    match event {
        OutboundEvent::RealtimeAudio { mime_type, data } => ClientMessage {
            realtime_input: Some(RealtimeInput { media_chunks: vec![MediaChunk { mime_type, data }] }),
            ..Default::default()
        },
        OutboundEvent::ToolResponse(response) => ClientMessage {
            tool_response: Some(ToolResponseMessage {
                function_responses: vec![FunctionResponse {
                    id: response.id,
                    name: response.name,
                    response: response.response,
                }],
            }),
            ..Default::default()
        },
    }
}

fn convert_tools(tools: &[ToolDefinition]) -> Option<Vec<ToolSet>> {
    if tools.is_empty() {
        return None;
    }
    let function_declarations = tools
        .iter()
        .map(|t| {
            json!({
                "name": t.name,
                "description": t.description.clone().unwrap_or_default(),
                "parameters": t
                    .parameters
                    .clone()
                    .unwrap_or_else(|| json!({ "type": "OBJECT", "properties": {} }))
            })
        })
        .collect();
    Some(vec![ToolSet { function_declarations }])
}

/// A server → client message. Unknown fields are ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerMessage {
    setup_complete: Option<Value>,
    server_content: Option<ServerContent>,
    tool_call: Option<ToolCallMessage>,
    go_away: Option<GoAway>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerContent {
    model_turn: Option<ModelTurn>,
    input_transcription: Option<Transcription>,
    output_transcription: Option<Transcription>,
    #[serde(default)]
    interrupted: bool,
    #[serde(default)]
    turn_complete: bool,
}

#[derive(Debug, Default, Deserialize)]
struct ModelTurn {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: Option<String>,
    data: String,
}

#[derive(Debug, Default, Deserialize)]
struct Transcription {
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToolCallMessage {
    #[serde(default)]
    function_calls: Vec<FunctionCall>,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    #[serde(default)]
    id: String,
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoAway {
    time_left: Option<String>,
}

/// Translate one server message into session events.
///
/// A single message may carry several pieces of content. They are emitted
/// as: open confirmation, input transcript, output transcript, audio,
/// interruption, turn complete, tool calls, go-away.
pub fn translate(raw: &str) -> Result<Vec<InboundEvent>> {
    let message: ServerMessage = serde_json::from_str(raw)?;
    let mut events = Vec::new();

    if message.setup_complete.is_some() {
        events.push(InboundEvent::Opened);
    }

    if let Some(content) = message.server_content {
        if let Some(text) = non_empty(content.input_transcription) {
            events.push(InboundEvent::InputTranscript { text });
        }
        if let Some(text) = non_empty(content.output_transcription) {
            events.push(InboundEvent::OutputTranscript { text });
        }
        let parts = content.model_turn.map(|turn| turn.parts).unwrap_or_default();
        for inline in parts.into_iter().filter_map(|part| part.inline_data) {
            let is_audio = inline.mime_type.as_deref().is_none_or(|m| m.starts_with("audio/"));
            if is_audio && !inline.data.is_empty() {
                events.push(InboundEvent::Audio { data: inline.data });
            }
        }
        if content.interrupted {
            events.push(InboundEvent::Interrupted);
        }
        if content.turn_complete {
            events.push(InboundEvent::TurnComplete);
        }
    }

    if let Some(tool_call) = message.tool_call {
        let calls: Vec<ToolCall> = tool_call
            .function_calls
            .into_iter()
            .map(|call| {
                let args = if call.args.is_null() { json!({}) } else { call.args };
                ToolCall::new(call.id, call.name, args)
            })
            .collect();
        if !calls.is_empty() {
            events.push(InboundEvent::ToolCall { calls });
        }
    }

    if let Some(go_away) = message.go_away {
        let reason = match go_away.time_left {
            Some(left) => format!("Server going away (time left: {left})"),
            None => "Server going away".to_string(),
        };
        tracing::warn!(%reason, "Received goAway");
        events.push(InboundEvent::Closed { reason: Some(reason) });
    }

    Ok(events)
}

fn non_empty(transcription: Option<Transcription>) -> Option<String> {
    transcription.and_then(|t| t.text).filter(|text| !text.is_empty())
}
