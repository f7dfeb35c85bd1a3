//! Configuration types for voice sessions.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::audio::{DEFAULT_CAPTURE_WINDOW, INPUT_SAMPLE_RATE, OUTPUT_SAMPLE_RATE};
use crate::error::{RealtimeError, Result};

/// Default Live model.
pub const DEFAULT_MODEL: &str = "models/gemini-2.5-flash-native-audio-preview-09-2025";

/// Default system instruction.
pub const DEFAULT_INSTRUCTION: &str = "You are a friendly creative assistant in a live voice \
conversation. Keep spoken answers short and natural. When the user asks you to draw, paint, \
design or show something, call the create_image tool with a detailed visual prompt, then tell \
the user briefly what you made.";

/// Prebuilt output voices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Voice {
    /// Upbeat.
    #[default]
    Puck,
    /// Informative.
    Charon,
    /// Firm.
    Kore,
    /// Excitable.
    Fenrir,
    /// Bright.
    Zephyr,
}

impl Voice {
    /// Every selectable voice.
    pub const ALL: [Voice; 5] = [Voice::Puck, Voice::Charon, Voice::Kore, Voice::Fenrir, Voice::Zephyr];

    /// Name used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Puck => "Puck",
            Self::Charon => "Charon",
            Self::Kore => "Kore",
            Self::Fenrir => "Fenrir",
            Self::Zephyr => "Zephyr",
        }
    }
}

impl fmt::Display for Voice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Voice {
    type Err = RealtimeError;

    fn from_str(s: &str) -> Result<Self> {
        Voice::ALL
            .into_iter()
            .find(|v| v.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| RealtimeError::config(format!("Unknown voice: {s}")))
    }
}

/// Tool/function declaration advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name.
    pub name: String,
    /// Tool description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

impl ToolDefinition {
    /// Create a new tool definition.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), description: None, parameters: None }
    }

    /// Set the tool description.
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Set the parameters schema.
    pub fn with_parameters(mut self, schema: Value) -> Self {
        self.parameters = Some(schema);
        self
    }

    /// Add a single required string parameter.
    pub fn with_required_string(self, param: &str, description: &str) -> Self {
        self.with_parameters(json!({
            "type": "OBJECT",
            "properties": {
                param: { "type": "STRING", "description": description }
            },
            "required": [param]
        }))
    }
}

/// Configuration sent when a session is opened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Model to use.
    pub model: String,

    /// System instruction for the model.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instruction: Option<String>,

    /// Voice to use for audio output.
    pub voice: Voice,

    /// Output modalities requested from the model.
    pub modalities: Vec<String>,

    /// Whether the model transcribes the user's speech.
    pub input_transcription: bool,

    /// Whether the model transcribes its own speech.
    pub output_transcription: bool,

    /// Available tools/functions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            instruction: Some(DEFAULT_INSTRUCTION.to_string()),
            voice: Voice::default(),
            modalities: vec!["AUDIO".to_string()],
            input_transcription: true,
            output_transcription: true,
            tools: Vec::new(),
        }
    }
}

impl SessionConfig {
    /// Create a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder for SessionConfig.
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::new()
    }

    /// Set the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the system instruction.
    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = Some(instruction.into());
        self
    }

    /// Set the voice.
    pub fn with_voice(mut self, voice: Voice) -> Self {
        self.voice = voice;
        self
    }

    /// Add a tool definition.
    pub fn with_tool(mut self, tool: ToolDefinition) -> Self {
        self.tools.push(tool);
        self
    }

    /// Set multiple tools.
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    /// Enable or disable both transcription directions.
    pub fn with_transcription(mut self, enabled: bool) -> Self {
        self.input_transcription = enabled;
        self.output_transcription = enabled;
        self
    }
}

/// Builder for SessionConfig.
#[derive(Debug, Clone, Default)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the model.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    /// Set the system instruction.
    pub fn instruction(mut self, instruction: impl Into<String>) -> Self {
        self.config.instruction = Some(instruction.into());
        self
    }

    /// Set the voice.
    pub fn voice(mut self, voice: Voice) -> Self {
        self.config.voice = voice;
        self
    }

    /// Add a tool.
    pub fn tool(mut self, tool: ToolDefinition) -> Self {
        self.config.tools.push(tool);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> Result<SessionConfig> {
        if self.config.model.trim().is_empty() {
            return Err(RealtimeError::config("Model is required"));
        }
        if self.config.modalities.is_empty() {
            return Err(RealtimeError::config("At least one output modality is required"));
        }
        Ok(self.config)
    }
}

/// Tuning knobs for the client side of a session.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Samples per capture window.
    pub capture_window: usize,
    /// Sample rate of audio sent to the model.
    pub input_sample_rate: u32,
    /// Sample rate of audio received from the model.
    pub output_sample_rate: u32,
    /// How long to wait for the open confirmation.
    pub open_timeout: Duration,
    /// How long a closing session waits for in-flight tool calls.
    pub tool_drain_timeout: Duration,
    /// Capture windows buffered between the device callback and the transport.
    pub capture_queue: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            capture_window: DEFAULT_CAPTURE_WINDOW,
            input_sample_rate: INPUT_SAMPLE_RATE,
            output_sample_rate: OUTPUT_SAMPLE_RATE,
            open_timeout: Duration::from_secs(10),
            tool_drain_timeout: Duration::from_secs(10),
            capture_queue: 8,
        }
    }
}

/// API credentials.
#[derive(Clone)]
pub struct Credentials {
    /// API key for the Gemini API.
    pub api_key: SecretString,
}

impl Credentials {
    /// Wrap an API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self { api_key: SecretString::from(api_key.into()) }
    }

    /// Read `GOOGLE_API_KEY`, falling back to `GEMINI_API_KEY`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("GOOGLE_API_KEY")
            .or_else(|_| std::env::var("GEMINI_API_KEY"))
            .map_err(|_| {
                RealtimeError::config("GOOGLE_API_KEY or GEMINI_API_KEY environment variable not set")
            })?;
        if api_key.trim().is_empty() {
            return Err(RealtimeError::config("API key is empty"));
        }
        Ok(Self::new(api_key))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials").field("api_key", &"[REDACTED]").finish()
    }
}
