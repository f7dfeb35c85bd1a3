//! Gemini provider: Live API transport and image generation.
//!
//! The Live API speaks JSON messages over a WebSocket:
//!
//! - Input audio: 16kHz mono PCM (`realtimeInput.mediaChunks`)
//! - Output audio: 24kHz mono PCM (`serverContent.modelTurn` inline data)
//! - Server-side voice activity detection (`serverContent.interrupted`)
//! - Tool calls via `toolCall.functionCalls` / `toolResponse.functionResponses`
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use vox_realtime::gemini::{GeminiConnector, GeminiImageGenerator};
//! use vox_realtime::{Credentials, VoiceClient};
//!
//! let credentials = Credentials::from_env()?;
//! let client = VoiceClient::builder()
//!     .connector(Arc::new(GeminiConnector::new(credentials.clone())))
//!     .image_generator(GeminiImageGenerator::new(credentials))
//!     .devices(devices)
//!     .build()?;
//! ```

mod image;
mod live;
mod protocol;

pub use image::GeminiImageGenerator;
pub use live::{GeminiConnector, GeminiSink};
pub use protocol::{ClientMessage, outbound_message, setup_message, translate};

/// Gemini Live API WebSocket endpoint.
pub const GEMINI_LIVE_URL: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Base URL of the Gemini REST API.
pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default image generation model.
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image";
