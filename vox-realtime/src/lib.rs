//! # vox-realtime
//!
//! Real-time voice sessions with a remote conversational model.
//!
//! A session captures the microphone, streams it to the model as PCM16,
//! plays the model's synthesized speech back gaplessly, surfaces running
//! transcripts, and runs tool calls the model issues mid-conversation (image
//! generation out of the box).
//!
//! ## Architecture
//!
//! ```text
//!                 ┌──────────────────────────────────────────────┐
//!   caller ──────▶│ VoiceClient  connect(voice) / disconnect()   │
//!                 └───────────────────────┬──────────────────────┘
//!                                         │ spawns
//!                 ┌───────────────────────▼──────────────────────┐
//!                 │ session task (owns all session state)        │
//!                 │   SessionMachine ── pure event dispatch      │
//!                 │   PlaybackScheduler ── gapless scheduling    │
//!                 │   CapturePipeline ── windows → transport     │
//!                 │   ToolDispatcher ── concurrent tool calls    │
//!                 └───────┬─────────────────────────────┬────────┘
//!                         │ TransportConnector          │ AudioDevices
//!                 ┌───────▼────────┐            ┌───────▼────────┐
//!                 │ gemini (Live)  │            │ desktop (cpal) │
//!                 └────────────────┘            └────────────────┘
//! ```
//!
//! ## Features
//!
//! - `gemini`: Gemini Live WebSocket transport and Gemini image generation
//! - `desktop-audio`: default microphone and speaker through cpal
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use vox_realtime::desktop::CpalDevices;
//! use vox_realtime::gemini::{GeminiConnector, GeminiImageGenerator};
//! use vox_realtime::{Credentials, SessionObserver, Voice, VoiceClient};
//!
//! struct Printer;
//!
//! #[async_trait::async_trait]
//! impl SessionObserver for Printer {
//!     async fn on_transcript_update(&self, input: &str, output: &str, is_final: bool) {
//!         if is_final {
//!             println!("you: {input}\nmodel: {output}");
//!         }
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let credentials = Credentials::from_env()?;
//!     let client = VoiceClient::builder()
//!         .connector(Arc::new(GeminiConnector::new(credentials.clone())))
//!         .devices(Arc::new(CpalDevices))
//!         .image_generator(GeminiImageGenerator::new(credentials))
//!         .observer(Printer)
//!         .build()?;
//!
//!     client.connect(Voice::Kore).await?;
//!     tokio::signal::ctrl_c().await?;
//!     client.disconnect().await;
//!     Ok(())
//! }
//! ```

pub mod audio;
pub mod capture;
pub mod client;
pub mod config;
pub mod devices;
pub mod error;
pub mod events;
pub mod image;
pub mod mixer;
pub mod observer;
pub mod pcm;
pub mod playback;
pub mod session;
pub mod tools;
pub mod transcript;
pub mod transport;

// Provider implementations
#[cfg(feature = "gemini")]
pub mod gemini;

#[cfg(feature = "desktop-audio")]
pub mod desktop;

// Re-exports
pub use audio::{AudioFormat, WindowBuffer};
pub use capture::{CaptureOptions, CapturePipeline};
pub use client::{SessionSnapshot, VoiceClient, VoiceClientBuilder};
pub use config::{ClientOptions, Credentials, SessionConfig, SessionConfigBuilder, ToolDefinition, Voice};
pub use devices::{AudioDevices, AudioInput, BoxedDevices, SampleCallback};
pub use error::{RealtimeError, Result};
pub use events::{InboundEvent, OutboundEvent, ToolCall, ToolResponse, ToolResult};
pub use image::{CreateImageTool, GeneratedImage, ImageGenerator};
pub use observer::{NoOpObserver, SessionObserver};
pub use playback::{AudioOutput, FinishedSender, PlaybackScheduler, PlaybackUnit, UnitId};
pub use session::{CloseReason, SessionAction, SessionMachine, SessionState};
pub use tools::{ToolAction, ToolCompletion, ToolDispatcher};
pub use transcript::{TranscriptAccumulator, TranscriptUpdate};
pub use transport::{BoxedConnector, Connection, EventStream, TransportConnector, TransportSink};
