//! # vox-telemetry
//!
//! Structured logging for voice sessions.
//!
//! ## Features
//! - Console or JSON logging via `tracing-subscriber`
//! - `RUST_LOG`-style filtering
//! - Span helpers for session, transport and tool operations
//!
//! ## Usage
//!
//! ```rust
//! use vox_telemetry::{init_telemetry, info, session_span};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     init_telemetry("vox")?;
//!
//!     let span = session_span("session-1", "Puck");
//!     let _enter = span.enter();
//!     info!("Session started");
//!     Ok(())
//! }
//! ```

pub mod init;
pub mod spans;

// Re-export tracing macros for convenience
pub use tracing::{Instrument, Span, debug, error, info, instrument, trace, warn};

// Re-export span helpers
pub use spans::*;

// Re-export init functions
pub use init::{LogFormat, init_json_telemetry, init_telemetry, init_with_format};
