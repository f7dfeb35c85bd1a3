//! Conversion between float samples and base64-encoded PCM16 frames.
//!
//! The wire contract is mono 16-bit signed little-endian PCM, carried as
//! standard base64 text inside JSON messages. Both directions are pure
//! functions.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::error::{RealtimeError, Result};

/// Scale between `[-1.0, 1.0]` floats and signed 16-bit integers.
pub const PCM16_SCALE: f32 = 32768.0;

/// Quantize one float sample to a signed 16-bit value.
///
/// The input is clamped to `[-1.0, 1.0]`, scaled by 32768, rounded to the
/// nearest integer and clamped to `[-32768, 32767]`. NaN maps to silence.
pub fn quantize(sample: f32) -> i16 {
    if sample.is_nan() {
        return 0;
    }
    let scaled = (sample.clamp(-1.0, 1.0) * PCM16_SCALE).round();
    scaled.clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// Convert float samples to PCM16 little-endian bytes.
pub fn samples_to_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut data = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        data.extend_from_slice(&quantize(*sample).to_le_bytes());
    }
    data
}

/// Convert PCM16 little-endian bytes to float samples.
///
/// Fails on an odd byte count.
pub fn pcm16_to_samples(data: &[u8]) -> Result<Vec<f32>> {
    if data.len() % 2 != 0 {
        return Err(RealtimeError::decode(format!(
            "Invalid data length for PCM16: {} (must be even)",
            data.len()
        )));
    }
    Ok(data
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / PCM16_SCALE)
        .collect())
}

/// Encode float samples as base64 PCM16 transport text.
pub fn encode(samples: &[f32]) -> String {
    STANDARD.encode(samples_to_pcm16(samples))
}

/// Decode base64 PCM16 transport text into float samples.
pub fn decode(text: &str) -> Result<Vec<f32>> {
    let data = STANDARD
        .decode(text)
        .map_err(|e| RealtimeError::decode(format!("Invalid base64 audio: {e}")))?;
    pcm16_to_samples(&data)
}
