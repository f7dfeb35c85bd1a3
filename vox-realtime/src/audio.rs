//! Audio format definitions and sample utilities.

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use serde::{Deserialize, Serialize};

use crate::error::{RealtimeError, Result};

/// Sample rate of microphone audio sent to the model.
pub const INPUT_SAMPLE_RATE: u32 = 16000;

/// Sample rate of audio produced by the model.
pub const OUTPUT_SAMPLE_RATE: u32 = 24000;

/// Samples per capture window.
pub const DEFAULT_CAPTURE_WINDOW: usize = 4096;

/// PCM16 audio format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Sample rate in Hz (e.g., 24000, 16000).
    pub sample_rate: u32,
    /// Number of audio channels (1 = mono, 2 = stereo).
    pub channels: u16,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::pcm16_16khz()
    }
}

impl AudioFormat {
    /// Create a new audio format.
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self { sample_rate, channels }
    }

    /// Mono PCM16 at 16kHz (microphone input).
    pub fn pcm16_16khz() -> Self {
        Self::new(INPUT_SAMPLE_RATE, 1)
    }

    /// MIME type announced on the wire, e.g. `audio/pcm;rate=16000`.
    pub fn mime_type(&self) -> String {
        format!("audio/pcm;rate={}", self.sample_rate)
    }
}

/// Duration in seconds of `samples` mono samples at `sample_rate`.
pub fn duration_secs(samples: usize, sample_rate: u32) -> f64 {
    if sample_rate == 0 {
        return 0.0;
    }
    samples as f64 / sample_rate as f64
}

/// Average interleaved frames down to a single channel.
pub fn downmix_to_mono(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Largest block handed to the resampler in one call.
const RESAMPLE_CHUNK: usize = 1024;

/// Streaming mono sample-rate converter.
///
/// Interpolation state and the fractional read position carry over from one
/// call to the next, so a stream cut into arbitrary blocks converts exactly
/// like the same stream in one piece.
pub struct StreamResampler {
    inner: FastFixedIn<f32>,
    pending: Vec<f32>,
    from_rate: u32,
    to_rate: u32,
}

impl StreamResampler {
    /// Create a converter from `from_rate` to `to_rate`.
    pub fn new(from_rate: u32, to_rate: u32) -> Result<Self> {
        if from_rate == 0 || to_rate == 0 {
            return Err(RealtimeError::device(format!(
                "Cannot resample {from_rate} Hz to {to_rate} Hz"
            )));
        }
        let ratio = f64::from(to_rate) / f64::from(from_rate);
        let inner =
            FastFixedIn::<f32>::new(ratio, 2.0, PolynomialDegree::Cubic, RESAMPLE_CHUNK, 1)
                .map_err(|e| {
                    RealtimeError::device(format!(
                        "Cannot resample {from_rate} Hz to {to_rate} Hz: {e}"
                    ))
                })?;
        Ok(Self { inner, pending: Vec::with_capacity(RESAMPLE_CHUNK), from_rate, to_rate })
    }

    /// Convert the next block of the stream.
    pub fn process(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        self.pending.extend_from_slice(input);
        let mut output = Vec::with_capacity(
            (self.pending.len() as f64 * f64::from(self.to_rate) / f64::from(self.from_rate))
                .ceil() as usize,
        );
        let mut consumed = 0;
        while consumed < self.pending.len() {
            let take = (self.pending.len() - consumed).min(RESAMPLE_CHUNK);
            // A short tail waits for the next block if the chunk size is fixed
            if take != self.inner.input_frames_next() && self.inner.set_chunk_size(take).is_err() {
                break;
            }
            let block = &self.pending[consumed..consumed + take];
            let frames = self
                .inner
                .process(&[block], None)
                .map_err(|e| RealtimeError::decode(format!("Resampling failed: {e}")))?;
            output.extend(frames.into_iter().flatten());
            consumed += take;
        }
        self.pending.drain(..consumed);
        Ok(output)
    }

    /// Forget the stream so far.
    pub fn reset(&mut self) {
        self.inner.reset();
        self.pending.clear();
    }
}

impl std::fmt::Debug for StreamResampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamResampler")
            .field("from_rate", &self.from_rate)
            .field("to_rate", &self.to_rate)
            .field("pending", &self.pending.len())
            .finish()
    }
}

/// Accumulates samples and hands them out in fixed-size windows.
///
/// Device drivers deliver buffers of whatever size suits them; the transport
/// expects a steady cadence of equal windows.
#[derive(Debug, Clone)]
pub struct WindowBuffer {
    buffer: Vec<f32>,
    window: usize,
}

impl WindowBuffer {
    /// Create a buffer emitting windows of `window` samples.
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self { buffer: Vec::with_capacity(window * 2), window }
    }

    /// Window size in samples.
    pub fn window(&self) -> usize {
        self.window
    }

    /// Push new samples into the buffer.
    pub fn push(&mut self, samples: &[f32]) {
        self.buffer.extend_from_slice(samples);
    }

    /// Take the next full window, if one is available.
    pub fn next_window(&mut self) -> Option<Vec<f32>> {
        if self.buffer.len() < self.window {
            return None;
        }
        let rest = self.buffer.split_off(self.window);
        Some(std::mem::replace(&mut self.buffer, rest))
    }

    /// Number of buffered samples not yet emitted.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Drop anything buffered.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
