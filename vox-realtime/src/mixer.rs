//! Sample-accurate mixing of scheduled playback units.
//!
//! The mixer keeps its own clock: the number of frames rendered so far.
//! A [`UnitPlacer`] converts each unit to the device rate and picks its
//! first frame; the [`Mixer`] sums placed voices into each output block.
//! A unit whose last frame has been rendered is reported on the finished
//! channel; a stopped unit is not.
//!
//! Placement runs outside the render lock. Only [`Mixer::add`] is done
//! while holding it.

use crate::audio::StreamResampler;
use crate::error::Result;
use crate::playback::{FinishedSender, PlaybackUnit, UnitId};

/// A unit converted to the device rate and pinned to a device frame.
#[derive(Debug, Clone)]
pub struct Voice {
    /// Unit this voice plays.
    pub id: UnitId,
    /// First device frame.
    pub start_frame: u64,
    /// Mono samples at the device rate.
    pub samples: Vec<f32>,
}

impl Voice {
    /// One past the last device frame.
    pub fn end_frame(&self) -> u64 {
        self.start_frame + self.samples.len() as u64
    }
}

/// Turns playback units into device-rate voices.
///
/// Units that start exactly where the previous one ended form one stream:
/// the resampler keeps its state across them and each voice starts on the
/// frame after the previous voice, so back-to-back units stay back-to-back
/// on the device. Any other start time begins a new stream at
/// `start_time * device_rate`.
pub struct UnitPlacer {
    device_rate: u32,
    resampler: Option<(u32, StreamResampler)>,
    // End time and end frame of the last placed unit
    tail: Option<(f64, u64)>,
}

impl UnitPlacer {
    /// Create a placer for a device running at `device_rate`.
    pub fn new(device_rate: u32) -> Self {
        Self { device_rate: device_rate.max(1), resampler: None, tail: None }
    }

    /// Convert `unit` and choose its first frame.
    pub fn place(&mut self, unit: &PlaybackUnit) -> Result<Voice> {
        let half_frame = 0.5 / f64::from(self.device_rate);
        let start_frame = match self.tail {
            Some((end_time, end_frame)) if (unit.start_time - end_time).abs() < half_frame => {
                end_frame
            }
            _ => {
                if let Some((_, resampler)) = self.resampler.as_mut() {
                    resampler.reset();
                }
                (unit.start_time.max(0.0) * f64::from(self.device_rate)).round() as u64
            }
        };

        let samples = if unit.sample_rate == self.device_rate {
            unit.samples.to_vec()
        } else {
            let resampler = match self.resampler.take() {
                Some((rate, resampler)) if rate == unit.sample_rate => resampler,
                _ => StreamResampler::new(unit.sample_rate, self.device_rate)?,
            };
            let (_, resampler) = self.resampler.insert((unit.sample_rate, resampler));
            resampler.process(&unit.samples)?
        };

        let voice = Voice { id: unit.id, start_frame, samples };
        self.tail = Some((unit.end_time(), voice.end_frame()));
        Ok(voice)
    }

    /// Start over; the next unit begins a new stream.
    pub fn reset(&mut self) {
        self.tail = None;
        if let Some((_, resampler)) = self.resampler.as_mut() {
            resampler.reset();
        }
    }
}

impl std::fmt::Debug for UnitPlacer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitPlacer")
            .field("device_rate", &self.device_rate)
            .field("tail", &self.tail)
            .finish()
    }
}

/// Renders scheduled units into interleaved device buffers.
pub struct Mixer {
    device_rate: u32,
    channels: usize,
    frames_rendered: u64,
    voices: Vec<Voice>,
    finished: FinishedSender,
}

impl Mixer {
    /// Create a mixer for a device running at `device_rate` with `channels`.
    pub fn new(device_rate: u32, channels: u16, finished: FinishedSender) -> Self {
        Self {
            device_rate: device_rate.max(1),
            channels: usize::from(channels.max(1)),
            frames_rendered: 0,
            voices: Vec::new(),
            finished,
        }
    }

    /// Device clock in seconds.
    pub fn current_time(&self) -> f64 {
        self.frames_rendered as f64 / f64::from(self.device_rate)
    }

    /// Device rate in Hz.
    pub fn device_rate(&self) -> u32 {
        self.device_rate
    }

    /// Add a placed voice.
    pub fn add(&mut self, voice: Voice) {
        self.voices.push(voice);
    }

    /// Drop `id` without reporting it.
    pub fn stop(&mut self, id: UnitId) {
        self.voices.retain(|voice| voice.id != id);
    }

    /// Drop every unit without reporting.
    pub fn clear(&mut self) {
        self.voices.clear();
    }

    /// Number of units not yet fully rendered.
    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }

    /// Render the next block of interleaved samples into `out`.
    pub fn render(&mut self, out: &mut [f32]) {
        out.fill(0.0);
        let frames = (out.len() / self.channels) as u64;
        let block_start = self.frames_rendered;
        let block_end = block_start + frames;

        for voice in &self.voices {
            let from = voice.start_frame.max(block_start);
            let to = voice.end_frame().min(block_end);
            for frame in from..to {
                let sample = voice.samples[(frame - voice.start_frame) as usize];
                let offset = (frame - block_start) as usize * self.channels;
                for slot in &mut out[offset..offset + self.channels] {
                    *slot += sample;
                }
            }
        }
        for slot in out.iter_mut() {
            *slot = slot.clamp(-1.0, 1.0);
        }

        self.frames_rendered = block_end;
        let finished = &self.finished;
        self.voices.retain(|voice| {
            let done = voice.end_frame() <= block_end;
            if done {
                let _ = finished.send(voice.id);
            }
            !done
        });
    }
}

impl std::fmt::Debug for Mixer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mixer")
            .field("device_rate", &self.device_rate)
            .field("channels", &self.channels)
            .field("frames_rendered", &self.frames_rendered)
            .field("voices", &self.voices.len())
            .finish()
    }
}
