//! Gapless playback scheduling with immediate full stop.
//!
//! Each decoded chunk becomes a [`PlaybackUnit`] whose start time is the later
//! of the output clock and the end of the previously scheduled unit:
//!
//! ```text
//!   clock ─────────────●──────────────────────────────────────▶
//!                      now
//!   units              [ unit 0 ][ unit 1 ][ unit 2 ]
//!                                                    ▲ next_playback_time
//! ```
//!
//! If the device falls behind, `now` overtakes the cursor and the next unit
//! starts immediately instead of accumulating delay.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;

use crate::audio::duration_secs;
use crate::error::{RealtimeError, Result};

/// Identifies a playback unit within one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UnitId(pub u64);

impl std::fmt::Display for UnitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unit-{}", self.0)
    }
}

/// An immutable decoded buffer with its scheduled start time.
#[derive(Debug, Clone)]
pub struct PlaybackUnit {
    /// Ownership token.
    pub id: UnitId,
    /// Mono float samples.
    pub samples: Arc<[f32]>,
    /// Sample rate of `samples`.
    pub sample_rate: u32,
    /// Start time on the output clock, in seconds.
    pub start_time: f64,
}

impl PlaybackUnit {
    /// Length of the unit in seconds.
    pub fn duration(&self) -> f64 {
        duration_secs(self.samples.len(), self.sample_rate)
    }

    /// Time at which the unit finishes playing.
    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration()
    }
}

/// A speaker (or anything with a clock that can play scheduled buffers).
///
/// Implementations report finished units on the channel handed to
/// [`AudioDevices::open_output`](crate::devices::AudioDevices::open_output).
/// A stopped unit is never reported.
pub trait AudioOutput: Send + Sync {
    /// Current time on the output clock, in seconds.
    fn current_time(&self) -> f64;

    /// Begin playing `unit` at `unit.start_time`.
    fn start(&self, unit: &PlaybackUnit) -> Result<()>;

    /// Stop `id` immediately. Unknown ids are ignored.
    fn stop(&self, id: UnitId);

    /// Release the device. Further calls may be ignored.
    fn close(&self);
}

/// Sender half used by outputs to report finished units.
pub type FinishedSender = UnboundedSender<UnitId>;

/// Schedules decoded chunks back-to-back on an [`AudioOutput`].
pub struct PlaybackScheduler {
    output: Arc<dyn AudioOutput>,
    next_playback_time: f64,
    active: BTreeMap<UnitId, PlaybackUnit>,
    next_id: u64,
}

impl PlaybackScheduler {
    /// Create a scheduler on top of `output`.
    pub fn new(output: Arc<dyn AudioOutput>) -> Self {
        Self { output, next_playback_time: 0.0, active: BTreeMap::new(), next_id: 0 }
    }

    /// Schedule `samples` right after everything already queued.
    ///
    /// Returns the scheduled unit. On error nothing is scheduled and the
    /// cursor does not move.
    pub fn enqueue(&mut self, samples: Vec<f32>, sample_rate_hz: u32) -> Result<PlaybackUnit> {
        if sample_rate_hz == 0 {
            return Err(RealtimeError::decode("Sample rate must be positive"));
        }
        let now = self.output.current_time();
        let start_time = now.max(self.next_playback_time);
        let unit = PlaybackUnit {
            id: UnitId(self.next_id),
            samples: samples.into(),
            sample_rate: sample_rate_hz,
            start_time,
        };
        self.next_id += 1;

        self.output.start(&unit)?;
        self.next_playback_time = unit.end_time();
        self.active.insert(unit.id, unit.clone());
        tracing::trace!(
            unit_id = %unit.id,
            start_time,
            next_playback_time = self.next_playback_time,
            "Scheduled playback unit"
        );
        Ok(unit)
    }

    /// Record that `id` finished playing.
    pub fn finished(&mut self, id: UnitId) {
        if self.active.remove(&id).is_none() {
            tracing::trace!(unit_id = %id, "Finished notification for inactive unit");
        }
    }

    /// Stop every active unit, clear the set and reset the cursor to zero.
    pub fn stop_all(&mut self) {
        let stopped = self.active.len();
        for id in self.active.keys() {
            self.output.stop(*id);
        }
        self.active.clear();
        self.next_playback_time = 0.0;
        tracing::debug!(stopped, "Stopped all playback");
    }

    /// End of the last scheduled unit, or zero after a stop.
    pub fn next_playback_time(&self) -> f64 {
        self.next_playback_time
    }

    /// Number of scheduled units that have not finished.
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Whether `id` is still scheduled.
    pub fn is_active(&self, id: UnitId) -> bool {
        self.active.contains_key(&id)
    }

    /// Snapshot of the active units ordered by id.
    pub fn active_units(&self) -> Vec<PlaybackUnit> {
        self.active.values().cloned().collect()
    }

    /// Stop everything and release the output device.
    pub fn close(&mut self) {
        self.stop_all();
        self.output.close();
    }
}

impl std::fmt::Debug for PlaybackScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackScheduler")
            .field("next_playback_time", &self.next_playback_time)
            .field("active", &self.active.len())
            .finish()
    }
}
