//! Device seams: microphone input and speaker output factories.

use std::sync::Arc;

use crate::error::Result;
use crate::playback::{AudioOutput, FinishedSender};

/// Callback receiving mono float samples from the input device.
///
/// Runs on the driver's delivery thread and must return quickly.
pub type SampleCallback = Box<dyn FnMut(&[f32]) + Send + 'static>;

/// A microphone that has been acquired but not necessarily started.
pub trait AudioInput: Send {
    /// Sample rate of the samples handed to the callback.
    fn sample_rate(&self) -> u32;

    /// Start delivering samples to `on_samples`.
    fn start(&mut self, on_samples: SampleCallback) -> Result<()>;

    /// Stop delivery and release the device. Calling this twice is harmless.
    fn stop(&mut self);
}

/// Opens the devices a session needs.
pub trait AudioDevices: Send + Sync {
    /// Acquire the microphone. Fails with `DeviceAccess` when unavailable.
    fn open_input(&self) -> Result<Box<dyn AudioInput>>;

    /// Acquire the speaker. Finished units are reported on `finished`.
    fn open_output(&self, finished: FinishedSender) -> Result<Arc<dyn AudioOutput>>;
}

/// A shared device factory.
pub type BoxedDevices = Arc<dyn AudioDevices>;
