//! Desktop microphone and speaker through cpal.
//!
//! cpal streams are not `Send` on every platform, so each stream is built,
//! played and dropped on its own thread. Handles talk to that thread through
//! a stop channel.

use std::sync::Arc;
use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;

use crate::audio::downmix_to_mono;
use crate::devices::{AudioDevices, AudioInput, SampleCallback};
use crate::error::{RealtimeError, Result};
use crate::mixer::{Mixer, UnitPlacer};
use crate::playback::{AudioOutput, FinishedSender, PlaybackUnit, UnitId};

/// The host's default input and output devices.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpalDevices;

impl AudioDevices for CpalDevices {
    fn open_input(&self) -> Result<Box<dyn AudioInput>> {
        Ok(Box::new(CpalInput::open()?))
    }

    fn open_output(&self, finished: FinishedSender) -> Result<Arc<dyn AudioOutput>> {
        Ok(Arc::new(CpalOutput::open(finished)?))
    }
}

/// A stream owned by a dedicated thread.
struct StreamThread {
    stop: Option<std_mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl StreamThread {
    /// Spawn a thread that builds and plays a stream, then parks until stopped.
    fn spawn<F>(name: &str, build: F) -> Result<Self>
    where
        F: FnOnce() -> Result<cpal::Stream> + Send + 'static,
    {
        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<()>>();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let stream = match build().and_then(|stream| {
                    stream
                        .play()
                        .map_err(|e| RealtimeError::device(format!("Failed to start stream: {e}")))?;
                    Ok(stream)
                }) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                // Returns on stop() or when the handle is dropped
                let _ = stop_rx.recv();
                drop(stream);
            })
            .map_err(|e| RealtimeError::device(format!("Failed to spawn audio thread: {e}")))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self { stop: Some(stop_tx), handle: Some(handle) }),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => Err(RealtimeError::device("Audio thread exited during setup")),
        }
    }

    fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for StreamThread {
    fn drop(&mut self) {
        self.stop();
    }
}

fn stream_error(err: cpal::StreamError) {
    tracing::error!(error = %err, "Audio stream error");
}

/// Default input device.
pub struct CpalInput {
    sample_rate: u32,
    stream: Option<StreamThread>,
}

impl CpalInput {
    /// Check that a default input device exists and read its rate.
    pub fn open() -> Result<Self> {
        let (_, config) = default_input()?;
        let sample_rate = config.sample_rate().0;
        tracing::info!(sample_rate, channels = config.channels(), "Opened input device");
        Ok(Self { sample_rate, stream: None })
    }
}

fn default_input() -> Result<(cpal::Device, cpal::SupportedStreamConfig)> {
    let device = cpal::default_host()
        .default_input_device()
        .ok_or_else(|| RealtimeError::device("No input device available"))?;
    let config = device
        .default_input_config()
        .map_err(|e| RealtimeError::device(format!("Failed to read input config: {e}")))?;
    Ok((device, config))
}

impl AudioInput for CpalInput {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn start(&mut self, mut on_samples: SampleCallback) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        let thread = StreamThread::spawn("vox-input", move || {
            let (device, supported) = default_input()?;
            let channels = usize::from(supported.channels());
            let format = supported.sample_format();
            let config: cpal::StreamConfig = supported.into();

            let stream = match format {
                cpal::SampleFormat::F32 => device.build_input_stream(
                    &config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        on_samples(&downmix_to_mono(data, channels));
                    },
                    stream_error,
                    None,
                ),
                cpal::SampleFormat::I16 => device.build_input_stream(
                    &config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        let samples: Vec<f32> =
                            data.iter().map(|&s| f32::from(s) / 32768.0).collect();
                        on_samples(&downmix_to_mono(&samples, channels));
                    },
                    stream_error,
                    None,
                ),
                other => {
                    return Err(RealtimeError::device(format!(
                        "Unsupported input sample format: {other:?}"
                    )));
                }
            };
            stream.map_err(|e| RealtimeError::device(format!("Failed to build input stream: {e}")))
        })?;
        self.stream = Some(thread);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
            tracing::info!("Input device released");
        }
    }
}

impl Drop for CpalInput {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Default output device, mixing scheduled units on the device clock.
pub struct CpalOutput {
    mixer: Arc<Mutex<Mixer>>,
    placer: Mutex<UnitPlacer>,
    stream: Mutex<Option<StreamThread>>,
}

impl CpalOutput {
    /// Open the default output device and start rendering silence.
    pub fn open(finished: FinishedSender) -> Result<Self> {
        let device = cpal::default_host()
            .default_output_device()
            .ok_or_else(|| RealtimeError::device("No output device available"))?;
        let supported = device
            .default_output_config()
            .map_err(|e| RealtimeError::device(format!("Failed to read output config: {e}")))?;
        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels();
        drop(device);

        let mixer = Arc::new(Mutex::new(Mixer::new(sample_rate, channels, finished)));
        let render = mixer.clone();
        let thread = StreamThread::spawn("vox-output", move || {
            let device = cpal::default_host()
                .default_output_device()
                .ok_or_else(|| RealtimeError::device("No output device available"))?;
            let format = supported.sample_format();
            let config: cpal::StreamConfig = supported.into();

            let stream = match format {
                cpal::SampleFormat::F32 => device.build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| render.lock().render(data),
                    stream_error,
                    None,
                ),
                cpal::SampleFormat::I16 => {
                    let mut scratch = Vec::new();
                    device.build_output_stream(
                        &config,
                        move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                            scratch.resize(data.len(), 0.0);
                            render.lock().render(&mut scratch);
                            for (out, sample) in data.iter_mut().zip(&scratch) {
                                *out = (sample * 32767.0) as i16;
                            }
                        },
                        stream_error,
                        None,
                    )
                }
                other => {
                    return Err(RealtimeError::device(format!(
                        "Unsupported output sample format: {other:?}"
                    )));
                }
            };
            stream.map_err(|e| RealtimeError::device(format!("Failed to build output stream: {e}")))
        })?;

        tracing::info!(sample_rate, channels, "Opened output device");
        Ok(Self {
            mixer,
            placer: Mutex::new(UnitPlacer::new(sample_rate)),
            stream: Mutex::new(Some(thread)),
        })
    }
}

impl AudioOutput for CpalOutput {
    fn current_time(&self) -> f64 {
        self.mixer.lock().current_time()
    }

    fn start(&self, unit: &PlaybackUnit) -> Result<()> {
        if self.stream.lock().is_none() {
            return Err(RealtimeError::device("Output device closed"));
        }
        // Resample before taking the lock the render callback uses
        let voice = self.placer.lock().place(unit)?;
        self.mixer.lock().add(voice);
        Ok(())
    }

    fn stop(&self, id: UnitId) {
        self.mixer.lock().stop(id);
        self.placer.lock().reset();
    }

    fn close(&self) {
        if let Some(mut stream) = self.stream.lock().take() {
            stream.stop();
            self.mixer.lock().clear();
            tracing::info!("Output device released");
        }
    }
}

impl std::fmt::Debug for CpalOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpalOutput").field("mixer", &*self.mixer.lock()).finish()
    }
}
