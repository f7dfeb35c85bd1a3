//! Microphone capture: fixed windows, PCM framing, fire-and-forget sends.
//!
//! The device callback never waits on the network. It cuts the incoming
//! samples into windows, frames each one and `try_send`s it into a small
//! queue drained by a forwarding task. When the queue is full or the
//! transport is gone, the window is dropped.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::audio::{AudioFormat, StreamResampler, WindowBuffer};
use crate::devices::AudioInput;
use crate::error::Result;
use crate::events::OutboundEvent;
use crate::pcm;
use crate::transport::TransportSink;

/// Capture settings.
#[derive(Debug, Clone, Copy)]
pub struct CaptureOptions {
    /// Samples per window, at `sample_rate`.
    pub window: usize,
    /// Rate the transport expects.
    pub sample_rate: u32,
    /// Windows queued between the callback and the forwarding task.
    pub queue: usize,
}

/// A running capture pipeline.
pub struct CapturePipeline {
    input: Option<Box<dyn AudioInput>>,
    stopped: Arc<AtomicBool>,
    sent: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,
    forwarder: Option<JoinHandle<()>>,
}

impl CapturePipeline {
    /// Start streaming `input` to `sink`.
    ///
    /// Must be called from within a tokio runtime. On error the input is
    /// released before returning.
    pub fn start(
        mut input: Box<dyn AudioInput>,
        sink: Arc<dyn TransportSink>,
        options: CaptureOptions,
    ) -> Result<Self> {
        let device_rate = input.sample_rate();
        let mut resampler = if device_rate == options.sample_rate {
            None
        } else {
            match StreamResampler::new(device_rate, options.sample_rate) {
                Ok(resampler) => Some(resampler),
                Err(e) => {
                    input.stop();
                    return Err(e);
                }
            }
        };

        let stopped = Arc::new(AtomicBool::new(false));
        let sent = Arc::new(AtomicU64::new(0));
        let dropped = Arc::new(AtomicU64::new(0));
        let (tx, mut rx) = mpsc::channel::<OutboundEvent>(options.queue.max(1));

        let mime_type = AudioFormat::new(options.sample_rate, 1).mime_type();
        let mut windows = WindowBuffer::new(options.window);
        let callback_sink = sink.clone();
        let callback_stopped = stopped.clone();
        let callback_dropped = dropped.clone();

        let on_samples = Box::new(move |samples: &[f32]| {
            if callback_stopped.load(Ordering::Acquire) {
                return;
            }
            let resampled;
            let samples = match resampler.as_mut() {
                None => samples,
                Some(resampler) => match resampler.process(samples) {
                    Ok(output) => {
                        resampled = output;
                        &resampled[..]
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Dropped capture block");
                        return;
                    }
                },
            };
            windows.push(samples);
            while let Some(window) = windows.next_window() {
                if !callback_sink.is_open() {
                    callback_dropped.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
                let event = OutboundEvent::RealtimeAudio {
                    mime_type: mime_type.clone(),
                    data: pcm::encode(&window),
                };
                if tx.try_send(event).is_err() {
                    callback_dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
        });

        let forward_stopped = stopped.clone();
        let forward_sent = sent.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if forward_stopped.load(Ordering::Acquire) {
                    break;
                }
                match sink.send(event).await {
                    Ok(()) => {
                        forward_sent.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => tracing::debug!(error = %e, "Dropped capture window"),
                }
            }
            tracing::trace!("Capture forwarder finished");
        });

        if let Err(e) = input.start(on_samples) {
            stopped.store(true, Ordering::Release);
            input.stop();
            forwarder.abort();
            return Err(e);
        }
        tracing::info!(
            device_rate,
            window = options.window,
            sample_rate = options.sample_rate,
            "Capture started"
        );

        Ok(Self { input: Some(input), stopped, sent, dropped, forwarder: Some(forwarder) })
    }

    /// Stop capturing and release the input device.
    ///
    /// A send already in progress is left to finish on its own.
    pub fn stop(&mut self) {
        self.stopped.store(true, Ordering::Release);
        if let Some(mut input) = self.input.take() {
            input.stop();
            tracing::info!(
                sent = self.sent.load(Ordering::Relaxed),
                dropped = self.dropped.load(Ordering::Relaxed),
                "Capture stopped"
            );
        }
        // Detach: the forwarder exits once the callback (and its sender) is gone.
        self.forwarder.take();
    }

    /// Windows handed to the transport so far.
    pub fn sent_windows(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Windows dropped because the transport was unavailable or busy.
    pub fn dropped_windows(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Drop for CapturePipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for CapturePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapturePipeline")
            .field("running", &self.input.is_some())
            .field("sent", &self.sent_windows())
            .field("dropped", &self.dropped_windows())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::SampleCallback;
    use crate::error::RealtimeError;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<OutboundEvent>>,
        closed: AtomicBool,
    }

    #[async_trait]
    impl TransportSink for RecordingSink {
        async fn send(&self, event: OutboundEvent) -> Result<()> {
            self.sent.lock().push(event);
            Ok(())
        }

        fn is_open(&self) -> bool {
            !self.closed.load(Ordering::SeqCst)
        }

        async fn close(&self) -> Result<()> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Input that lets the test push samples through the installed callback.
    #[derive(Clone, Default)]
    struct PushInput {
        callback: Arc<Mutex<Option<SampleCallback>>>,
        stops: Arc<AtomicU64>,
        fail_start: bool,
        rate: Option<u32>,
    }

    impl PushInput {
        fn push(&self, samples: &[f32]) {
            if let Some(cb) = self.callback.lock().as_mut() {
                cb(samples);
            }
        }
    }

    impl AudioInput for PushInput {
        fn sample_rate(&self) -> u32 {
            self.rate.unwrap_or(16000)
        }

        fn start(&mut self, on_samples: SampleCallback) -> Result<()> {
            if self.fail_start {
                return Err(RealtimeError::device("microphone busy"));
            }
            *self.callback.lock() = Some(on_samples);
            Ok(())
        }

        fn stop(&mut self) {
            self.callback.lock().take();
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn options() -> CaptureOptions {
        CaptureOptions { window: 4, sample_rate: 16000, queue: 8 }
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test]
    async fn test_windows_are_framed_and_sent_in_order() {
        let sink = Arc::new(RecordingSink::default());
        let input = PushInput::default();
        let _pipeline =
            CapturePipeline::start(Box::new(input.clone()), sink.clone(), options()).unwrap();

        input.push(&[0.5, 0.5, 0.5]);
        input.push(&[0.5, -0.5, -0.5, -0.5, -0.5, 0.0]);
        settle().await;

        let sent = sink.sent.lock().clone();
        assert_eq!(sent.len(), 2);
        match &sent[1] {
            OutboundEvent::RealtimeAudio { mime_type, data } => {
                assert_eq!(mime_type, "audio/pcm;rate=16000");
                assert_eq!(pcm::decode(data).unwrap(), vec![-0.5; 4]);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_windows_dropped_without_live_transport() {
        let sink = Arc::new(RecordingSink::default());
        sink.closed.store(true, Ordering::SeqCst);
        let input = PushInput::default();
        let pipeline =
            CapturePipeline::start(Box::new(input.clone()), sink.clone(), options()).unwrap();

        input.push(&[0.1; 8]);
        settle().await;

        assert!(sink.sent.lock().is_empty());
        assert_eq!(pipeline.dropped_windows(), 2);
    }

    #[tokio::test]
    async fn test_stop_releases_device_once() {
        let sink = Arc::new(RecordingSink::default());
        let input = PushInput::default();
        let mut pipeline =
            CapturePipeline::start(Box::new(input.clone()), sink.clone(), options()).unwrap();

        pipeline.stop();
        pipeline.stop();
        drop(pipeline);

        assert_eq!(input.stops.load(Ordering::SeqCst), 1);
        input.push(&[0.1; 8]);
        settle().await;
        assert!(sink.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_start_failure_releases_device() {
        let sink = Arc::new(RecordingSink::default());
        let input = PushInput { fail_start: true, ..Default::default() };
        let err = CapturePipeline::start(Box::new(input.clone()), sink, options()).unwrap_err();

        assert!(matches!(err, RealtimeError::DeviceAccess(_)));
        assert_eq!(input.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_resampled_capture_keeps_real_time_rate() {
        let sink = Arc::new(RecordingSink::default());
        let input = PushInput { rate: Some(48_000), ..Default::default() };
        let options = CaptureOptions { window: 1000, sample_rate: 16000, queue: 1024 };
        let _pipeline =
            CapturePipeline::start(Box::new(input.clone()), sink.clone(), options).unwrap();

        // 32 s of 48 kHz audio in 512-frame callbacks is 512000 samples at 16 kHz
        for _ in 0..3000 {
            input.push(&[0.25; 512]);
        }
        settle().await;

        let windows = sink.sent.lock().len();
        assert!((511..=512).contains(&windows), "sent {windows} windows");
    }

    #[tokio::test]
    async fn test_unsupported_rate_releases_device() {
        let sink = Arc::new(RecordingSink::default());
        let input = PushInput { rate: Some(0), ..Default::default() };
        let err = CapturePipeline::start(Box::new(input.clone()), sink, options()).unwrap_err();

        assert!(matches!(err, RealtimeError::DeviceAccess(_)));
        assert_eq!(input.stops.load(Ordering::SeqCst), 1);
    }
}
