//! Scripted transport, devices and observer shared by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc::{UnboundedSender, unbounded};
use parking_lot::Mutex;
use tokio::sync::Notify;
use vox_realtime::{
    AudioDevices, AudioInput, AudioOutput, Connection, FinishedSender, InboundEvent, OutboundEvent,
    PlaybackUnit, RealtimeError, Result, SampleCallback, SessionConfig, SessionObserver,
    SessionSnapshot, ToolResponse, TransportConnector, TransportSink, UnitId, VoiceClient,
    VoiceClientBuilder,
};

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Records everything sent over one connection.
#[derive(Default)]
pub struct RecordingSink {
    pub sent: Mutex<Vec<OutboundEvent>>,
    pub closed: AtomicBool,
    /// When set, every send waits for a permit before completing.
    pub gate: Option<Arc<Notify>>,
    pub in_flight: AtomicUsize,
}

impl RecordingSink {
    pub fn tool_responses(&self) -> Vec<ToolResponse> {
        self.sent
            .lock()
            .iter()
            .filter_map(|event| match event {
                OutboundEvent::ToolResponse(response) => Some(response.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn audio_windows(&self) -> usize {
        self.sent
            .lock()
            .iter()
            .filter(|event| matches!(event, OutboundEvent::RealtimeAudio { .. }))
            .count()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn sends_in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransportSink for RecordingSink {
    async fn send(&self, event: OutboundEvent) -> Result<()> {
        if let Some(gate) = &self.gate {
            self.in_flight.fetch_add(1, Ordering::SeqCst);
            gate.notified().await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
        if self.is_closed() {
            return Err(RealtimeError::transport("closed"));
        }
        self.sent.lock().push(event);
        Ok(())
    }

    fn is_open(&self) -> bool {
        !self.is_closed()
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// The remote end of one mock connection.
#[derive(Clone)]
pub struct Server {
    pub events: UnboundedSender<InboundEvent>,
    pub sink: Arc<RecordingSink>,
}

impl Server {
    pub fn send(&self, event: InboundEvent) {
        self.events.unbounded_send(event).expect("session stream dropped");
    }
}

/// Connector whose connections are driven by the test.
pub struct MockConnector {
    initial: Vec<InboundEvent>,
    fail: Option<String>,
    send_gate: Mutex<Option<Arc<Notify>>>,
    pub configs: Mutex<Vec<SessionConfig>>,
    servers: Mutex<Vec<Server>>,
}

impl MockConnector {
    /// Every connection confirms immediately.
    pub fn new() -> Arc<Self> {
        Self::scripted(vec![InboundEvent::Opened])
    }

    /// Every connection starts with `initial` queued.
    pub fn scripted(initial: Vec<InboundEvent>) -> Arc<Self> {
        Arc::new(Self {
            initial,
            fail: None,
            send_gate: Mutex::new(None),
            configs: Mutex::new(Vec::new()),
            servers: Mutex::new(Vec::new()),
        })
    }

    /// Every open fails with `message`.
    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            initial: Vec::new(),
            fail: Some(message.to_string()),
            send_gate: Mutex::new(None),
            configs: Mutex::new(Vec::new()),
            servers: Mutex::new(Vec::new()),
        })
    }

    /// Sends on connections opened from now on wait on `gate`.
    pub fn gate_sends(&self, gate: Arc<Notify>) {
        *self.send_gate.lock() = Some(gate);
    }

    pub fn server(&self, index: usize) -> Server {
        self.servers.lock()[index].clone()
    }

    pub fn last_server(&self) -> Server {
        self.servers.lock().last().cloned().expect("no connection opened")
    }

    pub fn connections(&self) -> usize {
        self.servers.lock().len()
    }
}

#[async_trait]
impl TransportConnector for MockConnector {
    fn provider(&self) -> &str {
        "mock"
    }

    async fn open(&self, config: &SessionConfig) -> Result<Connection> {
        self.configs.lock().push(config.clone());
        if let Some(message) = &self.fail {
            return Err(RealtimeError::transport_open(message.clone()));
        }
        let (tx, rx) = unbounded();
        for event in &self.initial {
            let _ = tx.unbounded_send(event.clone());
        }
        let sink = Arc::new(RecordingSink {
            gate: self.send_gate.lock().clone(),
            ..Default::default()
        });
        self.servers.lock().push(Server { events: tx, sink: sink.clone() });
        Ok(Connection { sink, events: Box::pin(rx) })
    }
}

// ---------------------------------------------------------------------------
// Devices
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InputState {
    callback: Mutex<Option<SampleCallback>>,
    pub opened: AtomicUsize,
    pub stopped: AtomicBool,
    pub stops: AtomicUsize,
}

impl InputState {
    /// Deliver samples as the driver would.
    pub fn push(&self, samples: &[f32]) {
        if let Some(callback) = self.callback.lock().as_mut() {
            callback(samples);
        }
    }

    pub fn is_started(&self) -> bool {
        self.callback.lock().is_some()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

struct MockInput {
    state: Arc<InputState>,
}

impl AudioInput for MockInput {
    fn sample_rate(&self) -> u32 {
        16_000
    }

    fn start(&mut self, on_samples: SampleCallback) -> Result<()> {
        *self.state.callback.lock() = Some(on_samples);
        Ok(())
    }

    fn stop(&mut self) {
        self.state.callback.lock().take();
        self.state.stopped.store(true, Ordering::SeqCst);
        self.state.stops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Speaker with a hand-driven clock.
#[derive(Default)]
pub struct MockOutput {
    pub now: Mutex<f64>,
    pub started: Mutex<Vec<PlaybackUnit>>,
    pub stopped: Mutex<Vec<UnitId>>,
    pub closed: AtomicBool,
    pub closes: AtomicUsize,
}

impl MockOutput {
    pub fn set_time(&self, seconds: f64) {
        *self.now.lock() = seconds;
    }

    pub fn start_times(&self) -> Vec<f64> {
        self.started.lock().iter().map(|unit| unit.start_time).collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl AudioOutput for MockOutput {
    fn current_time(&self) -> f64 {
        *self.now.lock()
    }

    fn start(&self, unit: &PlaybackUnit) -> Result<()> {
        self.started.lock().push(unit.clone());
        Ok(())
    }

    fn stop(&self, id: UnitId) {
        self.stopped.lock().push(id);
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct MockDevices {
    pub input: Arc<InputState>,
    pub output: Arc<MockOutput>,
    pub finished: Mutex<Option<FinishedSender>>,
    pub fail_input: bool,
    pub fail_output: bool,
}

impl MockDevices {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn without_microphone() -> Arc<Self> {
        Arc::new(Self { fail_input: true, ..Default::default() })
    }

    pub fn without_speaker() -> Arc<Self> {
        Arc::new(Self { fail_output: true, ..Default::default() })
    }

    /// Report `id` as fully played.
    pub fn finish(&self, id: UnitId) {
        if let Some(tx) = self.finished.lock().as_ref() {
            let _ = tx.send(id);
        }
    }
}

impl AudioDevices for MockDevices {
    fn open_input(&self) -> Result<Box<dyn AudioInput>> {
        if self.fail_input {
            return Err(RealtimeError::device("microphone permission denied"));
        }
        self.input.opened.fetch_add(1, Ordering::SeqCst);
        self.input.stopped.store(false, Ordering::SeqCst);
        Ok(Box::new(MockInput { state: self.input.clone() }))
    }

    fn open_output(&self, finished: FinishedSender) -> Result<Arc<dyn AudioOutput>> {
        if self.fail_output {
            return Err(RealtimeError::device("no speaker"));
        }
        self.output.closed.store(false, Ordering::SeqCst);
        *self.finished.lock() = Some(finished);
        Ok(self.output.clone())
    }
}

// ---------------------------------------------------------------------------
// Observer
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingObserver {
    pub transcripts: Mutex<Vec<(String, String, bool)>>,
    pub images: Mutex<Vec<String>>,
    pub statuses: Mutex<Vec<bool>>,
}

impl RecordingObserver {
    pub fn statuses(&self) -> Vec<bool> {
        self.statuses.lock().clone()
    }
}

#[async_trait]
impl SessionObserver for RecordingObserver {
    async fn on_transcript_update(&self, input: &str, output: &str, is_final: bool) {
        self.transcripts.lock().push((input.to_string(), output.to_string(), is_final));
    }

    async fn on_image_generated(&self, base64_data: &str) {
        self.images.lock().push(base64_data.to_string());
    }

    async fn on_status_change(&self, is_active: bool) {
        self.statuses.lock().push(is_active);
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub struct Harness {
    pub connector: Arc<MockConnector>,
    pub devices: Arc<MockDevices>,
    pub observer: Arc<RecordingObserver>,
}

impl Harness {
    pub fn new(connector: Arc<MockConnector>, devices: Arc<MockDevices>) -> Self {
        Self { connector, devices, observer: Arc::new(RecordingObserver::default()) }
    }

    pub fn builder(&self) -> VoiceClientBuilder {
        VoiceClient::builder()
            .connector(self.connector.clone())
            .devices(self.devices.clone())
            .observer_arc(self.observer.clone())
    }

    pub fn client(&self) -> VoiceClient {
        self.builder().build().expect("client")
    }
}

/// Poll `condition` until it holds, failing after two seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}

/// Poll snapshots until `condition` holds.
pub async fn wait_for_snapshot(
    client: &VoiceClient,
    condition: impl Fn(&SessionSnapshot) -> bool,
) -> SessionSnapshot {
    for _ in 0..200 {
        if let Some(snapshot) = client.snapshot().await {
            if condition(&snapshot) {
                return snapshot;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("snapshot condition not met in time");
}
