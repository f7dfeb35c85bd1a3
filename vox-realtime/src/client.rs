//! The voice client: connect, run and disconnect one live session.
//!
//! Each connected session is driven by a single task that owns every piece
//! of mutable session state (state machine, playback scheduler, capture
//! pipeline, in-flight tool calls). The task multiplexes:
//!
//! - commands from the [`VoiceClient`] handle (disconnect, snapshot),
//! - finished-playback notifications from the output device,
//! - tool call completions,
//! - inbound transport events.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::{FutureExt, StreamExt};
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::Instant;
use tracing::Instrument;

use crate::capture::{CaptureOptions, CapturePipeline};
use crate::config::{ClientOptions, SessionConfig, Voice};
use crate::devices::{AudioInput, BoxedDevices};
use crate::error::{RealtimeError, Result};
use crate::events::{InboundEvent, OutboundEvent, ToolCall, ToolResponse};
use crate::image::{CreateImageTool, ImageGenerator};
use crate::observer::{NoOpObserver, SessionObserver};
use crate::playback::{AudioOutput, PlaybackScheduler, PlaybackUnit, UnitId};
use crate::session::{CloseReason, SessionAction, SessionMachine, SessionState};
use crate::tools::{ToolAction, ToolCompletion, ToolDispatcher};
use crate::transport::{BoxedConnector, EventStream, TransportSink};

/// Builder for [`VoiceClient`].
pub struct VoiceClientBuilder {
    connector: Option<BoxedConnector>,
    devices: Option<BoxedDevices>,
    observer: Option<Arc<dyn SessionObserver>>,
    image_generator: Option<Arc<dyn ImageGenerator>>,
    tools: Vec<Arc<dyn ToolAction>>,
    config: SessionConfig,
    options: ClientOptions,
}

impl Default for VoiceClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl VoiceClientBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            connector: None,
            devices: None,
            observer: None,
            image_generator: None,
            tools: Vec::new(),
            config: SessionConfig::default(),
            options: ClientOptions::default(),
        }
    }

    /// Set the transport connector.
    pub fn connector(mut self, connector: BoxedConnector) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Set the audio device factory.
    pub fn devices(mut self, devices: BoxedDevices) -> Self {
        self.devices = Some(devices);
        self
    }

    /// Set the observer receiving transcripts, images and status changes.
    pub fn observer(mut self, observer: impl SessionObserver + 'static) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }

    /// Set a shared observer.
    pub fn observer_arc(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Enable the `create_image` tool backed by `generator`.
    pub fn image_generator(mut self, generator: impl ImageGenerator + 'static) -> Self {
        self.image_generator = Some(Arc::new(generator));
        self
    }

    /// Register an additional tool action.
    pub fn tool(mut self, action: impl ToolAction + 'static) -> Self {
        self.tools.push(Arc::new(action));
        self
    }

    /// Set the session configuration template. The voice is chosen per connect.
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the system instruction.
    pub fn instruction(mut self, instruction: impl Into<String>) -> Self {
        self.config.instruction = Some(instruction.into());
        self
    }

    /// Set the model.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    /// Set client options.
    pub fn options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    /// Build the client (does not connect yet).
    pub fn build(self) -> Result<VoiceClient> {
        let connector =
            self.connector.ok_or_else(|| RealtimeError::config("Transport connector is required"))?;
        let devices = self.devices.ok_or_else(|| RealtimeError::config("Audio devices are required"))?;
        let observer = self.observer.unwrap_or_else(|| Arc::new(NoOpObserver));

        let mut dispatcher = ToolDispatcher::new();
        if let Some(generator) = self.image_generator {
            dispatcher = dispatcher.register(CreateImageTool::new(generator, observer.clone()));
        }
        for action in self.tools {
            dispatcher = dispatcher.register_arc(action);
        }

        // Advertise exactly what can be dispatched
        let mut config = self.config;
        if !dispatcher.is_empty() {
            config.tools = dispatcher.declarations();
        }

        Ok(VoiceClient {
            connector,
            devices,
            observer,
            dispatcher: Arc::new(dispatcher),
            config,
            options: self.options,
            session: Mutex::new(None),
        })
    }
}

/// Point-in-time view of a running session.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    /// Session ID.
    pub session_id: String,
    /// Lifecycle state.
    pub state: SessionState,
    /// End of the last scheduled playback unit, zero after a stop.
    pub next_playback_time: f64,
    /// Scheduled units that have not finished, ordered by id.
    pub active_units: Vec<PlaybackUnit>,
    /// Tool calls still in flight.
    pub pending_tools: usize,
    /// Current-turn user transcript.
    pub input_transcript: String,
    /// Current-turn model transcript.
    pub output_transcript: String,
    /// Capture windows handed to the transport.
    pub sent_windows: u64,
    /// Capture windows dropped.
    pub dropped_windows: u64,
}

enum Command {
    Disconnect(oneshot::Sender<()>),
    Snapshot(oneshot::Sender<SessionSnapshot>),
}

struct SessionHandle {
    id: String,
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<SessionState>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    fn is_live(&self) -> bool {
        !self.task.is_finished() && !self.state.borrow().is_shutting_down()
    }
}

/// A real-time voice client.
///
/// At most one session is open at a time.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use vox_realtime::gemini::{GeminiConnector, GeminiImageGenerator};
/// use vox_realtime::{Credentials, Voice, VoiceClient};
///
/// let credentials = Credentials::from_env()?;
/// let client = VoiceClient::builder()
///     .connector(Arc::new(GeminiConnector::new(credentials.clone())))
///     .devices(Arc::new(vox_realtime::desktop::CpalDevices::default()))
///     .image_generator(GeminiImageGenerator::new(credentials))
///     .observer(MyUi::new())
///     .build()?;
///
/// client.connect(Voice::Kore).await?;
/// // ... talk ...
/// client.disconnect().await;
/// ```
pub struct VoiceClient {
    connector: BoxedConnector,
    devices: BoxedDevices,
    observer: Arc<dyn SessionObserver>,
    dispatcher: Arc<ToolDispatcher>,
    config: SessionConfig,
    options: ClientOptions,
    session: Mutex<Option<SessionHandle>>,
}

impl VoiceClient {
    /// Create a new builder.
    pub fn builder() -> VoiceClientBuilder {
        VoiceClientBuilder::new()
    }

    /// Session configuration template (tools already injected).
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Open a session with `voice`.
    ///
    /// Acquires the microphone, then the speaker, then opens the transport.
    /// Returns once the remote side has confirmed the session; by then
    /// capture is running and the status callback has fired with `true`.
    ///
    /// On failure every acquired handle is released, the status callback
    /// fires with `false`, and the error is returned.
    pub async fn connect(&self, voice: Voice) -> Result<()> {
        let mut slot = self.session.lock().await;
        if slot.as_ref().is_some_and(SessionHandle::is_live) {
            return Err(RealtimeError::AlreadyConnected);
        }
        slot.take();

        let session_id = uuid::Uuid::new_v4().to_string();
        let span = vox_telemetry::session_span(&session_id, voice.as_str());
        let handle = self.start_session(session_id, voice).instrument(span).await?;
        *slot = Some(handle);
        Ok(())
    }

    async fn start_session(&self, session_id: String, voice: Voice) -> Result<SessionHandle> {
        let mut machine = SessionMachine::new();
        machine.begin_connect()?;
        let config = self.config.clone().with_voice(voice);
        let deadline = Instant::now() + self.options.open_timeout;
        tracing::info!(model = %config.model, "Connecting");

        let mut acquired = Acquired::default();
        match self.devices.open_input() {
            Ok(input) => acquired.input = Some(input),
            Err(e) => return Err(self.abort_connect(&mut machine, acquired, e).await),
        }

        let (finished_tx, finished_rx) = mpsc::unbounded_channel();
        let output = match self.devices.open_output(finished_tx) {
            Ok(output) => output,
            Err(e) => return Err(self.abort_connect(&mut machine, acquired, e).await),
        };
        acquired.output = Some(output.clone());

        let open_span = vox_telemetry::transport_open_span(self.connector.provider(), &config.model);
        let opened = tokio::time::timeout_at(deadline, self.connector.open(&config))
            .instrument(open_span)
            .await;
        let connection = match opened {
            Ok(Ok(connection)) => connection,
            Ok(Err(e)) => return Err(self.abort_connect(&mut machine, acquired, e).await),
            Err(_) => {
                let e = RealtimeError::transport_open("Timed out opening the connection");
                return Err(self.abort_connect(&mut machine, acquired, e).await);
            }
        };
        acquired.sink = Some(connection.sink.clone());

        let mut events = connection.events;
        match tokio::time::timeout_at(deadline, wait_for_open(&mut events)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(self.abort_connect(&mut machine, acquired, e).await),
            Err(_) => {
                let e = RealtimeError::transport_open("Timed out waiting for session setup");
                return Err(self.abort_connect(&mut machine, acquired, e).await);
            }
        }

        let (state_tx, state_rx) = watch::channel(machine.state());
        let (commands_tx, commands_rx) = mpsc::channel(16);
        let mut task = SessionTask {
            session_id: session_id.clone(),
            machine,
            input: acquired.input.take(),
            capture: None,
            playback: PlaybackScheduler::new(output),
            output_released: false,
            sink: connection.sink,
            events,
            finished: finished_rx,
            commands: commands_rx,
            tools: JoinSet::new(),
            dispatcher: self.dispatcher.clone(),
            observer: self.observer.clone(),
            options: self.options.clone(),
            state: state_tx,
        };

        let actions = task.machine.dispatch(InboundEvent::Opened);
        if let Err(e) = task.apply(actions).await {
            tracing::warn!(error = %e, "Failed to start session");
            task.shutdown(CloseReason::ConnectFailed(e.to_string()), None).await;
            return Err(e);
        }
        tracing::info!("Session active");

        let task = tokio::spawn(task.run().in_current_span());
        Ok(SessionHandle { id: session_id, commands: commands_tx, state: state_rx, task })
    }

    async fn abort_connect(
        &self,
        machine: &mut SessionMachine,
        mut acquired: Acquired,
        error: RealtimeError,
    ) -> RealtimeError {
        tracing::warn!(error = %error, "Connect failed");
        for action in machine.close(CloseReason::ConnectFailed(error.to_string())) {
            match action {
                SessionAction::Teardown(_) => acquired.release().await,
                SessionAction::Status(active) => {
                    self.observer
                        .on_status_change(active)
                        .instrument(vox_telemetry::callback_span("status"))
                        .await
                }
                _ => {}
            }
        }
        machine.finish_close();
        error
    }

    /// Close the session.
    ///
    /// Stops capture, releases the devices, fires the status callback with
    /// `false` and drops the transport. Never fails; calling it without an
    /// open session (or twice) does nothing. Tool calls still running are
    /// allowed to finish in the background up to the drain timeout.
    pub async fn disconnect(&self) {
        let Some(handle) = self.session.lock().await.take() else {
            tracing::debug!("Disconnect without an open session");
            return;
        };
        let (ack_tx, ack_rx) = oneshot::channel();
        if handle.commands.send(Command::Disconnect(ack_tx)).await.is_ok() {
            // Err means the task already finished on its own
            let _ = ack_rx.await;
        }
        tracing::debug!(session.id = %handle.id, "Disconnected");
    }

    /// Current lifecycle state; `Idle` when no session was opened.
    pub async fn state(&self) -> SessionState {
        match self.session.lock().await.as_ref() {
            Some(handle) => *handle.state.borrow(),
            None => SessionState::Idle,
        }
    }

    /// Whether a session is open and streaming.
    pub async fn is_active(&self) -> bool {
        self.state().await.is_live()
    }

    /// ID of the current session.
    pub async fn session_id(&self) -> Option<String> {
        self.session.lock().await.as_ref().map(|h| h.id.clone())
    }

    /// Receiver for state changes of the current session.
    pub async fn watch_state(&self) -> Option<watch::Receiver<SessionState>> {
        self.session.lock().await.as_ref().map(|h| h.state.clone())
    }

    /// Snapshot of the current session, if its task is still running.
    pub async fn snapshot(&self) -> Option<SessionSnapshot> {
        let commands = self.session.lock().await.as_ref().map(|h| h.commands.clone())?;
        let (tx, rx) = oneshot::channel();
        commands.send(Command::Snapshot(tx)).await.ok()?;
        rx.await.ok()
    }
}

impl std::fmt::Debug for VoiceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceClient")
            .field("provider", &self.connector.provider())
            .field("model", &self.config.model)
            .field("tools", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

/// Consume events until the remote side confirms the session.
async fn wait_for_open(events: &mut EventStream) -> Result<()> {
    while let Some(event) = events.next().await {
        match event {
            InboundEvent::Opened => return Ok(()),
            InboundEvent::Closed { reason } => {
                return Err(RealtimeError::transport_open(
                    reason.unwrap_or_else(|| "Connection closed during setup".to_string()),
                ));
            }
            InboundEvent::Error { message } => return Err(RealtimeError::transport_open(message)),
            other => tracing::debug!(event = ?other, "Ignoring event before setup completed"),
        }
    }
    Err(RealtimeError::transport_open("Connection ended during setup"))
}

/// Handles acquired while connecting, released on failure.
#[derive(Default)]
struct Acquired {
    input: Option<Box<dyn AudioInput>>,
    output: Option<Arc<dyn AudioOutput>>,
    sink: Option<Arc<dyn TransportSink>>,
}

impl Acquired {
    async fn release(&mut self) {
        if let Some(mut input) = self.input.take() {
            input.stop();
        }
        if let Some(output) = self.output.take() {
            output.close();
        }
        if let Some(sink) = self.sink.take() {
            if let Err(e) = sink.close().await {
                tracing::debug!(error = %e, "Error closing transport");
            }
        }
    }
}

struct SessionTask {
    session_id: String,
    machine: SessionMachine,
    input: Option<Box<dyn AudioInput>>,
    capture: Option<CapturePipeline>,
    playback: PlaybackScheduler,
    output_released: bool,
    sink: Arc<dyn TransportSink>,
    events: EventStream,
    finished: mpsc::UnboundedReceiver<UnitId>,
    commands: mpsc::Receiver<Command>,
    tools: JoinSet<(String, Option<ToolCompletion>)>,
    dispatcher: Arc<ToolDispatcher>,
    observer: Arc<dyn SessionObserver>,
    options: ClientOptions,
    state: watch::Sender<SessionState>,
}

impl SessionTask {
    async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Disconnect(ack)) => {
                        self.shutdown(CloseReason::Requested, Some(ack)).await;
                        break;
                    }
                    Some(Command::Snapshot(reply)) => {
                        let _ = reply.send(self.snapshot());
                    }
                    None => {
                        self.shutdown(CloseReason::ClientDropped, None).await;
                        break;
                    }
                },
                Some(id) = self.finished.recv() => self.playback.finished(id),
                Some(joined) = self.tools.join_next(), if !self.tools.is_empty() => {
                    self.tool_joined(joined);
                }
                event = self.events.next() => match event {
                    Some(event) => {
                        let actions = self.machine.dispatch(event);
                        if let Err(e) = self.apply(actions).await {
                            tracing::warn!(error = %e, "Session action failed");
                        }
                        if self.machine.state() == SessionState::Closing {
                            self.finish().await;
                            break;
                        }
                    }
                    None => {
                        self.shutdown(CloseReason::RemoteClosed(None), None).await;
                        break;
                    }
                },
            }
        }
    }

    async fn apply(&mut self, actions: Vec<SessionAction>) -> Result<()> {
        for action in actions {
            match action {
                SessionAction::StartCapture => self.start_capture()?,
                SessionAction::PlayAudio(samples) => {
                    if let Err(e) = self.playback.enqueue(samples, self.options.output_sample_rate) {
                        tracing::warn!(error = %e, "Failed to schedule audio");
                    }
                }
                SessionAction::StopPlayback => self.playback.stop_all(),
                SessionAction::Transcript(update) => {
                    self.observer
                        .on_transcript_update(&update.input, &update.output, update.is_final)
                        .instrument(vox_telemetry::callback_span("transcript"))
                        .await;
                }
                SessionAction::DispatchTools(calls) => {
                    for call in calls {
                        self.spawn_tool(call);
                    }
                }
                SessionAction::Status(active) => {
                    self.publish();
                    self.observer
                        .on_status_change(active)
                        .instrument(vox_telemetry::callback_span("status"))
                        .await;
                }
                SessionAction::Teardown(reason) => self.release_devices(&reason),
            }
        }
        self.publish();
        Ok(())
    }

    fn start_capture(&mut self) -> Result<()> {
        let Some(input) = self.input.take() else {
            return Ok(());
        };
        let options = CaptureOptions {
            window: self.options.capture_window,
            sample_rate: self.options.input_sample_rate,
            queue: self.options.capture_queue,
        };
        self.capture = Some(CapturePipeline::start(input, self.sink.clone(), options)?);
        Ok(())
    }

    fn spawn_tool(&mut self, call: ToolCall) {
        tracing::info!(tool = %call.name, call_id = %call.id, "Dispatching tool call");
        let dispatcher = self.dispatcher.clone();
        let sink = self.sink.clone();
        self.tools.spawn(async move {
            let id = call.id.clone();
            let outcome =
                AssertUnwindSafe(dispatcher.dispatch(call.clone(), sink.clone())).catch_unwind().await;
            match outcome {
                Ok(completion) => (id, Some(completion)),
                Err(_) => {
                    tracing::error!(tool = %call.name, call_id = %id, "Tool action panicked");
                    if sink.is_open() {
                        let response = ToolResponse::error(&call, "Tool action panicked");
                        let _ = sink.send(OutboundEvent::ToolResponse(response)).await;
                    }
                    (id, None)
                }
            }
        });
    }

    fn tool_joined(&mut self, joined: std::result::Result<(String, Option<ToolCompletion>), JoinError>) {
        match joined {
            Ok((id, _)) => self.machine.tool_finished(&id),
            Err(e) => tracing::warn!(error = %e, "Tool task ended abnormally"),
        }
        self.publish();
    }

    fn release_devices(&mut self, reason: &CloseReason) {
        if let Some(mut capture) = self.capture.take() {
            capture.stop();
        }
        if let Some(mut input) = self.input.take() {
            input.stop();
        }
        if !self.output_released {
            self.playback.close();
            self.output_released = true;
        }
        tracing::info!(%reason, "Released audio devices");
    }

    async fn shutdown(&mut self, reason: CloseReason, ack: Option<oneshot::Sender<()>>) {
        let actions = self.machine.close(reason);
        if let Err(e) = self.apply(actions).await {
            tracing::debug!(error = %e, "Error during teardown");
        }
        if let Some(ack) = ack {
            let _ = ack.send(());
        }
        self.finish().await;
    }

    /// Let in-flight tool calls finish, then drop the transport.
    ///
    /// Devices are already released here, so a disconnect arriving while
    /// tools drain is acknowledged at once.
    async fn finish(&mut self) {
        let deadline = tokio::time::sleep_until(Instant::now() + self.options.tool_drain_timeout);
        tokio::pin!(deadline);
        let mut commands_open = true;
        while !self.tools.is_empty() {
            tokio::select! {
                joined = self.tools.join_next() => match joined {
                    Some(joined) => self.tool_joined(joined),
                    None => break,
                },
                command = self.commands.recv(), if commands_open => match command {
                    Some(Command::Disconnect(ack)) => {
                        let _ = ack.send(());
                    }
                    Some(Command::Snapshot(reply)) => {
                        let _ = reply.send(self.snapshot());
                    }
                    None => commands_open = false,
                },
                _ = &mut deadline => {
                    tracing::warn!(remaining = self.tools.len(), "Detaching unfinished tool calls");
                    self.tools.detach_all();
                    break;
                }
            }
        }

        if let Err(e) = self.sink.close().await {
            tracing::debug!(error = %e, "Error closing transport");
        }
        self.machine.finish_close();
        self.publish();
        tracing::info!("Session closed");
    }

    fn publish(&self) {
        self.state.send_if_modified(|current| {
            let next = self.machine.state();
            let changed = *current != next;
            *current = next;
            changed
        });
    }

    fn snapshot(&self) -> SessionSnapshot {
        let (sent_windows, dropped_windows) = self
            .capture
            .as_ref()
            .map(|c| (c.sent_windows(), c.dropped_windows()))
            .unwrap_or_default();
        SessionSnapshot {
            session_id: self.session_id.clone(),
            state: self.machine.state(),
            next_playback_time: self.playback.next_playback_time(),
            active_units: self.playback.active_units(),
            pending_tools: self.machine.pending_tools().len(),
            input_transcript: self.machine.transcript().input().to_string(),
            output_transcript: self.machine.transcript().output().to_string(),
            sent_windows,
            dropped_windows,
        }
    }
}
