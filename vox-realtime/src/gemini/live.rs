//! WebSocket transport for the Gemini Live API.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use secrecy::ExposeSecret;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

use super::GEMINI_LIVE_URL;
use super::protocol::{outbound_message, setup_message, translate};
use crate::config::{Credentials, SessionConfig};
use crate::error::{RealtimeError, Result};
use crate::events::{InboundEvent, OutboundEvent};
use crate::transport::{Connection, EventStream, TransportConnector, TransportSink};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Opens Gemini Live sessions.
#[derive(Debug, Clone)]
pub struct GeminiConnector {
    credentials: Credentials,
    endpoint: String,
}

impl GeminiConnector {
    /// Connector for the public Live endpoint.
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials, endpoint: GEMINI_LIVE_URL.to_string() }
    }

    /// Use a different WebSocket endpoint (proxies, local test servers).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// The endpoint, without credentials.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| RealtimeError::config(format!("Invalid Live endpoint: {e}")))?;
        url.query_pairs_mut().append_pair("key", self.credentials.api_key.expose_secret());
        Ok(url)
    }
}

#[async_trait]
impl TransportConnector for GeminiConnector {
    fn provider(&self) -> &str {
        "gemini"
    }

    async fn open(&self, config: &SessionConfig) -> Result<Connection> {
        let request = self.request_url()?.as_str().into_client_request().map_err(|e| {
            RealtimeError::transport_open(format!("Failed to create client request: {e}"))
        })?;
        let (ws, _response) = connect_async(request)
            .await
            .map_err(|e| RealtimeError::transport_open(format!("WebSocket connect error: {e}")))?;
        let (writer, reader) = ws.split();

        let open = Arc::new(AtomicBool::new(true));
        let sink = Arc::new(GeminiSink { writer: Mutex::new(writer), open: open.clone() });

        sink.send_message(&setup_message(config))
            .await
            .map_err(|e| RealtimeError::transport_open(format!("Failed to send setup: {e}")))?;
        tracing::info!(model = %config.model, voice = %config.voice, "Sent setup message");

        Ok(Connection { sink, events: event_stream(reader, open) })
    }
}

/// Sending half of a Gemini Live connection.
pub struct GeminiSink {
    writer: Mutex<WsSink>,
    open: Arc<AtomicBool>,
}

impl GeminiSink {
    async fn send_message<T: Serialize>(&self, message: &T) -> Result<()> {
        let json = serde_json::to_string(message)?;
        let mut writer = self.writer.lock().await;
        writer.send(Message::Text(json.into())).await.map_err(|e| {
            self.open.store(false, Ordering::SeqCst);
            RealtimeError::transport(format!("Send error: {e}"))
        })
    }
}

#[async_trait]
impl TransportSink for GeminiSink {
    async fn send(&self, event: OutboundEvent) -> Result<()> {
        if !self.is_open() {
            return Err(RealtimeError::transport("Connection closed"));
        }
        self.send_message(&outbound_message(event)).await
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<()> {
        if !self.open.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        let mut writer = self.writer.lock().await;
        writer
            .send(Message::Close(None))
            .await
            .map_err(|e| RealtimeError::transport(format!("Close error: {e}")))?;
        tracing::debug!("Sent close frame");
        Ok(())
    }
}

impl std::fmt::Debug for GeminiSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiSink").field("open", &self.is_open()).finish()
    }
}

/// Turn the socket's read half into session events.
///
/// Ends after the first close frame or socket error.
fn event_stream(mut reader: WsSource, open: Arc<AtomicBool>) -> EventStream {
    Box::pin(async_stream::stream! {
        while let Some(message) = reader.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    for event in decode(text.as_str()) {
                        yield event;
                    }
                }
                Ok(Message::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                    Ok(text) => {
                        for event in decode(text) {
                            yield event;
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "Invalid UTF-8 in binary message"),
                },
                Ok(Message::Close(frame)) => {
                    open.store(false, Ordering::SeqCst);
                    let reason = frame
                        .map(|f| format!("{} (code {})", f.reason.as_str(), u16::from(f.code)));
                    tracing::info!(reason = ?reason, "Server closed the connection");
                    yield InboundEvent::Closed { reason };
                    return;
                }
                Ok(_) => {}
                Err(e) => {
                    open.store(false, Ordering::SeqCst);
                    yield InboundEvent::Error { message: format!("Receive error: {e}") };
                    return;
                }
            }
        }
        open.store(false, Ordering::SeqCst);
        yield InboundEvent::Closed { reason: None };
    })
}

fn decode(text: &str) -> Vec<InboundEvent> {
    match translate(text) {
        Ok(events) => events,
        Err(e) => {
            tracing::warn!(error = %e, "Ignoring unparseable server message");
            Vec::new()
        }
    }
}
