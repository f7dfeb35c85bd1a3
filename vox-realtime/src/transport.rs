//! The bidirectional streaming connection to the remote model.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;

use crate::config::SessionConfig;
use crate::error::Result;
use crate::events::{InboundEvent, OutboundEvent};

/// Stream of events arriving from the remote model.
///
/// Ends after a terminal event ([`InboundEvent::Closed`] or
/// [`InboundEvent::Error`]) or when the connection drops.
pub type EventStream = Pin<Box<dyn Stream<Item = InboundEvent> + Send>>;

/// The sending half of an open connection.
///
/// Sends are independent of each other; implementations serialize writes
/// internally so concurrent callers never interleave frames.
#[async_trait]
pub trait TransportSink: Send + Sync {
    /// Send one event.
    async fn send(&self, event: OutboundEvent) -> Result<()>;

    /// Whether the connection can still carry outbound events.
    fn is_open(&self) -> bool;

    /// Close the connection. Calling this more than once is harmless.
    async fn close(&self) -> Result<()>;
}

/// An open connection: an outbound sink plus the inbound event stream.
pub struct Connection {
    /// Sending half, shared with the capture pipeline and tool dispatcher.
    pub sink: Arc<dyn TransportSink>,
    /// Receiving half, owned by the session task.
    pub events: EventStream,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").field("open", &self.sink.is_open()).finish()
    }
}

/// A factory for connections.
///
/// # Example
///
/// ```rust,ignore
/// use vox_realtime::gemini::GeminiConnector;
/// use vox_realtime::{Credentials, SessionConfig, TransportConnector};
///
/// let connector = GeminiConnector::new(Credentials::from_env()?);
/// let connection = connector.open(&SessionConfig::default()).await?;
/// ```
#[async_trait]
pub trait TransportConnector: Send + Sync {
    /// Provider name (e.g., "gemini").
    fn provider(&self) -> &str;

    /// Open a connection and send the session setup.
    ///
    /// The returned stream yields [`InboundEvent::Opened`] once the server
    /// has accepted the setup. Failures here are `TransportOpen` errors.
    async fn open(&self, config: &SessionConfig) -> Result<Connection>;
}

/// A shared connector type for thread-safe access.
pub type BoxedConnector = Arc<dyn TransportConnector>;
