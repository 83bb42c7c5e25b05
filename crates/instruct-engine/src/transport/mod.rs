//! Stream and cancel channels to the generation server.

mod cancel;
mod error;
mod websocket;

use anyhow::Result;
use instruct_contracts::protocol::RequestId;
use instruct_contracts::request::GenerationRequest;

use crate::config::ClientConfig;

pub use cancel::HttpCanceller;
pub use error::{TransportError, TransportErrorKind};
pub use websocket::WsConnection;

/// One open stream. Frames come back in receipt order.
pub trait StreamConnection {
    /// Fire-and-forget: the server answers on the stream.
    fn send_request(&mut self, request: &GenerationRequest) -> Result<(), TransportError>;

    /// Frame payload as received, text or binary. `Ok(None)` when the read
    /// timeout elapsed without a frame.
    fn poll_frame(&mut self) -> Result<Option<Vec<u8>>, TransportError>;

    fn close(&mut self);
}

pub trait Transport: Send + Sync + 'static {
    type Connection: StreamConnection;

    fn connect(&self) -> Result<Self::Connection, TransportError>;

    /// Advisory. Runs off the driver thread and may block until its timeout.
    fn cancel(&self, task_id: &RequestId) -> Result<CancelOutcome, TransportError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelOutcome {
    pub status: u16,
    pub body: String,
}

impl CancelOutcome {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// WebSocket stream plus HTTP cancel, as configured.
#[derive(Debug, Clone)]
pub struct NetworkTransport {
    websocket_url: String,
    read_timeout: std::time::Duration,
    canceller: HttpCanceller,
}

impl NetworkTransport {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        Ok(Self {
            websocket_url: config.websocket_url.clone(),
            read_timeout: config.read_timeout,
            canceller: HttpCanceller::new(config.abort_url.clone(), config.cancel_timeout)?,
        })
    }

    pub fn websocket_url(&self) -> &str {
        &self.websocket_url
    }

    pub fn abort_url(&self) -> &str {
        self.canceller.abort_url()
    }
}

impl Transport for NetworkTransport {
    type Connection = WsConnection;

    fn connect(&self) -> Result<WsConnection, TransportError> {
        WsConnection::open(&self.websocket_url, self.read_timeout)
    }

    fn cancel(&self, task_id: &RequestId) -> Result<CancelOutcome, TransportError> {
        self.canceller.cancel(task_id)
    }
}
