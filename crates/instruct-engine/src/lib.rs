//! Networking side of the instruct client: the WebSocket stream, the
//! out-of-band cancel call and the loop that feeds both into a session.

pub mod config;
pub mod driver;
pub mod transport;

pub use config::{ClientConfig, ConfigOverrides};
pub use driver::{Flow, SessionDriver, UserAction, ViewProjector};
pub use transport::{
    CancelOutcome, HttpCanceller, NetworkTransport, StreamConnection, Transport, TransportError,
    TransportErrorKind, WsConnection,
};
