use std::io::ErrorKind;
use std::net::TcpStream;
use std::time::Duration;

use instruct_contracts::protocol::submit_frame;
use instruct_contracts::request::GenerationRequest;
use tracing::debug;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{connect as websocket_connect, Message as WsMessage, WebSocket};

use super::{StreamConnection, TransportError, TransportErrorKind};

/// Blocking WebSocket stream with a short read timeout so the driver can
/// interleave user input with frame reads.
pub struct WsConnection {
    ws: WebSocket<MaybeTlsStream<TcpStream>>,
}

impl WsConnection {
    pub fn open(url: &str, read_timeout: Duration) -> Result<Self, TransportError> {
        let (mut ws, response) = websocket_connect(url)
            .map_err(|err| TransportError::connect(format!("failed to connect {url}: {err}")))?;
        debug!(url, status = response.status().as_u16(), "websocket connected");
        set_socket_read_timeout(&mut ws, Some(read_timeout));
        Ok(Self { ws })
    }
}

impl StreamConnection for WsConnection {
    fn send_request(&mut self, request: &GenerationRequest) -> Result<(), TransportError> {
        let frame = submit_frame(request)
            .map_err(|err| TransportError::from_anyhow(TransportErrorKind::Protocol, &err))?;
        self.ws
            .send(WsMessage::Text(frame.into()))
            .map_err(|err| TransportError::from_tungstenite("failed to send request", err))
    }

    fn poll_frame(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        match self.ws.read() {
            Ok(WsMessage::Text(text)) => Ok(Some(text.as_bytes().to_vec())),
            Ok(WsMessage::Binary(bytes)) => Ok(Some(bytes.to_vec())),
            Ok(WsMessage::Close(_)) => Err(TransportError::closed("server closed the stream")),
            Ok(_) => Ok(None),
            Err(tungstenite::Error::Io(err))
                if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
            {
                Ok(None)
            }
            Err(err) => Err(TransportError::from_tungstenite("stream read failed", err)),
        }
    }

    fn close(&mut self) {
        let _ = self.ws.close(None);
        let _ = self.ws.flush();
    }
}

fn set_socket_read_timeout(
    ws: &mut WebSocket<MaybeTlsStream<TcpStream>>,
    timeout: Option<Duration>,
) {
    match ws.get_mut() {
        MaybeTlsStream::Plain(stream) => {
            let _ = stream.set_read_timeout(timeout);
        }
        MaybeTlsStream::Rustls(stream) => {
            let _ = stream.get_mut().set_read_timeout(timeout);
        }
        _ => {}
    }
}
