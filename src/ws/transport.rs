//! Transport abstraction over the websocket.
//!
//! The manager only ever sees [`TransportEvent`]s, so tests can script
//! connections without a network; the production [`WsConnector`] wraps
//! tokio-tungstenite.

use async_trait::async_trait;
use futures_util::StreamExt;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use super::connection::{CLOSE_ABNORMAL, CLOSE_NO_STATUS};

/// The transport could not be opened.
#[derive(Debug, Error)]
#[error("transport error: {0}")]
pub struct TransportError(pub String);

/// Events surfaced by a live transport.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A text frame.
    Text(String),
    /// A binary frame; the notification stream never uses these.
    Binary(Vec<u8>),
    /// The transport closed (close frame, read error or EOF).
    Closed { code: u16, reason: String },
}

/// A single live connection.
#[async_trait]
pub trait Transport: Send {
    /// Next event. After `Closed` is returned the transport is dead.
    async fn next_event(&mut self) -> TransportEvent;

    /// Close the connection gracefully.
    async fn close(&mut self);
}

/// Opens transports. Injected into the manager so tests can substitute a
/// scripted implementation.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &Url) -> Result<Box<dyn Transport>, TransportError>;
}

/// Production connector over tokio-tungstenite.
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &Url) -> Result<Box<dyn Transport>, TransportError> {
        let (stream, _response) = connect_async(url.as_str())
            .await
            .map_err(|e| TransportError(e.to_string()))?;
        Ok(Box::new(WsTransport { stream }))
    }
}

struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Transport for WsTransport {
    async fn next_event(&mut self) -> TransportEvent {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return TransportEvent::Text(text.to_string()),
                Some(Ok(Message::Binary(bytes))) => return TransportEvent::Binary(bytes.to_vec()),
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = match frame {
                        Some(f) => (u16::from(f.code), f.reason.to_string()),
                        None => (CLOSE_NO_STATUS, String::new()),
                    };
                    return TransportEvent::Closed { code, reason };
                }
                // Pings are answered by tungstenite itself.
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    return TransportEvent::Closed {
                        code: CLOSE_ABNORMAL,
                        reason: e.to_string(),
                    }
                }
                None => {
                    return TransportEvent::Closed {
                        code: CLOSE_ABNORMAL,
                        reason: "stream ended".to_string(),
                    }
                }
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.stream.close(None).await;
    }
}
