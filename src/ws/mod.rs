//! WebSocket connection machinery: lifecycle state, reconnect backoff,
//! transport abstraction and the connection manager.

pub mod backoff;
pub mod connection;
pub mod manager;
pub mod transport;

pub use backoff::{ReconnectConfig, ReconnectPlan};
pub use connection::{classify_close, CloseKind, ConnectionState};
pub use manager::ConnectionManager;
pub use transport::{Connector, Transport, TransportError, TransportEvent, WsConnector};
