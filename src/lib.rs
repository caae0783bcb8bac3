//! Bellhop - real-time notification delivery client.
//!
//! A persistent-connection client that receives push notifications over a
//! websocket, manages connection health autonomously (reconnection with
//! backoff, endpoint fallback, authentication-expiry recovery) and feeds a
//! normalized in-memory store that consumers read reactively.
//!
//! The pieces compose bottom-up:
//! - [`notification`]: wire-record validation and entity shaping
//! - [`store`]: the normalized cache with merge and rollback operations
//! - [`ws`]: the connection manager and its state machine
//! - [`client`]: the injectable service tying everything together

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod notification;
pub mod signal;
pub mod store;
pub mod token;
pub mod ws;

pub use api::{ApiError, NotificationPage, NotificationsApi, RestNotificationsApi, TokenSource};
pub use client::NotificationClient;
pub use config::ClientConfig;
pub use error::ClientError;
pub use notification::{normalize, Meta, Notification};
pub use signal::{SignalHub, UserSignal};
pub use store::NotificationStore;
pub use ws::{ConnectionManager, ConnectionState};
