//! Error types surfaced by the public client API.
//!
//! Operational failures (reconnects, malformed frames, refresh retries) are
//! handled inside the connection manager and communicated through the status
//! and signal channels; these errors cover precondition violations and failed
//! REST calls only.

use thiserror::Error;

use crate::api::ApiError;

#[derive(Debug, Error)]
pub enum ClientError {
    /// `connect` was called with an empty access token.
    #[error("access token is empty")]
    EmptyToken,

    /// The token's (unverified) expiry claim is already in the past, so a
    /// connection attempt would be wasted.
    #[error("access token is already expired")]
    TokenExpired,

    /// No usable websocket endpoint candidate; plaintext `ws://` candidates
    /// are refused when TLS is required.
    #[error("no usable websocket endpoint configured")]
    NoEndpoint,

    /// A read-state command referenced an id the store has never seen.
    #[error("unknown notification id: {0}")]
    UnknownNotification(String),

    /// A REST collaborator call failed.
    #[error(transparent)]
    Api(#[from] ApiError),
}
