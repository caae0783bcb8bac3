//! Connection lifecycle state and close-frame classification.
//!
//! The state machine is a pure transition function so it can be tested apart
//! from the side-effecting transport work in the manager.

/// Observable connection state. Owned exclusively by the manager; everything
/// else only reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    pub fn is_connecting(self) -> bool {
        matches!(self, ConnectionState::Connecting)
    }
}

/// Lifecycle events driving the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// A dial attempt started.
    DialStarted,
    /// The transport opened.
    Opened,
    /// The transport closed or the dial failed.
    Closed,
}

/// Pure transition function for the connection lifecycle.
pub fn transition(state: ConnectionState, event: ConnectionEvent) -> ConnectionState {
    use ConnectionEvent::*;
    use ConnectionState::*;
    match (state, event) {
        (_, DialStarted) => Connecting,
        (Connecting, Opened) => Connected,
        // An open outside a dial has no meaning; hold the current state.
        (state, Opened) => state,
        (_, Closed) => Disconnected,
    }
}

/// Normal closure.
pub const CLOSE_NORMAL: u16 = 1000;
/// No status code present in the close frame.
pub const CLOSE_NO_STATUS: u16 = 1005;
/// Abnormal closure, no close frame received.
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Close codes the server (and common gateways) use to reject
/// authentication.
pub const AUTH_REJECT_CODES: &[u16] = &[1008, 401, 4001, 4010, 4401, 4403];

/// What a close means for the reconnect policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseKind {
    /// Clean, intentional close; no reconnect.
    Clean,
    /// Authentication rejected; refresh once or give up.
    Unauthorized,
    /// Anything else; reconnect with backoff.
    Transient,
}

/// Classify a close frame.
///
/// An abnormal or status-less close while the locally held token is known to
/// be expired counts as an authorization failure. Code 1006 also occurs for
/// purely network-level reasons, so this is a heuristic, not an auth check.
pub fn classify_close(code: u16, reason: &str, token_expired: bool) -> CloseKind {
    if code == CLOSE_NORMAL {
        return CloseKind::Clean;
    }
    if AUTH_REJECT_CODES.contains(&code) {
        return CloseKind::Unauthorized;
    }
    if reason.to_ascii_lowercase().contains("unauthorized") {
        return CloseKind::Unauthorized;
    }
    if token_expired && matches!(code, CLOSE_ABNORMAL | CLOSE_NO_STATUS) {
        return CloseKind::Unauthorized;
    }
    CloseKind::Transient
}
