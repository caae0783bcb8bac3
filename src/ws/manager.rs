//! Connection manager: owns the single live transport and runs the
//! reconnect state machine.
//!
//! The manager is an actor task driven by commands from its handle. It never
//! holds two live transports: a new connect always tears the old one down
//! first. Abnormal closes reconnect with jittered backoff, walking the
//! endpoint candidate list until one opens; authorization failures get one
//! refresh-and-retry cycle per disconnect episode, then become terminal.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};
use url::Url;

use super::backoff::{ReconnectConfig, ReconnectPlan};
use super::connection::{classify_close, transition, CloseKind, ConnectionEvent, ConnectionState};
use super::transport::{Connector, Transport, TransportEvent, WsConnector};
use crate::api::TokenSource;
use crate::config::{ws_url, ClientConfig};
use crate::error::ClientError;
use crate::notification::{normalize, Notification};
use crate::signal::{SignalHub, UserSignal};
use crate::token;

enum Command {
    Connect { token: String },
    Disconnect,
}

/// Handle to the connection actor. Cheap operations only; all transport work
/// happens on the actor task. Dropping the handle shuts the actor down.
pub struct ConnectionManager {
    cmd_tx: mpsc::UnboundedSender<Command>,
    status_rx: watch::Receiver<ConnectionState>,
    notif_tx: broadcast::Sender<Notification>,
    candidates: Vec<Url>,
}

impl ConnectionManager {
    /// Spawn the actor with the production websocket connector. Must be
    /// called within a tokio runtime.
    pub fn new(
        config: ClientConfig,
        signals: Arc<SignalHub>,
        token_source: Option<Arc<dyn TokenSource>>,
    ) -> Self {
        Self::with_connector(config, signals, token_source, Arc::new(WsConnector))
    }

    /// Spawn the actor with an injected transport connector.
    pub fn with_connector(
        config: ClientConfig,
        signals: Arc<SignalHub>,
        token_source: Option<Arc<dyn TokenSource>>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let candidates = config.candidates();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ConnectionState::Disconnected);
        let (notif_tx, _) = broadcast::channel(256);

        let driver = Driver {
            reconnect: config.reconnect,
            rotation: EndpointRotation::new(candidates.clone()),
            connector,
            token_source,
            signals,
            status_tx,
            notif_tx: notif_tx.clone(),
            cmd_rx,
            plan: ReconnectPlan::default(),
            token: None,
        };
        tokio::spawn(driver.run());

        Self {
            cmd_tx,
            status_rx,
            notif_tx,
            candidates,
        }
    }

    /// Open a connection with the given access token, tearing down any live
    /// connection first and resetting the reconnect plan.
    ///
    /// Fails fast when the token is empty, when its (unverified) expiry claim
    /// is already in the past, or when no usable endpoint candidate exists.
    pub fn connect(&self, access_token: &str) -> Result<(), ClientError> {
        if access_token.trim().is_empty() {
            return Err(ClientError::EmptyToken);
        }
        if token::is_expired(access_token) {
            return Err(ClientError::TokenExpired);
        }
        if self.candidates.is_empty() {
            return Err(ClientError::NoEndpoint);
        }
        let _ = self.cmd_tx.send(Command::Connect {
            token: access_token.to_string(),
        });
        Ok(())
    }

    /// Deliberately close: suppresses reconnection, cancels any pending
    /// reconnect timer and clears the stored token.
    pub fn disconnect(&self) {
        let _ = self.cmd_tx.send(Command::Disconnect);
    }

    pub fn status(&self) -> ConnectionState {
        *self.status_rx.borrow()
    }

    /// Status stream. New subscribers see the current value immediately via
    /// `borrow`, so late subscribers are never out of sync.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionState> {
        self.status_rx.clone()
    }

    /// Stream of validated notifications in arrival order.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notif_tx.subscribe()
    }
}

/// Candidate endpoint cursor. `preferred` is pinned to whichever candidate
/// last opened successfully and is where every new attempt sequence starts;
/// `current` walks forward on failures that happen before an open.
#[derive(Debug)]
struct EndpointRotation {
    candidates: Vec<Url>,
    preferred: usize,
    current: usize,
}

impl EndpointRotation {
    fn new(candidates: Vec<Url>) -> Self {
        Self {
            candidates,
            preferred: 0,
            current: 0,
        }
    }

    fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    fn current(&self) -> &Url {
        &self.candidates[self.current]
    }

    fn advance(&mut self) {
        self.current = (self.current + 1) % self.candidates.len();
    }

    fn pin(&mut self) {
        self.preferred = self.current;
    }

    fn rewind(&mut self) {
        self.current = self.preferred;
    }
}

/// How a served connection ended.
enum Served {
    Closed { code: u16, reason: String },
    /// `disconnect()` or handle drop.
    Deliberate,
    /// `connect()` with a new token while live.
    Restart { token: String },
}

/// Outcome of waiting out a reconnect delay.
enum TimerOutcome {
    Fired,
    Cancelled,
    Restart { token: String },
}

struct Driver {
    reconnect: ReconnectConfig,
    rotation: EndpointRotation,
    connector: Arc<dyn Connector>,
    token_source: Option<Arc<dyn TokenSource>>,
    signals: Arc<SignalHub>,
    status_tx: watch::Sender<ConnectionState>,
    notif_tx: broadcast::Sender<Notification>,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    plan: ReconnectPlan,
    token: Option<String>,
}

impl Driver {
    async fn run(mut self) {
        loop {
            // Idle until someone asks for a connection.
            let token = loop {
                match self.cmd_rx.recv().await {
                    Some(Command::Connect { token }) => break token,
                    Some(Command::Disconnect) => continue,
                    None => return,
                }
            };
            self.token = Some(token);
            self.session().await;
            self.token = None;
        }
    }

    fn set_state(&self, event: ConnectionEvent) {
        self.status_tx.send_if_modified(|state| {
            let next = transition(*state, event);
            let changed = next != *state;
            *state = next;
            changed
        });
    }

    fn expire_session(&mut self) {
        self.token = None;
        info!(target: "bellhop::ws", "session expired, reconnection stopped");
        self.signals.emit(UserSignal::SessionExpired);
    }

    /// One connect episode: dial, serve, reconnect, until a terminal event
    /// returns the driver to idle.
    async fn session(&mut self) {
        if self.rotation.is_empty() {
            return;
        }
        self.plan.reset();
        self.rotation.rewind();
        let mut refreshed_this_episode = false;

        loop {
            let Some(current_token) = self.token.clone() else {
                return;
            };
            let url = ws_url(self.rotation.current(), &current_token);
            self.set_state(ConnectionEvent::DialStarted);
            debug!(target: "bellhop::ws", endpoint = %self.rotation.current(), "dialing notification stream");

            let mut opened = false;
            let close = match self.connector.connect(&url).await {
                Ok(mut transport) => {
                    opened = true;
                    self.rotation.pin();
                    self.plan.reset();
                    refreshed_this_episode = false;
                    self.set_state(ConnectionEvent::Opened);
                    info!(target: "bellhop::ws", endpoint = %self.rotation.current(), "notification stream connected");

                    let served =
                        serve(&mut self.cmd_rx, &self.notif_tx, transport.as_mut()).await;
                    match served {
                        Served::Closed { code, reason } => {
                            self.set_state(ConnectionEvent::Closed);
                            info!(target: "bellhop::ws", code, reason = %reason, "notification stream closed");
                            Some((code, reason))
                        }
                        Served::Deliberate => {
                            transport.close().await;
                            self.set_state(ConnectionEvent::Closed);
                            return;
                        }
                        Served::Restart { token } => {
                            transport.close().await;
                            self.set_state(ConnectionEvent::Closed);
                            self.token = Some(token);
                            self.plan.reset();
                            self.rotation.rewind();
                            refreshed_this_episode = false;
                            continue;
                        }
                    }
                }
                Err(e) => {
                    warn!(target: "bellhop::ws", endpoint = %self.rotation.current(), error = %e, "failed to open notification stream");
                    self.set_state(ConnectionEvent::Closed);
                    // Construction failure behaves like an abnormal close
                    // before open.
                    None
                }
            };

            let token_expired = self
                .token
                .as_deref()
                .map(token::is_expired)
                .unwrap_or(true);
            let kind = match &close {
                Some((code, reason)) => classify_close(*code, reason, token_expired),
                None => CloseKind::Transient,
            };

            match kind {
                CloseKind::Clean => {
                    // Server said goodbye on purpose; stay disconnected.
                    return;
                }
                CloseKind::Unauthorized => {
                    let refresher = match &self.token_source {
                        Some(source) if !refreshed_this_episode => source.clone(),
                        _ => {
                            self.expire_session();
                            return;
                        }
                    };
                    refreshed_this_episode = true;
                    match refresher.refresh().await {
                        Ok(fresh) => {
                            info!(target: "bellhop::ws", "access token refreshed after authorization failure");
                            self.token = Some(fresh);
                            self.rotation.rewind();
                            continue;
                        }
                        Err(e) => {
                            warn!(target: "bellhop::ws", error = %e, "token refresh failed");
                            self.expire_session();
                            return;
                        }
                    }
                }
                CloseKind::Transient => {
                    self.signals.connection_trouble(
                        "connection to the notification service was lost, retrying",
                    );
                    if !opened {
                        self.rotation.advance();
                    }
                    let delay = self.plan.next_delay(&self.reconnect);
                    debug!(
                        target: "bellhop::ws",
                        delay_ms = delay.as_millis() as u64,
                        attempt = self.plan.attempt(),
                        "reconnect scheduled"
                    );

                    match self.wait_for_reconnect(delay).await {
                        TimerOutcome::Fired => {}
                        TimerOutcome::Cancelled => {
                            self.token = None;
                            return;
                        }
                        TimerOutcome::Restart { token } => {
                            self.token = Some(token);
                            self.plan.reset();
                            self.rotation.rewind();
                            refreshed_this_episode = false;
                            continue;
                        }
                    }

                    // At fire time: a token that expired during the wait is
                    // refreshed before redialing. If no usable token can be
                    // obtained the session cannot continue.
                    let expired = self
                        .token
                        .as_deref()
                        .map(token::is_expired)
                        .unwrap_or(true);
                    if expired {
                        let refreshed = match &self.token_source {
                            Some(source) => match source.refresh().await {
                                Ok(fresh) => {
                                    info!(target: "bellhop::ws", "access token refreshed before reconnect");
                                    self.token = Some(fresh);
                                    true
                                }
                                Err(e) => {
                                    warn!(target: "bellhop::ws", error = %e, "token refresh before reconnect failed");
                                    false
                                }
                            },
                            None => false,
                        };
                        if !refreshed {
                            self.expire_session();
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Sleep out the reconnect delay, remaining responsive to commands so
    /// `disconnect()` cancels the pending attempt.
    async fn wait_for_reconnect(&mut self, delay: std::time::Duration) -> TimerOutcome {
        let timer = tokio::time::sleep(delay);
        tokio::pin!(timer);
        tokio::select! {
            _ = &mut timer => TimerOutcome::Fired,
            cmd = self.cmd_rx.recv() => match cmd {
                Some(Command::Connect { token }) => TimerOutcome::Restart { token },
                Some(Command::Disconnect) | None => TimerOutcome::Cancelled,
            },
        }
    }
}

/// Pump a live transport until it closes or a command interrupts it. Frames
/// are handled in arrival order; malformed traffic is dropped with a log and
/// never surfaced.
async fn serve(
    cmd_rx: &mut mpsc::UnboundedReceiver<Command>,
    notif_tx: &broadcast::Sender<Notification>,
    transport: &mut dyn Transport,
) -> Served {
    loop {
        tokio::select! {
            event = transport.next_event() => match event {
                TransportEvent::Text(text) => handle_frame(notif_tx, &text),
                TransportEvent::Binary(_) => {
                    debug!(target: "bellhop::ws", "dropping unexpected binary frame");
                }
                TransportEvent::Closed { code, reason } => {
                    return Served::Closed { code, reason };
                }
            },
            cmd = cmd_rx.recv() => match cmd {
                Some(Command::Connect { token }) => return Served::Restart { token },
                Some(Command::Disconnect) | None => return Served::Deliberate,
            },
        }
    }
}

fn handle_frame(notif_tx: &broadcast::Sender<Notification>, text: &str) {
    let raw: serde_json::Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            warn!(target: "bellhop::ws", error = %e, "dropping frame with invalid json");
            return;
        }
    };
    match normalize(&raw) {
        Some(entity) => {
            // No receivers is fine; the feed may not be attached yet.
            let _ = notif_tx.send(entity);
        }
        None => {
            warn!(target: "bellhop::ws", "dropping frame that is not a valid notification");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rotation(hosts: &[&str]) -> EndpointRotation {
        EndpointRotation::new(
            hosts
                .iter()
                .map(|h| Url::parse(&format!("ws://{h}")).unwrap())
                .collect(),
        )
    }

    #[test]
    fn rotation_advances_and_wraps() {
        let mut rot = rotation(&["a.test", "b.test", "c.test"]);
        assert_eq!(rot.current().host_str(), Some("a.test"));
        rot.advance();
        assert_eq!(rot.current().host_str(), Some("b.test"));
        rot.advance();
        rot.advance();
        assert_eq!(rot.current().host_str(), Some("a.test"));
    }

    #[test]
    fn rotation_pins_the_working_candidate() {
        let mut rot = rotation(&["a.test", "b.test"]);
        rot.advance();
        rot.pin();
        rot.advance();
        rot.rewind();
        assert_eq!(rot.current().host_str(), Some("b.test"));
    }

    #[test]
    fn rotation_rewinds_to_first_candidate_by_default() {
        let mut rot = rotation(&["a.test", "b.test"]);
        rot.advance();
        rot.rewind();
        assert_eq!(rot.current().host_str(), Some("a.test"));
    }
}
