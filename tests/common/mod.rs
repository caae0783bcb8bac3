//! Scripted collaborators shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::Value;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;
use url::Url;

use bellhop::api::{ApiError, NotificationPage, NotificationsApi, TokenSource};
use bellhop::ws::transport::{Connector, Transport, TransportError, TransportEvent};
use bellhop::ws::ConnectionState;
use bellhop::ClientConfig;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// The exact frame shape the server pushes.
pub const FRAME_N1: &str = r#"{"id":"n1","user_id":"u1","type":"generic","title":"T","message":"M","payload":null,"is_read":false,"created_at":"2025-01-01T10:00:00Z","read_at":null}"#;

pub fn test_config() -> ClientConfig {
    ClientConfig::default()
        .with_require_tls(false)
        .with_ws_base("ws://push.test")
}

/// A JWT-shaped token with the given expiry; the signature is garbage, which
/// is fine because the client never verifies it.
pub fn jwt_with_exp(exp: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"u1","exp":{exp}}}"#));
    format!("{header}.{payload}.sig")
}

/// A token expiring `secs` wall-clock seconds from now. The expiry peek reads
/// the real clock, so short-lived tokens need real elapsed time to expire
/// even under a paused tokio clock.
pub fn jwt_expiring_in(secs: i64) -> String {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("clock before epoch")
        .as_secs() as i64;
    jwt_with_exp(now + secs)
}

enum Session {
    Open(UnboundedReceiver<TransportEvent>),
    Fail(String),
}

/// Connector handing out pre-scripted transports in order. Records every
/// dialed URL and counts transport closes.
pub struct MockConnector {
    sessions: Mutex<VecDeque<Session>>,
    urls: Mutex<Vec<Url>>,
    dials: AtomicUsize,
    closes: Arc<AtomicUsize>,
}

impl MockConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sessions: Mutex::new(VecDeque::new()),
            urls: Mutex::new(Vec::new()),
            dials: AtomicUsize::new(0),
            closes: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Script a successful open; drive the connection through the returned
    /// sender.
    pub fn queue_open(&self) -> UnboundedSender<TransportEvent> {
        let (tx, rx) = unbounded_channel();
        self.sessions.lock().unwrap().push_back(Session::Open(rx));
        tx
    }

    /// Script a failed transport construction.
    pub fn queue_failure(&self, reason: &str) {
        self.sessions
            .lock()
            .unwrap()
            .push_back(Session::Fail(reason.to_string()));
    }

    /// How many times a transport was dialed (successful or not).
    pub fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }

    /// How many transports were closed from our side.
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn dialed_urls(&self) -> Vec<Url> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, url: &Url) -> Result<Box<dyn Transport>, TransportError> {
        // Let status observers see `Connecting` before the open resolves.
        tokio::task::yield_now().await;
        self.dials.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().unwrap().push(url.clone());
        match self.sessions.lock().unwrap().pop_front() {
            Some(Session::Open(rx)) => Ok(Box::new(MockTransport {
                events: rx,
                closes: self.closes.clone(),
            })),
            Some(Session::Fail(reason)) => Err(TransportError(reason)),
            None => Err(TransportError("no scripted session".to_string())),
        }
    }
}

struct MockTransport {
    events: UnboundedReceiver<TransportEvent>,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl Transport for MockTransport {
    async fn next_event(&mut self) -> TransportEvent {
        match self.events.recv().await {
            Some(event) => event,
            // Script sender dropped: behave like an abnormal close.
            None => TransportEvent::Closed {
                code: 1006,
                reason: "script ended".to_string(),
            },
        }
    }

    async fn close(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// REST collaborator with scripted responses.
pub struct MockApi {
    items: Vec<Value>,
    set_read_responses: Mutex<VecDeque<Result<Value, ApiError>>>,
    set_read_calls: AtomicUsize,
}

impl MockApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            items: Vec::new(),
            set_read_responses: Mutex::new(VecDeque::new()),
            set_read_calls: AtomicUsize::new(0),
        })
    }

    pub fn with_items(items: Vec<Value>) -> Arc<Self> {
        Arc::new(Self {
            items,
            set_read_responses: Mutex::new(VecDeque::new()),
            set_read_calls: AtomicUsize::new(0),
        })
    }

    pub fn queue_set_read(&self, response: Result<Value, ApiError>) {
        self.set_read_responses.lock().unwrap().push_back(response);
    }

    pub fn set_read_calls(&self) -> usize {
        self.set_read_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NotificationsApi for MockApi {
    async fn fetch_page(&self, limit: u64, offset: u64) -> Result<NotificationPage, ApiError> {
        Ok(NotificationPage {
            items: self.items.clone(),
            total: self.items.len() as u64,
            limit,
            offset,
        })
    }

    async fn set_read(&self, _id: &str, _is_read: bool) -> Result<Value, ApiError> {
        self.set_read_calls.fetch_add(1, Ordering::SeqCst);
        self.set_read_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ApiError::Network("unscripted set_read".to_string())))
    }
}

/// Token source yielding scripted refresh results.
pub struct ScriptedTokens {
    responses: Mutex<VecDeque<Result<String, ApiError>>>,
    calls: AtomicUsize,
}

impl ScriptedTokens {
    pub fn new(responses: Vec<Result<String, ApiError>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenSource for ScriptedTokens {
    async fn refresh(&self) -> Result<String, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ApiError::Network("unscripted refresh".to_string())))
    }
}

/// Await the next observed status change, with a generous timeout so a stuck
/// driver fails the test instead of hanging it.
pub async fn next_state(rx: &mut watch::Receiver<ConnectionState>) -> ConnectionState {
    tokio::time::timeout(Duration::from_secs(60), rx.changed())
        .await
        .expect("timed out waiting for a status change")
        .expect("status channel closed");
    *rx.borrow_and_update()
}

/// Drive the status stream until `target` is observed, collecting every state
/// seen along the way.
pub async fn wait_for_state(
    rx: &mut watch::Receiver<ConnectionState>,
    target: ConnectionState,
) -> Vec<ConnectionState> {
    let mut seen = Vec::new();
    while *rx.borrow() != target {
        seen.push(next_state(rx).await);
    }
    seen
}

/// Poll until the connector has dialed `n` times. Watch values coalesce, so
/// reconnect tests wait on this observable side effect instead of chasing
/// intermediate states.
pub async fn wait_for_dials(connector: &MockConnector, n: usize) {
    tokio::time::timeout(Duration::from_secs(60), async {
        while connector.dials() < n {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for dial #{n}"));
}
