//! Injectable notification service: the composition root tying the store,
//! the connection manager, the REST collaborators and the signal channel
//! together.
//!
//! Construct one per session at the application's composition root; there is
//! no global instance. Tests build fresh clients with scripted collaborators.

use std::sync::{Arc, Mutex};

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::api::{NotificationsApi, TokenSource};
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::notification::{normalize, Notification};
use crate::signal::{SignalHub, UserSignal};
use crate::store::NotificationStore;
use crate::ws::transport::Connector;
use crate::ws::{ConnectionManager, ConnectionState};

pub struct NotificationClient {
    store: Arc<NotificationStore>,
    manager: ConnectionManager,
    api: Arc<dyn NotificationsApi>,
    signals: Arc<SignalHub>,
    feed: Mutex<Option<JoinHandle<()>>>,
}

impl NotificationClient {
    /// Build a client with the production websocket connector. Must be called
    /// within a tokio runtime.
    pub fn new(
        config: ClientConfig,
        api: Arc<dyn NotificationsApi>,
        token_source: Option<Arc<dyn TokenSource>>,
    ) -> Self {
        let signals = Arc::new(SignalHub::new(config.signal_cooldown));
        let manager = ConnectionManager::new(config, signals.clone(), token_source);
        Self::assemble(manager, api, signals)
    }

    /// Like [`NotificationClient::new`] with an injected transport connector.
    pub fn with_connector(
        config: ClientConfig,
        api: Arc<dyn NotificationsApi>,
        token_source: Option<Arc<dyn TokenSource>>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let signals = Arc::new(SignalHub::new(config.signal_cooldown));
        let manager =
            ConnectionManager::with_connector(config, signals.clone(), token_source, connector);
        Self::assemble(manager, api, signals)
    }

    fn assemble(
        manager: ConnectionManager,
        api: Arc<dyn NotificationsApi>,
        signals: Arc<SignalHub>,
    ) -> Self {
        Self {
            store: Arc::new(NotificationStore::new()),
            manager,
            api,
            signals,
            feed: Mutex::new(None),
        }
    }

    /// The shared notification store.
    pub fn store(&self) -> &Arc<NotificationStore> {
        &self.store
    }

    /// Fetch one snapshot page over REST and merge it into the store through
    /// the same path live frames take. Returns how many records survived
    /// normalization.
    pub async fn hydrate(&self, limit: u64, offset: u64) -> Result<usize, ClientError> {
        let page = self.api.fetch_page(limit, offset).await?;
        let entities: Vec<Notification> =
            page.items.iter().filter_map(|item| normalize(item)).collect();
        let merged = entities.len();
        self.store.upsert_many(entities);
        Ok(merged)
    }

    /// Open the live stream and start feeding the store. Any previous feed
    /// task is unregistered first so reconnect cycles never leak tasks.
    pub fn connect(&self, access_token: &str) -> Result<(), ClientError> {
        // Subscribe before the connect command is queued; frames broadcast
        // before a subscription exists would never reach the store.
        let mut rx = self.manager.subscribe();
        self.manager.connect(access_token)?;

        let store = self.store.clone();
        let feed = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(entity) => store.upsert_one(entity),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(target: "bellhop::client", skipped, "notification feed lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        let previous = self
            .feed
            .lock()
            .expect("feed task lock poisoned")
            .replace(feed);
        if let Some(task) = previous {
            task.abort();
        }
        Ok(())
    }

    /// Close the live stream deliberately and unregister the feed task.
    pub fn disconnect(&self) {
        self.manager.disconnect();
        let task = self.feed.lock().expect("feed task lock poisoned").take();
        if let Some(task) = task {
            task.abort();
        }
    }

    pub fn status(&self) -> ConnectionState {
        self.manager.status()
    }

    /// Reactive connection status; `Disconnected` before the first connect.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionState> {
        self.manager.watch_status()
    }

    /// Stream of validated live notifications, for consumers that want the
    /// raw feed in addition to the store.
    pub fn notifications(&self) -> broadcast::Receiver<Notification> {
        self.manager.subscribe()
    }

    /// User-facing signals (connectivity trouble, session expiry, failed
    /// actions).
    pub fn signals(&self) -> broadcast::Receiver<UserSignal> {
        self.signals.subscribe()
    }

    /// Toggle read state: applied optimistically to the store, acknowledged
    /// over REST, reconciled with the authoritative entity on success and
    /// rolled back to the captured pre-image on failure.
    pub async fn set_read(&self, id: &str, is_read: bool) -> Result<(), ClientError> {
        let Some(pre_image) = self.store.get(id) else {
            return Err(ClientError::UnknownNotification(id.to_string()));
        };
        self.store.mark_read(id, is_read, None);

        match self.api.set_read(id, is_read).await {
            Ok(authoritative) => {
                if let Some(entity) = normalize(&authoritative) {
                    self.store.replace(entity);
                }
                Ok(())
            }
            Err(e) => {
                self.store.replace(pre_image);
                self.signals.emit(UserSignal::ActionFailed {
                    detail: format!("could not update notification: {e}"),
                });
                Err(e.into())
            }
        }
    }

    /// Tear everything down; the instance is inert afterwards.
    pub fn dispose(&self) {
        self.disconnect();
        self.store.reset();
    }
}
