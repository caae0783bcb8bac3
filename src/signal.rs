//! Rate-limited user-facing signal channel.
//!
//! Connectivity trouble during rapid reconnect cycles must not flood the user
//! with toasts, so transient signals pass through a cooldown window. Terminal
//! session expiry and action failures are never suppressed.

use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::Instant;

/// Signals intended for direct user display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserSignal {
    /// Transient connectivity trouble; throttled.
    ConnectionTrouble { detail: String },
    /// The session cannot be recovered; the user must re-authenticate.
    SessionExpired,
    /// A user-initiated action failed and was rolled back.
    ActionFailed { detail: String },
}

struct Throttle {
    cooldown: Duration,
    last: Option<Instant>,
}

impl Throttle {
    fn allow(&mut self) -> bool {
        let now = Instant::now();
        match self.last {
            Some(prev) if now.duration_since(prev) < self.cooldown => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

/// Fan-out hub for user-facing signals.
pub struct SignalHub {
    tx: broadcast::Sender<UserSignal>,
    throttle: Mutex<Throttle>,
}

impl SignalHub {
    pub fn new(cooldown: Duration) -> Self {
        let (tx, _) = broadcast::channel(32);
        Self {
            tx,
            throttle: Mutex::new(Throttle {
                cooldown,
                last: None,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UserSignal> {
        self.tx.subscribe()
    }

    /// Emit a throttled connectivity signal; dropped inside the cooldown
    /// window.
    pub fn connection_trouble(&self, detail: impl Into<String>) {
        let allowed = self
            .throttle
            .lock()
            .expect("signal throttle lock poisoned")
            .allow();
        if allowed {
            let _ = self.tx.send(UserSignal::ConnectionTrouble {
                detail: detail.into(),
            });
        }
    }

    /// Emit a signal bypassing the throttle.
    pub fn emit(&self, signal: UserSignal) {
        let _ = self.tx.send(signal);
    }
}
