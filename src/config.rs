//! Client configuration and websocket endpoint candidate resolution.

use std::collections::HashSet;
use std::time::Duration;

use url::Url;

use crate::ws::backoff::ReconnectConfig;

/// Primary websocket base URL.
pub const ENV_WS_URL: &str = "BELLHOP_WS_URL";
/// Comma-separated HTTP base URLs; schemes are swapped to their websocket
/// counterparts when deriving candidates.
pub const ENV_API_URL: &str = "BELLHOP_API_URL";

/// Well-known local fallbacks, appended after configured candidates.
const LOCAL_FALLBACKS: [&str; 2] = ["ws://localhost:8080", "ws://127.0.0.1:8080"];

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Primary websocket base URL, tried first.
    pub ws_base: Option<String>,
    /// HTTP base URLs from which further candidates are derived
    /// (`http -> ws`, `https -> wss`).
    pub http_bases: Vec<String>,
    /// Refuse plaintext `ws://` endpoints. On by default in release builds.
    pub require_tls: bool,
    pub reconnect: ReconnectConfig,
    /// Minimum gap between user-facing connectivity signals.
    pub signal_cooldown: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ws_base: None,
            http_bases: Vec::new(),
            require_tls: !cfg!(debug_assertions),
            reconnect: ReconnectConfig::default(),
            signal_cooldown: Duration::from_secs(5),
        }
    }
}

impl ClientConfig {
    /// Read configuration from `BELLHOP_WS_URL` and `BELLHOP_API_URL`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(v) = std::env::var(ENV_WS_URL) {
            if !v.trim().is_empty() {
                config.ws_base = Some(v.trim().to_string());
            }
        }
        if let Ok(v) = std::env::var(ENV_API_URL) {
            config.http_bases = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        config
    }

    pub fn with_ws_base(mut self, base: impl Into<String>) -> Self {
        self.ws_base = Some(base.into());
        self
    }

    pub fn with_http_base(mut self, base: impl Into<String>) -> Self {
        self.http_bases.push(base.into());
        self
    }

    pub fn with_require_tls(mut self, require: bool) -> Self {
        self.require_tls = require;
        self
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Ordered, deduplicated websocket endpoint candidates: the primary base,
    /// then websocket counterparts of the HTTP bases, then the local
    /// fallbacks. Unparseable entries are skipped; plaintext candidates are
    /// dropped entirely when TLS is required.
    pub fn candidates(&self) -> Vec<Url> {
        let mut raw: Vec<Url> = Vec::new();
        if let Some(base) = &self.ws_base {
            if let Ok(url) = Url::parse(base) {
                raw.push(url);
            }
        }
        for base in &self.http_bases {
            if let Some(url) = http_to_ws(base) {
                raw.push(url);
            }
        }
        for fallback in LOCAL_FALLBACKS {
            if let Ok(url) = Url::parse(fallback) {
                raw.push(url);
            }
        }

        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for url in raw {
            if !matches!(url.scheme(), "ws" | "wss") {
                continue;
            }
            if self.require_tls && url.scheme() != "wss" {
                continue;
            }
            let key = url.as_str().trim_end_matches('/').to_string();
            if seen.insert(key) {
                out.push(url);
            }
        }
        out
    }
}

/// Swap an HTTP base to its websocket counterpart. Websocket schemes pass
/// through untouched; anything else is dropped.
fn http_to_ws(base: &str) -> Option<Url> {
    let url = Url::parse(base).ok()?;
    let scheme = match url.scheme() {
        "http" => "ws",
        "https" => "wss",
        "ws" | "wss" => return Some(url),
        _ => return None,
    };
    let mut swapped = url;
    swapped.set_scheme(scheme).ok()?;
    Some(swapped)
}

/// Build the notification stream URL for a candidate base.
pub fn ws_url(base: &Url, token: &str) -> Url {
    let mut url = base.clone();
    let path = format!("{}/notifications/ws", base.path().trim_end_matches('/'));
    url.set_path(&path);
    url.set_query(Some(&format!("token={}", urlencoding::encode(token))));
    url
}
