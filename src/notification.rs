//! Notification entity and wire-record normalization.
//!
//! Inbound records (websocket frames and REST snapshot items) are untyped
//! JSON. `normalize` validates them into [`Notification`] values; a record
//! that fails validation yields `None` so one malformed entry never aborts a
//! batch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One push-worthy event delivered to a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Opaque unique identifier, stable across re-delivery.
    pub id: String,
    /// Owning principal.
    pub user_id: String,
    /// Domain-specific event kind (wire name `type`).
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub message: String,
    /// Opaque structured data whose shape varies by kind.
    pub payload: Option<Value>,
    pub is_read: bool,
    /// Creation timestamp; immutable, the total order key (newest first).
    pub created_at: DateTime<Utc>,
    /// Set exactly while `is_read` is true.
    pub read_at: Option<DateTime<Utc>>,
    /// Derived presentation hints; non-authoritative.
    pub meta: Option<Meta>,
}

/// Presentation hints computed from the kind and payload at normalization
/// time. Recomputed on wholesale replacement, preserved across partial merges
/// unless the inbound record supplies its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    /// In-app navigation target, when one can be derived.
    pub link: Option<String>,
    /// Icon hint for list rendering.
    pub icon: String,
}

/// Strict wire shape; serde rejects wrong primitive types for us.
#[derive(Deserialize)]
struct WireNotification {
    id: String,
    user_id: String,
    #[serde(rename = "type")]
    kind: String,
    title: String,
    message: String,
    #[serde(default)]
    payload: Option<Value>,
    is_read: bool,
    created_at: String,
    #[serde(default)]
    read_at: Option<String>,
}

/// Validate an untyped record into a [`Notification`].
///
/// Required fields must exist with their expected primitive types and the
/// timestamps must parse as RFC3339. Returns `None` on any failure.
pub fn normalize(raw: &Value) -> Option<Notification> {
    let wire: WireNotification = serde_json::from_value(raw.clone()).ok()?;
    if wire.id.is_empty() || wire.user_id.is_empty() {
        return None;
    }
    let created_at = parse_timestamp(&wire.created_at)?;
    let read_at = match wire.read_at.as_deref() {
        Some(s) => Some(parse_timestamp(s)?),
        None => None,
    };

    // `is_read == false <=> read_at == None`; a frame violating the invariant
    // is repaired in favor of `is_read`.
    let read_at = if wire.is_read {
        read_at.or(Some(created_at))
    } else {
        None
    };

    let meta = derive_meta(&wire.kind, wire.payload.as_ref());

    Some(Notification {
        id: wire.id,
        user_id: wire.user_id,
        kind: wire.kind,
        title: wire.title,
        message: wire.message,
        payload: wire.payload,
        is_read: wire.is_read,
        created_at,
        read_at,
        meta,
    })
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Derive presentation hints for a notification kind. Pure and deterministic;
/// unrecognized kinds get no meta at all, so a previously derived value
/// survives partial merges.
pub fn derive_meta(kind: &str, payload: Option<&Value>) -> Option<Meta> {
    let id_field = |name: &str| {
        payload
            .and_then(|p| p.get(name))
            .and_then(Value::as_str)
            .map(str::to_string)
    };

    let (icon, link) = if kind.starts_with("order") {
        ("order", id_field("order_id").map(|id| format!("/orders/{id}")))
    } else if kind.starts_with("product") {
        (
            "product",
            id_field("product_id").map(|id| format!("/products/{id}")),
        )
    } else if kind.starts_with("customer") {
        (
            "customer",
            id_field("customer_id").map(|id| format!("/customers/{id}")),
        )
    } else {
        return None;
    };

    Some(Meta {
        link,
        icon: icon.to_string(),
    })
}
