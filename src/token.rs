//! Best-effort access-token expiry inspection.
//!
//! Decodes the payload segment of a JWT without verifying its signature and
//! reads the `exp` claim. This is NOT a security boundary - authorization is
//! enforced server-side. The hint only exists to avoid opening connections
//! that the server is guaranteed to reject.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(Deserialize)]
struct ExpiryClaim {
    exp: i64,
}

/// Read the expiry claim out of a JWT-shaped token, if there is one.
///
/// Returns `None` for tokens that are not JWTs or carry no readable `exp`;
/// such tokens are never treated as expired locally.
pub fn peek_expiry(token: &str) -> Option<DateTime<Utc>> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.as_bytes()).ok()?;
    let claims: ExpiryClaim = serde_json::from_slice(&bytes).ok()?;
    DateTime::from_timestamp(claims.exp, 0)
}

/// Whether the token's expiry claim is in the past.
pub fn is_expired(token: &str) -> bool {
    peek_expiry(token).is_some_and(|exp| exp <= Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jwt_with_exp(exp: i64) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"u1","exp":{exp}}}"#));
        format!("{header}.{payload}.unverified-signature")
    }

    #[test]
    fn reads_expiry_claim() {
        let token = jwt_with_exp(1_735_689_600); // 2025-01-01T00:00:00Z
        let exp = peek_expiry(&token).unwrap();
        assert_eq!(exp.to_rfc3339(), "2025-01-01T00:00:00+00:00");
    }

    #[test]
    fn expired_token_is_detected() {
        assert!(is_expired(&jwt_with_exp(1)));
    }

    #[test]
    fn future_token_is_not_expired() {
        let exp = (Utc::now() + chrono::Duration::hours(1)).timestamp();
        assert!(!is_expired(&jwt_with_exp(exp)));
    }

    #[test]
    fn opaque_tokens_are_never_locally_expired() {
        assert_eq!(peek_expiry("not-a-jwt"), None);
        assert!(!is_expired("not-a-jwt"));
        assert!(!is_expired("a.%%%not-base64%%%.c"));
    }
}
