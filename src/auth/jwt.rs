// JWT expiry inspection
// Reads the `exp` claim without verifying the signature; the upstream does that.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

/// Tokens this close to expiry are treated as already expired.
const EXPIRY_SKEW_SECS: i64 = 30;

#[derive(Deserialize)]
struct Claims {
    exp: Option<i64>,
}

/// Expiry time of a JWT, if the token is a JWT carrying an `exp` claim
pub fn expires_at(token: &str) -> Option<DateTime<Utc>> {
    let mut parts = token.split('.');
    let (_header, payload, _signature) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }

    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: Claims = serde_json::from_slice(&bytes).ok()?;
    DateTime::<Utc>::from_timestamp(claims.exp?, 0)
}

/// Whether `token` is known to be expired at `now`. Opaque tokens never are.
pub fn is_expired(token: &str, now: DateTime<Utc>) -> bool {
    expires_at(token)
        .map(|exp| exp <= now + Duration::seconds(EXPIRY_SKEW_SECS))
        .unwrap_or(false)
}

#[cfg(test)]
pub(crate) fn make_token(exp: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"user","exp":{exp}}}"#));
    format!("{header}.{payload}.signature")
}
