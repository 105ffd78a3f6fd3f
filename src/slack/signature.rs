//! Slack request signature verification (`v0` scheme).
//!
//! The signature is `v0=` plus the hex HMAC-SHA256 of
//! `v0:{timestamp}:{body}` under the app's signing secret. Requests older
//! than five minutes are rejected to stop replay.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Maximum accepted age of a signed request (seconds).
const MAX_AGE_SECONDS: i64 = 300;

/// Verify a request signature.
///
/// `timestamp` is the raw `X-Slack-Request-Timestamp` header value and
/// `signature` the raw `X-Slack-Signature` value.
pub fn verify(signing_secret: &str, timestamp: &str, body: &[u8], signature: &str) -> bool {
    verify_at(signing_secret, timestamp, body, signature, now_unix())
}

fn verify_at(
    signing_secret: &str,
    timestamp: &str,
    body: &[u8],
    signature: &str,
    now_unix: i64,
) -> bool {
    let Ok(ts) = timestamp.parse::<i64>() else {
        return false;
    };
    if (now_unix - ts).abs() > MAX_AGE_SECONDS {
        return false;
    }

    let mut mac = match HmacSha256::new_from_slice(signing_secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(format!("v0:{}:", timestamp).as_bytes());
    mac.update(body);

    let expected = format!("v0={}", hex::encode(mac.finalize().into_bytes()));
    expected == signature
}

fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}
