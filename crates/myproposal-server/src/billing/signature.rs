//! Stripe webhook signature verification.
//!
//! Header format: `t=<unix ts>,v1=<hex hmac>[,v1=<hex hmac>...]`. The MAC is
//! HMAC-SHA256 over `"{t}.{raw body}"` keyed with the endpoint secret.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Maximum accepted age (either direction) of a signed timestamp.
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("Signature header is malformed")]
    Malformed,

    #[error("Signature timestamp is outside the tolerance window")]
    StaleTimestamp,

    #[error("No signature matches the payload")]
    Mismatch,
}

/// Verify `header` against `payload` as of `now`.
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now: i64,
    tolerance_secs: i64,
) -> Result<(), SignatureError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => timestamp = value.parse::<i64>().ok(),
            "v1" => {
                if let Ok(sig) = hex::decode(value) {
                    signatures.push(sig);
                }
            }
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::Malformed)?;
    if signatures.is_empty() {
        return Err(SignatureError::Malformed);
    }
    let within_window = now
        .checked_sub(timestamp)
        .is_some_and(|age| age.unsigned_abs() <= tolerance_secs.unsigned_abs());
    if !within_window {
        return Err(SignatureError::StaleTimestamp);
    }

    let mac = signed_mac(payload, secret, timestamp)?;
    if signatures
        .iter()
        .any(|sig| mac.clone().verify_slice(sig).is_ok())
    {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// Produce a header value for `payload`, as Stripe would send it.
pub fn sign_payload(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let sig = signed_mac(payload, secret, timestamp)
        .map(|mac| hex::encode(mac.finalize().into_bytes()))
        .unwrap_or_default();
    format!("t={timestamp},v1={sig}")
}

fn signed_mac(payload: &[u8], secret: &str, timestamp: i64) -> Result<HmacSha256, SignatureError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::Malformed)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test";
    const BODY: &[u8] = br#"{"id":"evt_1","type":"invoice.payment_succeeded"}"#;
    const NOW: i64 = 1_750_000_000;

    #[test]
    fn valid_signature_passes() {
        let header = sign_payload(BODY, SECRET, NOW);
        assert_eq!(verify_signature(BODY, &header, SECRET, NOW, 300), Ok(()));
    }

    #[test]
    fn any_matching_v1_passes() {
        let good = sign_payload(BODY, SECRET, NOW);
        let good_sig = good.split_once(",v1=").unwrap().1;
        let header = format!("t={NOW},v1={},v1={good_sig}", "00".repeat(32));
        assert_eq!(verify_signature(BODY, &header, SECRET, NOW, 300), Ok(()));
    }

    #[test]
    fn tampered_body_fails() {
        let header = sign_payload(BODY, SECRET, NOW);
        assert_eq!(
            verify_signature(b"{}", &header, SECRET, NOW, 300),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn wrong_secret_fails() {
        let header = sign_payload(BODY, "whsec_other", NOW);
        assert_eq!(
            verify_signature(BODY, &header, SECRET, NOW, 300),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn stale_and_future_timestamps_fail() {
        let old = sign_payload(BODY, SECRET, NOW - 301);
        assert_eq!(
            verify_signature(BODY, &old, SECRET, NOW, 300),
            Err(SignatureError::StaleTimestamp)
        );
        let future = sign_payload(BODY, SECRET, NOW + 301);
        assert_eq!(
            verify_signature(BODY, &future, SECRET, NOW, 300),
            Err(SignatureError::StaleTimestamp)
        );
        let edge = sign_payload(BODY, SECRET, NOW - 300);
        assert_eq!(verify_signature(BODY, &edge, SECRET, NOW, 300), Ok(()));
    }

    #[test]
    fn extreme_timestamps_are_stale() {
        for ts in [i64::MIN, i64::MAX, i64::MIN + 1] {
            let header = format!("t={ts},v1={}", "00".repeat(32));
            assert_eq!(
                verify_signature(BODY, &header, SECRET, NOW, 300),
                Err(SignatureError::StaleTimestamp),
                "t={ts}"
            );
        }
        let header = format!("t={NOW},v1={}", "00".repeat(32));
        assert_eq!(
            verify_signature(BODY, &header, SECRET, i64::MIN, 300),
            Err(SignatureError::StaleTimestamp)
        );
    }

    #[test]
    fn malformed_headers_fail() {
        for header in ["", "garbage", "t=abc,v1=00", "t=123", "v1=abcd", "t=123,v1=zz"] {
            assert_eq!(
                verify_signature(BODY, header, SECRET, NOW, 300),
                Err(SignatureError::Malformed),
                "header {header:?}"
            );
        }
    }
}
