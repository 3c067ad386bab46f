//! Bearer credential inspection.
//!
//! Credentials are three base64url segments joined by `.`. Only the middle
//! segment is read. Signatures are not verified: no key material exists on
//! the client, so these checks only avoid sending credentials the server
//! will reject anyway. They are never an authorization decision.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::models::Role;

/// Seconds before expiry at which a credential should be proactively refreshed
pub const DEFAULT_REFRESH_BUFFER_SECS: i64 = 300;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id)
    pub sub: String,
    /// Tenant the credential was issued for
    pub company_id: String,
    pub role: Role,
    pub email: String,
    /// Issued-at, seconds since epoch
    pub iat: i64,
    /// Expiry, seconds since epoch
    pub exp: i64,
}

impl Claims {
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.exp <= now
    }

    pub fn expires_within(&self, buffer_secs: i64, now: i64) -> bool {
        self.exp.saturating_sub(now) < buffer_secs
    }

    /// Seconds remaining, clamped at zero
    pub fn seconds_until_expiry(&self, now: i64) -> i64 {
        self.exp.saturating_sub(now).max(0)
    }
}

fn now() -> i64 {
    Utc::now().timestamp()
}

/// Decode the claims segment of a credential.
///
/// Returns `None` unless the token has exactly three segments and the middle
/// one is base64url JSON matching [`Claims`].
pub fn decode(token: &str) -> Option<Claims> {
    let mut segments = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return None;
    };

    // Some issuers pad their segments; the URL-safe engine wants them bare.
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// An undecodable credential counts as expired.
pub fn is_expired(token: &str) -> bool {
    is_expired_at(token, now())
}

pub fn is_expired_at(token: &str, now: i64) -> bool {
    decode(token).map_or(true, |claims| claims.is_expired_at(now))
}

/// True when the credential expires in less than `buffer_secs` (or is undecodable)
pub fn is_expiring_soon(token: &str, buffer_secs: i64) -> bool {
    is_expiring_soon_at(token, buffer_secs, now())
}

pub fn is_expiring_soon_at(token: &str, buffer_secs: i64, now: i64) -> bool {
    decode(token).map_or(true, |claims| claims.expires_within(buffer_secs, now))
}

/// Claims of a credential that decodes and has not expired.
///
/// This is the check every consumer of a stored credential goes through;
/// [`decode`] alone says nothing about whether the credential is usable.
pub fn valid_claims(token: &str) -> Option<Claims> {
    valid_claims_at(token, now())
}

pub fn valid_claims_at(token: &str, now: i64) -> Option<Claims> {
    decode(token).filter(|claims| !claims.is_expired_at(now))
}

/// Build an unsigned credential carrying `claims`. Used by tests and tools
/// that need a structurally valid token.
pub fn encode_unsigned(claims: &Claims) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims).unwrap_or_default());
    format!("{}.{}.unsigned", header, payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_780_000_000;

    fn claims(exp: i64) -> Claims {
        Claims {
            sub: "u1".to_string(),
            company_id: "acme".to_string(),
            role: Role::Engineer,
            email: "a@b.com".to_string(),
            iat: exp - 900,
            exp,
        }
    }

    #[test]
    fn test_decode_roundtrips_claims() {
        let token = encode_unsigned(&claims(NOW + 60));
        let decoded = decode(&token).unwrap();
        assert_eq!(decoded.sub, "u1");
        assert_eq!(decoded.company_id, "acme");
        assert_eq!(decoded.role, Role::Engineer);
    }

    #[test]
    fn test_decode_rejects_wrong_segment_count() {
        let good = encode_unsigned(&claims(NOW + 60));
        let payload = good.split('.').nth(1).unwrap();

        assert!(decode("").is_none());
        assert!(decode("abc").is_none());
        assert!(decode(&format!("h.{}", payload)).is_none());
        assert!(decode(&format!("h.{}.s.extra", payload)).is_none());
        assert!(decode("...").is_none());
    }

    #[test]
    fn test_decode_rejects_bad_payload() {
        assert!(decode("h.!!!notbase64!!!.s").is_none());

        let not_json = URL_SAFE_NO_PAD.encode(b"plain text");
        assert!(decode(&format!("h.{}.s", not_json)).is_none());

        let missing_fields = URL_SAFE_NO_PAD.encode(br#"{"sub":"u1"}"#);
        assert!(decode(&format!("h.{}.s", missing_fields)).is_none());
    }

    #[test]
    fn test_decode_tolerates_padding() {
        let token = encode_unsigned(&claims(NOW + 60));
        let mut parts: Vec<String> = token.split('.').map(str::to_string).collect();
        parts[1].push_str("==");
        assert!(decode(&parts.join(".")).is_some());
    }

    #[test]
    fn test_expiry_boundary() {
        assert!(!is_expired_at(&encode_unsigned(&claims(NOW + 1)), NOW));
        assert!(is_expired_at(&encode_unsigned(&claims(NOW)), NOW));
        assert!(is_expired_at(&encode_unsigned(&claims(NOW - 10)), NOW));
    }

    #[test]
    fn test_undecodable_is_expired_and_expiring() {
        assert!(is_expired_at("garbage", NOW));
        assert!(is_expiring_soon_at("garbage", DEFAULT_REFRESH_BUFFER_SECS, NOW));
        assert!(valid_claims_at("garbage", NOW).is_none());
    }

    #[test]
    fn test_expiring_soon_uses_buffer() {
        let token = encode_unsigned(&claims(NOW + 299));
        assert!(is_expiring_soon_at(&token, DEFAULT_REFRESH_BUFFER_SECS, NOW));

        let token = encode_unsigned(&claims(NOW + 300));
        assert!(!is_expiring_soon_at(&token, DEFAULT_REFRESH_BUFFER_SECS, NOW));
        assert!(is_expiring_soon_at(&token, 301, NOW));
    }

    #[test]
    fn test_valid_claims_implies_not_expired() {
        for offset in [-3600, -1, 0, 1, 3600] {
            let token = encode_unsigned(&claims(NOW + offset));
            if valid_claims_at(&token, NOW).is_some() {
                assert!(!is_expired_at(&token, NOW));
            } else {
                assert!(is_expired_at(&token, NOW));
            }
        }
    }

    #[test]
    fn test_seconds_until_expiry_clamps() {
        assert_eq!(claims(NOW + 90).seconds_until_expiry(NOW), 90);
        assert_eq!(claims(NOW - 90).seconds_until_expiry(NOW), 0);
    }

    #[test]
    fn test_extreme_expiry_values_do_not_overflow() {
        let extreme = |exp| Claims { iat: 0, exp, ..claims(NOW) };

        let never = encode_unsigned(&extreme(i64::MAX));
        assert!(!is_expired_at(&never, NOW));
        assert!(!is_expiring_soon_at(&never, DEFAULT_REFRESH_BUFFER_SECS, NOW));
        assert!(!is_expiring_soon_at(&never, DEFAULT_REFRESH_BUFFER_SECS, i64::MIN));
        assert_eq!(extreme(i64::MAX).seconds_until_expiry(i64::MIN), i64::MAX);

        let ancient = encode_unsigned(&extreme(i64::MIN));
        assert!(is_expired_at(&ancient, NOW));
        assert!(is_expiring_soon_at(&ancient, DEFAULT_REFRESH_BUFFER_SECS, NOW));
        assert!(valid_claims_at(&ancient, NOW).is_none());
        assert_eq!(extreme(i64::MIN).seconds_until_expiry(i64::MAX), 0);
    }
}
