//! Capability tokens, requester-IP hashing, and the expiry policy.
//!
//! Share ids and request ids are short capability tokens: whoever holds one
//! may act on the resource it names, so they are drawn from a CSPRNG rather
//! than any sequential source.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use sha2::{Digest, Sha256};

/// Length of share and request identifiers.
pub const TOKEN_LEN: usize = 12;

/// 62-symbol alphabet for public tokens. URL-safe without `-` and `_` so the
/// ids read unambiguously when pasted.
const TOKEN_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Number of random bytes behind an upload session key.
const SESSION_KEY_BYTES: usize = 48;

/// Security helper constructed once at startup and injected into services.
#[derive(Debug, Clone)]
pub struct Security {
    ip_salt: String,
}

impl Security {
    pub fn new(ip_salt: impl Into<String>) -> Self {
        Self { ip_salt: ip_salt.into() }
    }

    /// Hash a requester IP. The raw address is never persisted.
    pub fn hash_ip(&self, ip: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(ip.as_bytes());
        hasher.update(self.ip_salt.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Generate a 12-character public share identifier.
    pub fn generate_share_id(&self) -> String {
        let mut rng = rand::rng();
        (0..TOKEN_LEN)
            .map(|_| {
                let idx = rng.random_range(0..TOKEN_ALPHABET.len());
                TOKEN_ALPHABET[idx] as char
            })
            .collect()
    }

    /// Generate a 12-character access-request identifier. Same shape as a
    /// share id.
    pub fn generate_request_id(&self) -> String {
        self.generate_share_id()
    }

    /// Generate the private capability token for one upload attempt.
    pub fn generate_session_key(&self) -> String {
        let mut bytes = [0u8; SESSION_KEY_BYTES];
        rand::rng().fill(&mut bytes[..]);
        URL_SAFE_NO_PAD.encode(bytes)
    }

    /// Expiry timestamp `hours` from now, stored as RFC 3339 UTC.
    pub fn calculate_expiry(&self, hours: i64) -> String {
        (Utc::now() + Duration::hours(hours)).to_rfc3339()
    }

    /// Expiry policy: has the given RFC 3339 timestamp passed?
    pub fn is_expired(&self, expires_at: &str) -> bool {
        is_expired_at(expires_at, Utc::now())
    }

    /// Storage key for one chunk of a file.
    pub fn chunk_key(&self, file_id: &str, chunk_index: i64) -> String {
        format!("files/{}/chunks/{:04}", file_id, chunk_index)
    }

    /// Storage key for the assembled object.
    pub fn file_key(&self, file_id: &str) -> String {
        format!("files/{}/file", file_id)
    }
}

/// Pure expiry check against an explicit clock. Unparseable timestamps count
/// as expired.
pub fn is_expired_at(expires_at: &str, now: DateTime<Utc>) -> bool {
    match DateTime::parse_from_rfc3339(expires_at) {
        Ok(t) => now > t.with_timezone(&Utc),
        Err(_) => true,
    }
}
