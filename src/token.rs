//! Session tokens issued after a successful login.
//!
//! Token format: `hex(payload).hex(mac)` where `payload` is
//! `email|account_id|expiry_ms` and `mac` is HMAC-SHA256 over the payload.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::account::types::current_timestamp_ms;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, PartialEq)]
pub struct TokenClaims {
    pub email: String,
    pub account_id: String,
    pub expires_at_ms: u64,
}

pub struct TokenIssuer {
    secret: Vec<u8>,
    ttl_ms: u64,
}

impl TokenIssuer {
    pub fn new(secret: &str, ttl_ms: u64) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            ttl_ms,
        }
    }

    pub fn issue(&self, email: &str, account_id: &str) -> String {
        let expires_at_ms = current_timestamp_ms() + self.ttl_ms;
        let payload = format!("{}|{}|{}", email, account_id, expires_at_ms);
        let mac = self.sign(payload.as_bytes());
        format!("{}.{}", hex::encode(payload.as_bytes()), hex::encode(mac))
    }

    /// Verify a token's MAC and expiry. Returns the claims when valid.
    pub fn verify(&self, token: &str) -> Option<TokenClaims> {
        let (payload_hex, mac_hex) = token.split_once('.')?;
        let payload = hex::decode(payload_hex).ok()?;
        let mac = hex::decode(mac_hex).ok()?;

        let mut verifier = HmacSha256::new_from_slice(&self.secret)
            .expect("HMAC accepts any key length");
        verifier.update(&payload);
        verifier.verify_slice(&mac).ok()?;

        let payload = String::from_utf8(payload).ok()?;
        let mut parts = payload.splitn(3, '|');
        let email = parts.next()?.to_string();
        let account_id = parts.next()?.to_string();
        let expires_at_ms: u64 = parts.next()?.parse().ok()?;

        if expires_at_ms <= current_timestamp_ms() {
            return None;
        }
        Some(TokenClaims {
            email,
            account_id,
            expires_at_ms,
        })
    }

    fn sign(&self, payload: &[u8]) -> Vec<u8> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .expect("HMAC accepts any key length");
        mac.update(payload);
        mac.finalize().into_bytes().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_and_verify() {
        let issuer = TokenIssuer::new("test-secret", 60_000);
        let token = issuer.issue("alice@example.com", "acct-1");

        let claims = issuer.verify(&token).unwrap();
        assert_eq!(claims.email, "alice@example.com");
        assert_eq!(claims.account_id, "acct-1");
        assert!(claims.expires_at_ms > current_timestamp_ms());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let issuer = TokenIssuer::new("secret-a", 60_000);
        let other = TokenIssuer::new("secret-b", 60_000);
        let token = issuer.issue("alice@example.com", "acct-1");
        assert!(other.verify(&token).is_none());
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let issuer = TokenIssuer::new("test-secret", 60_000);
        let token = issuer.issue("alice@example.com", "acct-1");
        let (payload_hex, mac_hex) = token.split_once('.').unwrap();
        let forged_payload = hex::encode(b"mallory@example.com|acct-1|9999999999999");
        let forged = format!("{}.{}", forged_payload, mac_hex);
        assert_ne!(forged_payload, payload_hex);
        assert!(issuer.verify(&forged).is_none());
    }

    #[test]
    fn test_expired_token_rejected() {
        let issuer = TokenIssuer::new("test-secret", 0);
        let token = issuer.issue("alice@example.com", "acct-1");
        std::thread::sleep(std::time::Duration::from_millis(2));
        assert!(issuer.verify(&token).is_none());
    }
}
