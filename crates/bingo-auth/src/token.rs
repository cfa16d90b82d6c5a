//! HMAC-signed room tokens.
//!
//! Format: `base64url(json claims).base64url(hmac_sha256(json claims))`,
//! both parts unpadded. The claims name the player uuid, the room slug,
//! and an expiry in unix seconds, so a token can be checked without any
//! registry lookup.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use bingo_protocol::RoomId;
use hmac::{Hmac, Mac};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{AuthError, RevocationList, TokenAuthority};

type HmacSha256 = Hmac<Sha256>;

// ---------------------------------------------------------------------------
// TokenConfig
// ---------------------------------------------------------------------------

/// Configuration for token issuance.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// How long (in seconds) an issued token stays valid.
    ///
    /// Default: 24 hours.
    pub ttl_secs: u64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 24 * 60 * 60,
        }
    }
}

// ---------------------------------------------------------------------------
// RoomClaims
// ---------------------------------------------------------------------------

/// What a verified token says about its holder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomClaims {
    pub uuid: Uuid,
    pub room: RoomId,
    /// Expiry, unix seconds.
    pub exp: i64,
}

// ---------------------------------------------------------------------------
// HmacTokenAuthority
// ---------------------------------------------------------------------------

/// A [`TokenAuthority`] that signs claims with HMAC-SHA256.
pub struct HmacTokenAuthority {
    mac: HmacSha256,
    config: TokenConfig,
    revoked: RevocationList,
}

impl HmacTokenAuthority {
    /// Creates an authority signing with `key`.
    ///
    /// # Errors
    /// Returns [`AuthError::InvalidKey`] for an empty key.
    pub fn new(key: &[u8], config: TokenConfig) -> Result<Self, AuthError> {
        if key.is_empty() {
            return Err(AuthError::InvalidKey);
        }
        let mac = HmacSha256::new_from_slice(key)
            .map_err(|_| AuthError::InvalidKey)?;
        Ok(Self {
            mac,
            config,
            revoked: RevocationList::new(),
        })
    }

    /// Creates an authority with a fresh random 256-bit key. Tokens don't
    /// survive a restart.
    pub fn with_random_key(config: TokenConfig) -> Result<Self, AuthError> {
        let key: [u8; 32] = rand::rng().random();
        Self::new(&key, config)
    }

    /// Issues a token as of `now` (unix seconds).
    pub fn issue_at(
        &self,
        uuid: Uuid,
        room: &RoomId,
        now: i64,
    ) -> Result<String, AuthError> {
        let ttl = i64::try_from(self.config.ttl_secs).unwrap_or(i64::MAX);
        let claims = RoomClaims {
            uuid,
            room: room.clone(),
            exp: now.saturating_add(ttl),
        };
        let payload = serde_json::to_vec(&claims).map_err(AuthError::Encode)?;
        let signature = self.sign(&payload);
        Ok(format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&payload),
            URL_SAFE_NO_PAD.encode(signature)
        ))
    }

    /// Verifies a token as of `now` (unix seconds).
    pub fn verify_at(
        &self,
        token: &str,
        now: i64,
    ) -> Result<RoomClaims, AuthError> {
        let (claims, signature) = self.open(token)?;
        if self.revoked.is_revoked(signature) {
            return Err(AuthError::Revoked);
        }
        if claims.exp <= now {
            return Err(AuthError::Expired);
        }
        Ok(claims)
    }

    /// Purges revocation entries as of `now` (unix seconds).
    pub fn purge_expired_at(&mut self, now: i64) -> usize {
        let purged = self.revoked.purge_expired(now);
        if purged > 0 {
            tracing::debug!(purged, "purged expired token revocations");
        }
        purged
    }

    /// Number of outstanding revocations.
    pub fn revoked_count(&self) -> usize {
        self.revoked.len()
    }

    fn sign(&self, payload: &[u8]) -> Vec<u8> {
        let mut mac = self.mac.clone();
        mac.update(payload);
        mac.finalize().into_bytes().to_vec()
    }

    /// Splits, decodes, and checks the signature. Returns the claims and
    /// the encoded signature part (the revocation key).
    fn open<'t>(
        &self,
        token: &'t str,
    ) -> Result<(RoomClaims, &'t str), AuthError> {
        let mut parts = token.split('.');
        let (Some(payload_part), Some(signature_part), None) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(AuthError::Malformed("expected two parts".into()));
        };

        let payload = URL_SAFE_NO_PAD
            .decode(payload_part)
            .map_err(|e| AuthError::Malformed(e.to_string()))?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature_part)
            .map_err(|e| AuthError::Malformed(e.to_string()))?;

        let mut mac = self.mac.clone();
        mac.update(&payload);
        mac.verify_slice(&signature)
            .map_err(|_| AuthError::BadSignature)?;

        let claims = serde_json::from_slice(&payload)
            .map_err(|e| AuthError::Malformed(e.to_string()))?;
        Ok((claims, signature_part))
    }
}

fn unix_now() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

impl TokenAuthority for HmacTokenAuthority {
    fn issue(&self, uuid: Uuid, room: &RoomId) -> Result<String, AuthError> {
        self.issue_at(uuid, room, unix_now())
    }

    fn verify(&self, token: &str) -> Result<RoomClaims, AuthError> {
        self.verify_at(token, unix_now())
    }

    fn revoke(&mut self, token: &str) {
        match self.open(token) {
            Ok((claims, signature)) => {
                self.revoked.revoke(signature, claims.exp);
                tracing::debug!(uuid = %claims.uuid, room = %claims.room, "token revoked");
            }
            Err(e) => {
                tracing::debug!(error = %e, "ignoring revocation of invalid token");
            }
        }
    }

    fn purge_expired(&mut self) -> usize {
        self.purge_expired_at(unix_now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;

    fn authority() -> HmacTokenAuthority {
        HmacTokenAuthority::new(b"test-secret", TokenConfig { ttl_secs: 60 })
            .unwrap()
    }

    fn room() -> RoomId {
        RoomId::new("happy-otter")
    }

    #[test]
    fn test_issue_and_verify_returns_claims() {
        let auth = authority();
        let uuid = Uuid::new_v4();
        let token = auth.issue_at(uuid, &room(), NOW).unwrap();

        let claims = auth.verify_at(&token, NOW + 1).unwrap();
        assert_eq!(claims.uuid, uuid);
        assert_eq!(claims.room, room());
        assert_eq!(claims.exp, NOW + 60);
    }

    #[test]
    fn test_token_format_is_two_base64url_parts() {
        let token = authority().issue_at(Uuid::new_v4(), &room(), NOW).unwrap();
        let parts: Vec<_> = token.split('.').collect();
        assert_eq!(parts.len(), 2);
        assert!(parts.iter().all(|p| !p.contains('=') && !p.contains('+')));
    }

    #[test]
    fn test_verify_expired_token() {
        let auth = authority();
        let token = auth.issue_at(Uuid::new_v4(), &room(), NOW).unwrap();
        assert!(matches!(
            auth.verify_at(&token, NOW + 60),
            Err(AuthError::Expired)
        ));
    }

    #[test]
    fn test_verify_tampered_payload() {
        let auth = authority();
        let token = auth.issue_at(Uuid::new_v4(), &room(), NOW).unwrap();
        let (_, signature) = token.split_once('.').unwrap();

        let forged = RoomClaims {
            uuid: Uuid::new_v4(),
            room: room(),
            exp: NOW + 60,
        };
        let forged_payload =
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged).unwrap());
        let forged_token = format!("{forged_payload}.{signature}");

        assert!(matches!(
            auth.verify_at(&forged_token, NOW),
            Err(AuthError::BadSignature)
        ));
    }

    #[test]
    fn test_verify_token_from_other_key() {
        let other =
            HmacTokenAuthority::new(b"other-secret", TokenConfig::default())
                .unwrap();
        let token = other.issue_at(Uuid::new_v4(), &room(), NOW).unwrap();
        assert!(matches!(
            authority().verify_at(&token, NOW),
            Err(AuthError::BadSignature)
        ));
    }

    #[test]
    fn test_verify_malformed_tokens() {
        let auth = authority();
        for token in ["", "abc", "a.b.c", "!!!.???"] {
            assert!(
                matches!(auth.verify_at(token, NOW), Err(AuthError::Malformed(_))),
                "token {token:?} should be malformed"
            );
        }
    }

    #[test]
    fn test_revoked_token_fails_verification() {
        let mut auth = authority();
        let token = auth.issue_at(Uuid::new_v4(), &room(), NOW).unwrap();
        let other = auth.issue_at(Uuid::new_v4(), &room(), NOW).unwrap();

        auth.revoke(&token);

        assert!(matches!(
            auth.verify_at(&token, NOW),
            Err(AuthError::Revoked)
        ));
        assert!(auth.verify_at(&other, NOW).is_ok());
    }

    #[test]
    fn test_revoke_invalid_token_is_ignored() {
        let mut auth = authority();
        auth.revoke("garbage");
        assert_eq!(auth.revoked_count(), 0);
    }

    #[test]
    fn test_purge_drops_revocations_past_expiry() {
        let mut auth = authority();
        let token = auth.issue_at(Uuid::new_v4(), &room(), NOW).unwrap();
        auth.revoke(&token);

        assert_eq!(auth.purge_expired_at(NOW + 30), 0);
        assert_eq!(auth.purge_expired_at(NOW + 61), 1);
        assert_eq!(auth.revoked_count(), 0);
        // Still rejected, now as expired.
        assert!(matches!(
            auth.verify_at(&token, NOW + 61),
            Err(AuthError::Expired)
        ));
    }

    #[test]
    fn test_empty_key_rejected() {
        assert!(matches!(
            HmacTokenAuthority::new(b"", TokenConfig::default()),
            Err(AuthError::InvalidKey)
        ));
    }

    #[test]
    fn test_random_key_authorities_disagree() {
        let a = HmacTokenAuthority::with_random_key(TokenConfig::default())
            .unwrap();
        let b = HmacTokenAuthority::with_random_key(TokenConfig::default())
            .unwrap();
        let token = a.issue(Uuid::new_v4(), &room()).unwrap();
        assert!(a.verify(&token).is_ok());
        assert!(b.verify(&token).is_err());
    }
}
