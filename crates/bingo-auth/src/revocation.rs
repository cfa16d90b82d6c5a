//! Revoked-token bookkeeping.

use std::collections::HashMap;

/// Tokens revoked before their natural expiry.
///
/// Each entry remembers when the token would have expired, so the list
/// can be pruned: once a token is past its expiry, verification rejects
/// it regardless and the entry is dead weight.
#[derive(Debug, Default)]
pub struct RevocationList {
    /// Token signature → expiry (unix seconds).
    entries: HashMap<String, i64>,
}

impl RevocationList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a revoked token signature.
    pub fn revoke(&mut self, signature: impl Into<String>, expires_at: i64) {
        self.entries.insert(signature.into(), expires_at);
    }

    pub fn is_revoked(&self, signature: &str) -> bool {
        self.entries.contains_key(signature)
    }

    /// Removes every entry whose token has expired by `now`.
    pub fn purge_expired(&mut self, now: i64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, expires_at| *expires_at > now);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
