//! Nonce Store (`spec.md` §4.8). In-memory, single-use challenge nonces.

use crate::model::NonceRecord;
use cashflow_types::{Sats, UnixTimestamp};
use dashmap::DashMap;
use uuid::Uuid;

pub const NONCE_TTL_SECONDS: u64 = 120;

#[derive(Default)]
pub struct NonceStore {
    nonces: DashMap<Uuid, NonceRecord>,
}

impl NonceStore {
    pub fn new() -> Self {
        NonceStore::default()
    }

    /// Generates and stores a fresh nonce with a 120 s TTL.
    pub fn issue(&self, merchant_address: String, amount_sats: Sats, api_path: String) -> NonceRecord {
        let record = NonceRecord {
            nonce: Uuid::new_v4(),
            merchant_address,
            amount_sats,
            api_path,
            expires_at: UnixTimestamp::now() + NONCE_TTL_SECONDS,
            consumed: false,
        };
        self.nonces.insert(record.nonce, record.clone());
        record
    }

    /// Returns the record if present and not expired; sweeps it out if expired.
    pub fn get(&self, nonce: Uuid) -> Option<NonceRecord> {
        let expired = match self.nonces.get(&nonce) {
            Some(entry) => entry.expires_at.is_past(),
            None => return None,
        };
        if expired {
            self.nonces.remove(&nonce);
            return None;
        }
        self.nonces.get(&nonce).map(|e| e.clone())
    }

    /// Atomically returns-and-marks a nonce consumed; absent or already
    /// consumed or expired nonces return `None` on every call after the first.
    pub fn consume(&self, nonce: Uuid) -> Option<NonceRecord> {
        let mut entry = self.nonces.get_mut(&nonce)?;
        if entry.consumed || entry.expires_at.is_past() {
            return None;
        }
        entry.consumed = true;
        Some(entry.clone())
    }

    /// Removes every expired entry. Safe to call opportunistically.
    pub fn sweep_expired(&self) {
        self.nonces.retain(|_, record| !record.expires_at.is_past());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_nonce_can_be_consumed_exactly_once() {
        let store = NonceStore::new();
        let record = store.issue("bchtest:merchant".into(), Sats::new(100), "/api/x".into());
        assert!(store.consume(record.nonce).is_some());
        assert!(store.consume(record.nonce).is_none());
    }

    #[test]
    fn expired_nonces_are_absent() {
        let store = NonceStore::new();
        let record = store.issue("bchtest:merchant".into(), Sats::new(100), "/api/x".into());
        store
            .nonces
            .get_mut(&record.nonce)
            .unwrap()
            .expires_at = UnixTimestamp::from_secs(0);
        assert!(store.get(record.nonce).is_none());
        assert!(store.consume(record.nonce).is_none());
    }
}
