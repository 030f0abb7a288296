//! In-memory `ChainAdapter` test double (`spec.md` §8's testable
//! properties all assume a swappable chain backend). Grounded on the
//! teacher's `chains::mock` fixtures used to exercise facilitator logic
//! without a live RPC endpoint.

use async_trait::async_trait;
use cashflow_types::VerboseTx;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc::UnboundedSender;

use super::{ChainAdapter, ChainAdapterError, ScripthashNotification, Utxo};

/// A fully in-process chain adapter. Tests seed it with canned
/// transactions and UTXO sets, then assert on what gets broadcast.
#[derive(Default)]
pub struct MockChainAdapter {
    txs: DashMap<String, VerboseTx>,
    utxos: DashMap<String, Vec<Utxo>>,
    block_height: AtomicU64,
    broadcasts: Mutex<Vec<String>>,
    fail_broadcast: Mutex<Option<String>>,
}

impl MockChainAdapter {
    pub fn new() -> Self {
        Self {
            block_height: AtomicU64::new(800_000),
            ..Default::default()
        }
    }

    pub fn insert_tx(&self, tx: VerboseTx) {
        self.txs.insert(tx.txid.clone(), tx);
    }

    pub fn set_utxos(&self, address: &str, utxos: Vec<Utxo>) {
        self.utxos.insert(address.to_string(), utxos);
    }

    pub fn set_block_height(&self, height: u64) {
        self.block_height.store(height, Ordering::SeqCst);
    }

    pub fn fail_next_broadcast(&self, reason: &str) {
        *self.fail_broadcast.lock().expect("poisoned") = Some(reason.to_string());
    }

    pub fn broadcasts(&self) -> Vec<String> {
        self.broadcasts.lock().expect("poisoned").clone()
    }
}

#[async_trait]
impl ChainAdapter for MockChainAdapter {
    async fn get_raw_tx(&self, txid: &str) -> Result<VerboseTx, ChainAdapterError> {
        self.txs.get(txid).map(|t| t.clone()).ok_or(ChainAdapterError::NotFound)
    }

    async fn get_utxos(&self, address: &str) -> Result<Vec<Utxo>, ChainAdapterError> {
        Ok(self.utxos.get(address).map(|v| v.clone()).unwrap_or_default())
    }

    async fn get_block_height(&self) -> Result<u64, ChainAdapterError> {
        Ok(self.block_height.load(Ordering::SeqCst))
    }

    async fn broadcast(&self, raw_hex: &str) -> Result<String, ChainAdapterError> {
        if let Some(reason) = self.fail_broadcast.lock().expect("poisoned").take() {
            return Err(ChainAdapterError::BroadcastRejected(reason));
        }
        self.broadcasts.lock().expect("poisoned").push(raw_hex.to_string());
        let txid = crate::keys::hash256(raw_hex.as_bytes());
        Ok(hex::encode(txid))
    }

    async fn subscribe_address(
        &self,
        _address: &str,
        _callback: UnboundedSender<ScripthashNotification>,
    ) -> Result<(), ChainAdapterError> {
        Ok(())
    }

    async fn unsubscribe_address(&self, _address: &str) -> Result<(), ChainAdapterError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn broadcast_records_raw_hex_and_returns_a_txid() {
        let adapter = MockChainAdapter::new();
        let txid = adapter.broadcast("deadbeef").await.unwrap();
        assert_eq!(adapter.broadcasts(), vec!["deadbeef".to_string()]);
        assert_eq!(txid.len(), 64);
    }

    #[tokio::test]
    async fn broadcast_can_be_forced_to_fail_once() {
        let adapter = MockChainAdapter::new();
        adapter.fail_next_broadcast("mempool-conflict");
        let err = adapter.broadcast("aa").await.unwrap_err();
        assert!(matches!(err, ChainAdapterError::BroadcastRejected(_)));
        assert!(adapter.broadcast("bb").await.is_ok());
    }

    #[tokio::test]
    async fn missing_tx_is_not_found() {
        let adapter = MockChainAdapter::new();
        assert!(matches!(
            adapter.get_raw_tx("nope").await,
            Err(ChainAdapterError::NotFound)
        ));
    }
}
