//! Chain Adapter (`spec.md` §4.1).
//!
//! A persistent connection to an Electrum-protocol node. The trait keeps
//! the rest of `cashflow-core` decoupled from the concrete RPC client, the
//! same way the teacher's `x402_types::chain::ChainProviderOps` trait
//! decouples scheme handlers from EVM/Solana/Aptos-specific providers.

pub mod electrum;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

use async_trait::async_trait;
use cashflow_types::VerboseTx;

#[derive(Debug, Clone)]
pub struct Utxo {
    pub txid: String,
    pub vout: u32,
    pub value_sats: u64,
    pub token_category: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ChainAdapterError {
    #[error("chain adapter unavailable: {0}")]
    Unavailable(String),
    #[error("not found")]
    NotFound,
    #[error("broadcast rejected: {0}")]
    BroadcastRejected(String),
    #[error("request timed out")]
    Timeout,
}

/// The persistent connection to an Electrum-protocol node (`spec.md` §4.1).
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    async fn get_raw_tx(&self, txid: &str) -> Result<VerboseTx, ChainAdapterError>;
    async fn get_utxos(&self, address: &str) -> Result<Vec<Utxo>, ChainAdapterError>;
    async fn get_block_height(&self) -> Result<u64, ChainAdapterError>;
    async fn broadcast(&self, raw_hex: &str) -> Result<String, ChainAdapterError>;

    /// Subscribes to address changes; dispatches notifications to `callback`.
    /// First subscriber for a scripthash performs the remote subscribe;
    /// implementations track subscriber counts internally.
    async fn subscribe_address(
        &self,
        address: &str,
        callback: tokio::sync::mpsc::UnboundedSender<ScripthashNotification>,
    ) -> Result<(), ChainAdapterError>;

    async fn unsubscribe_address(&self, address: &str) -> Result<(), ChainAdapterError>;
}

#[derive(Debug, Clone)]
pub struct ScripthashNotification {
    pub address: String,
    pub scripthash: String,
    pub status: Option<String>,
}
