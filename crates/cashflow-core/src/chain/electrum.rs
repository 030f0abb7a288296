//! Electrum-protocol chain adapter backed by the `electrum-client` crate
//! (`spec.md` §4.1) — the BCH analog of the teacher's `alloy-provider`
//! (EVM) and `solana-client` (Solana) RPC clients.

use async_trait::async_trait;
use cashflow_types::{NftCapability, NftData, Sats, TokenData, VerboseTx, VerboseTxOutput};
use dashmap::DashMap;
use electrum_client::{Client, ConfigBuilder, ElectrumApi};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use super::{ChainAdapter, ChainAdapterError, ScripthashNotification, Utxo};

pub struct ElectrumConfig {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
}

struct Subscribers {
    senders: Vec<UnboundedSender<ScripthashNotification>>,
}

/// Electrum-protocol chain adapter. Reconnects lazily: a broken connection
/// is only re-opened on the next call that needs it, per `spec.md` §4.1.
pub struct ElectrumChainAdapter {
    config: ElectrumConfig,
    client: Mutex<Option<Arc<Client>>>,
    subscribers: DashMap<String, Subscribers>,
    _notification_task: Mutex<Option<JoinHandle<()>>>,
}

impl ElectrumChainAdapter {
    pub fn new(config: ElectrumConfig) -> Self {
        Self {
            config,
            client: Mutex::new(None),
            subscribers: DashMap::new(),
            _notification_task: Mutex::new(None),
        }
    }

    fn connect(&self) -> Result<Arc<Client>, ChainAdapterError> {
        let mut guard = self.client.lock().expect("electrum client mutex poisoned");
        if let Some(client) = guard.as_ref() {
            return Ok(client.clone());
        }
        let url = format!("{}:{}", self.config.host, self.config.port);
        let scheme = if self.config.use_tls { "ssl" } else { "tcp" };
        let endpoint = format!("{scheme}://{url}");
        let cfg = ConfigBuilder::new().build();
        let client = Client::from_config(&endpoint, cfg)
            .map_err(|e| ChainAdapterError::Unavailable(e.to_string()))?;
        let client = Arc::new(client);
        *guard = Some(client.clone());
        tracing::info!(endpoint = %endpoint, "connected to Electrum server");
        Ok(client)
    }

    fn reset_connection(&self) {
        let mut guard = self.client.lock().expect("electrum client mutex poisoned");
        *guard = None;
    }

    fn verbose_tx_from_json(txid: &str, json: &serde_json::Value) -> Result<VerboseTx, ChainAdapterError> {
        let vout = json
            .get("vout")
            .and_then(|v| v.as_array())
            .ok_or_else(|| ChainAdapterError::Unavailable("malformed verbose tx".into()))?;
        let mut outputs = Vec::with_capacity(vout.len());
        for out in vout {
            let value_sats = out
                .get("value")
                .and_then(|v| v.as_u64())
                .unwrap_or(0);
            let locking_bytecode_hex = out
                .get("scriptPubKey")
                .and_then(|s| s.get("hex"))
                .and_then(|h| h.as_str())
                .unwrap_or_default()
                .to_string();
            let output = match out.get("token_data") {
                Some(token_data) if !token_data.is_null() => {
                    let category = token_data
                        .get("category")
                        .and_then(|c| c.as_str())
                        .unwrap_or_default()
                        .to_string();
                    let amount = token_data.get("amount").and_then(|a| a.as_str()).and_then(|s| s.parse().ok());
                    let nft = token_data.get("nft").and_then(|n| {
                        if n.is_null() {
                            return None;
                        }
                        let capability = match n.get("capability").and_then(|c| c.as_str()) {
                            Some("mutable") => NftCapability::Mutable,
                            Some("minting") => NftCapability::Minting,
                            _ => NftCapability::None,
                        };
                        let commitment = n
                            .get("commitment")
                            .and_then(|c| c.as_str())
                            .unwrap_or_default()
                            .to_string();
                        Some(NftData {
                            capability,
                            commitment,
                        })
                    });
                    VerboseTxOutput::Token {
                        locking_bytecode_hex,
                        value: Sats::new(value_sats),
                        token_data: TokenData {
                            category,
                            amount,
                            nft,
                        },
                    }
                }
                _ => VerboseTxOutput::Plain {
                    locking_bytecode_hex,
                    value: Sats::new(value_sats),
                },
            };
            outputs.push(output);
        }
        let confirmations = json
            .get("confirmations")
            .and_then(|c| c.as_u64())
            .map(|c| c as u32);
        Ok(VerboseTx {
            txid: txid.to_string(),
            outputs,
            confirmations,
        })
    }
}

#[async_trait]
impl ChainAdapter for ElectrumChainAdapter {
    async fn get_raw_tx(&self, txid: &str) -> Result<VerboseTx, ChainAdapterError> {
        let client = self.connect()?;
        let txid_owned = txid.to_string();
        let result = tokio::task::spawn_blocking(move || {
            client.raw_call("blockchain.transaction.get", vec![
                electrum_client::raw_tx_param(&txid_owned),
                true.into(),
            ])
        })
        .await
        .map_err(|e| ChainAdapterError::Unavailable(e.to_string()))?;

        match result {
            Ok(json) => Self::verbose_tx_from_json(txid, &json),
            Err(e) => {
                self.reset_connection();
                let message = e.to_string();
                if message.to_lowercase().contains("missing") || message.to_lowercase().contains("not found") {
                    Err(ChainAdapterError::NotFound)
                } else {
                    Err(ChainAdapterError::Unavailable(message))
                }
            }
        }
    }

    async fn get_utxos(&self, address: &str) -> Result<Vec<Utxo>, ChainAdapterError> {
        let client = self.connect()?;
        let scripthash = crate::keys::address_to_scripthash(address)
            .map_err(|e| ChainAdapterError::Unavailable(e.to_string()))?;
        let result = tokio::task::spawn_blocking(move || {
            client.script_list_unspent_from_hash(&scripthash)
        })
        .await
        .map_err(|e| ChainAdapterError::Unavailable(e.to_string()))?;

        match result {
            Ok(entries) => Ok(entries
                .into_iter()
                .map(|entry| Utxo {
                    txid: entry.tx_hash.to_string(),
                    vout: entry.tx_pos as u32,
                    value_sats: entry.value,
                    token_category: None,
                })
                .collect()),
            Err(e) => {
                self.reset_connection();
                Err(ChainAdapterError::Unavailable(e.to_string()))
            }
        }
    }

    async fn get_block_height(&self) -> Result<u64, ChainAdapterError> {
        let client = self.connect()?;
        let result = tokio::task::spawn_blocking(move || client.block_headers_subscribe())
            .await
            .map_err(|e| ChainAdapterError::Unavailable(e.to_string()))?;
        match result {
            Ok(header) => Ok(header.height as u64),
            Err(e) => {
                self.reset_connection();
                Err(ChainAdapterError::Unavailable(e.to_string()))
            }
        }
    }

    async fn broadcast(&self, raw_hex: &str) -> Result<String, ChainAdapterError> {
        let client = self.connect()?;
        let bytes = hex::decode(raw_hex)
            .map_err(|e| ChainAdapterError::BroadcastRejected(e.to_string()))?;
        let result = tokio::task::spawn_blocking(move || client.transaction_broadcast_raw(&bytes))
            .await
            .map_err(|e| ChainAdapterError::Unavailable(e.to_string()))?;
        result
            .map(|txid| txid.to_string())
            .map_err(|e| ChainAdapterError::BroadcastRejected(e.to_string()))
    }

    async fn subscribe_address(
        &self,
        address: &str,
        callback: UnboundedSender<ScripthashNotification>,
    ) -> Result<(), ChainAdapterError> {
        let scripthash = crate::keys::address_to_scripthash(address)
            .map_err(|e| ChainAdapterError::Unavailable(e.to_string()))?;
        let is_first = {
            let mut entry = self
                .subscribers
                .entry(scripthash.clone())
                .or_insert_with(|| Subscribers { senders: Vec::new() });
            let was_empty = entry.senders.is_empty();
            entry.senders.push(callback);
            was_empty
        };
        if is_first {
            let client = self.connect()?;
            let scripthash_for_call = scripthash.clone();
            tokio::task::spawn_blocking(move || client.script_subscribe_from_hash(&scripthash_for_call))
                .await
                .map_err(|e| ChainAdapterError::Unavailable(e.to_string()))?
                .map_err(|e| ChainAdapterError::Unavailable(e.to_string()))?;
            tracing::debug!(%scripthash, address, "subscribed to scripthash");
        }
        Ok(())
    }

    async fn unsubscribe_address(&self, address: &str) -> Result<(), ChainAdapterError> {
        let scripthash = crate::keys::address_to_scripthash(address)
            .map_err(|e| ChainAdapterError::Unavailable(e.to_string()))?;
        let should_unsubscribe = {
            if let Some(mut entry) = self.subscribers.get_mut(&scripthash) {
                entry.senders.pop();
                entry.senders.is_empty()
            } else {
                false
            }
        };
        if should_unsubscribe {
            self.subscribers.remove(&scripthash);
            let client = self.connect()?;
            let scripthash_for_call = scripthash.clone();
            let _ = tokio::task::spawn_blocking(move || {
                client.script_unsubscribe_from_hash(&scripthash_for_call)
            })
            .await;
        }
        Ok(())
    }
}
