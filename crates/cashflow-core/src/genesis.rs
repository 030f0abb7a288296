//! Genesis Funding Builder (`spec.md` §4.13).
//!
//! Crafts the transaction that funds a subscription covenant with a
//! CashToken mutable-NFT output, without an external wallet.

use crate::chain::ChainAdapter;
use crate::error::GenesisError;
use crate::keys;
use crate::tx::{CashTokenPrefix, Outpoint, TxInput, TxOutput, UnsignedTransaction};
use cashflow_types::Sats;
use secp256k1::Keypair;

pub const MINER_FEE_SATS: u64 = 1_500;
const DUST_THRESHOLD_SATS: u64 = 546;

pub struct GenesisParams<'a> {
    pub subscriber_keypair: &'a Keypair,
    pub subscriber_pkh: cashflow_types::Pkh,
    pub subscriber_address: &'a str,
    pub contract_token_address: &'a str,
    pub genesis_commitment_hex: String,
    pub deposit_sats: Sats,
}

#[derive(Debug, Clone)]
pub struct GenesisResult {
    pub txid: String,
    pub token_category: String,
}

/// Picks the subscriber's first non-token UTXO, spends it into the
/// contract's token-address output (carrying the mutable-NFT genesis
/// commitment) plus an optional change output, and broadcasts
/// (`spec.md` §4.13, steps 1-7).
pub async fn build_and_broadcast_genesis(
    params: GenesisParams<'_>,
    chain: &dyn ChainAdapter,
) -> Result<GenesisResult, GenesisError> {
    let utxos = chain.get_utxos(params.subscriber_address).await?;
    let funding_utxo = utxos
        .into_iter()
        .find(|u| u.token_category.is_none())
        .ok_or_else(|| GenesisError::NoFundingUtxo(params.subscriber_address.to_string()))?;

    let token_category = funding_utxo.txid.clone();

    let available = funding_utxo.value_sats;
    let needed = params.deposit_sats.as_u64() + MINER_FEE_SATS;
    if available < needed {
        return Err(GenesisError::TxBuilder(
            crate::error::TxBuilderError::InsufficientFunds {
                have: available,
                need: needed,
            },
        ));
    }
    let change = available - needed;
    let drop_change = change < DUST_THRESHOLD_SATS;

    let contract_locking_bytecode = keys::address_to_locking_bytecode(params.contract_token_address)
        .map_err(|e| GenesisError::TxBuilder(crate::error::TxBuilderError::SignFailed(e.to_string())))?;
    let subscriber_locking_bytecode = keys::address_to_locking_bytecode(params.subscriber_address)
        .map_err(|e| GenesisError::TxBuilder(crate::error::TxBuilderError::SignFailed(e.to_string())))?;

    let mut outputs = vec![TxOutput {
        value: params.deposit_sats,
        token_prefix: Some(CashTokenPrefix::mutable_nft(
            token_category.clone(),
            Some(params.genesis_commitment_hex),
        )),
        locking_bytecode: contract_locking_bytecode,
    }];
    if !drop_change {
        outputs.push(TxOutput {
            value: Sats::new(change),
            token_prefix: None,
            locking_bytecode: subscriber_locking_bytecode,
        });
    }

    let prevout_script = keys::address_to_locking_bytecode(params.subscriber_address)
        .map_err(|e| GenesisError::TxBuilder(crate::error::TxBuilderError::SignFailed(e.to_string())))?;

    let mut tx = UnsignedTransaction {
        version: 2,
        inputs: vec![TxInput {
            outpoint: Outpoint {
                txid: funding_utxo.txid.clone(),
                vout: funding_utxo.vout,
            },
            sequence: 0xffff_ffff,
            value: Sats::new(funding_utxo.value_sats),
            prevout_script,
            unlocking_script: Vec::new(),
        }],
        outputs,
        locktime: 0,
    };

    tx.sign_p2pkh_input(0, params.subscriber_keypair)
        .map_err(GenesisError::TxBuilder)?;

    let raw_hex = tx.serialize_hex().map_err(GenesisError::TxBuilder)?;
    let txid = chain.broadcast(&raw_hex).await?;

    Ok(GenesisResult { txid, token_category })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::MockChainAdapter;
    use crate::keys::{generate_keypair, Network};

    #[tokio::test]
    async fn dust_change_is_dropped() {
        let adapter = MockChainAdapter::new();
        let subscriber = generate_keypair(Network::Chipnet);
        adapter.set_utxos(
            &subscriber.address,
            vec![crate::chain::Utxo {
                txid: "11".repeat(32),
                vout: 0,
                value_sats: 10_000 + MINER_FEE_SATS + 100,
                token_category: None,
            }],
        );
        let keypair = secp256k1::Keypair::from_secret_key(&secp256k1::Secp256k1::new(), &subscriber.secret_key);
        let result = build_and_broadcast_genesis(
            GenesisParams {
                subscriber_keypair: &keypair,
                subscriber_pkh: subscriber.pkh,
                subscriber_address: &subscriber.address,
                contract_token_address: &subscriber.address,
                genesis_commitment_hex: keys::build_nft_commitment(0, 20_000),
                deposit_sats: Sats::new(10_000),
            },
            &adapter,
        )
        .await
        .unwrap();
        assert_eq!(result.token_category, "11".repeat(32));
        assert_eq!(adapter.broadcasts().len(), 1);
    }

    #[tokio::test]
    async fn missing_funding_utxo_fails() {
        let adapter = MockChainAdapter::new();
        let subscriber = generate_keypair(Network::Chipnet);
        let keypair = secp256k1::Keypair::from_secret_key(&secp256k1::Secp256k1::new(), &subscriber.secret_key);
        let err = build_and_broadcast_genesis(
            GenesisParams {
                subscriber_keypair: &keypair,
                subscriber_pkh: subscriber.pkh,
                subscriber_address: &subscriber.address,
                contract_token_address: &subscriber.address,
                genesis_commitment_hex: keys::build_nft_commitment(0, 20_000),
                deposit_sats: Sats::new(10_000),
            },
            &adapter,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, GenesisError::NoFundingUtxo(_)));
    }
}
