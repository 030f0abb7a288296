//! Transaction Builder (`spec.md` §4.3).
//!
//! Assembles a v2 BCH transaction with explicit inputs, outputs, and
//! optional CashToken output prefixes, signs with Schnorr under the
//! BIP143-style `SIGHASH_ALL|FORKID` preimage, and serializes to raw hex.
//!
//! Grounded on `spec.md` §4.3's byte-for-byte description; the teacher's
//! per-chain crates (`alloy`, `solana-*`) do the equivalent "assemble +
//! sign + serialize" job for their own chains via chain-native SDKs. BCH
//! has no maintained SDK at that tier, so this module hand-rolls consensus
//! encoding the same way the teacher hand-rolls `Base64Bytes`.

use crate::error::TxBuilderError;
use crate::keys::hash256;
use cashflow_types::Sats;
use secp256k1::{Keypair, Message, Secp256k1};

pub const SIGHASH_ALL_FORKID: u32 = 0x41;

/// HAS_NFT | MUTABLE bits from `spec.md` §4.3's bitfield formula.
const BITFIELD_HAS_NFT: u8 = 0x02;
const BITFIELD_MUTABLE: u8 = 0x10;
const BITFIELD_HAS_COMMITMENT: u8 = 0x40;

#[derive(Debug, Clone)]
pub struct Outpoint {
    /// Display-order (big-endian-as-printed) txid hex.
    pub txid: String,
    pub vout: u32,
}

#[derive(Debug, Clone)]
pub struct TxInput {
    pub outpoint: Outpoint,
    pub sequence: u32,
    pub value: Sats,
    /// Locking bytecode of the UTXO being spent — the `scriptCode` for sighashing.
    pub prevout_script: Vec<u8>,
    /// Filled in after signing.
    pub unlocking_script: Vec<u8>,
}

/// A CashToken prefix attached ahead of a locking bytecode, as specified
/// in `spec.md` §4.3: `0xEF || category_LE(32) || bitfield || varint(len) || commitment`.
#[derive(Debug, Clone)]
pub struct CashTokenPrefix {
    pub category_txid_display_order: String,
    pub commitment_hex: Option<String>,
}

impl CashTokenPrefix {
    pub fn mutable_nft(category_txid_display_order: String, commitment_hex: Option<String>) -> Self {
        CashTokenPrefix {
            category_txid_display_order,
            commitment_hex,
        }
    }

    pub fn bitfield(&self) -> u8 {
        BITFIELD_HAS_NFT
            | BITFIELD_MUTABLE
            | if self.commitment_hex.is_some() {
                BITFIELD_HAS_COMMITMENT
            } else {
                0
            }
    }

    pub fn serialize(&self) -> Result<Vec<u8>, TxBuilderError> {
        let mut category = hex::decode(&self.category_txid_display_order)
            .map_err(|_| TxBuilderError::InvalidOutpoint)?;
        if category.len() != 32 {
            return Err(TxBuilderError::InvalidOutpoint);
        }
        category.reverse(); // display order -> internal little-endian order
        let mut out = Vec::with_capacity(35);
        out.push(0xEF);
        out.extend_from_slice(&category);
        out.push(self.bitfield());
        if let Some(commitment_hex) = &self.commitment_hex {
            let commitment =
                hex::decode(commitment_hex).map_err(|_| TxBuilderError::InvalidOutpoint)?;
            out.extend_from_slice(&encode_var_int(commitment.len() as u64));
            out.extend_from_slice(&commitment);
        } else {
            out.extend_from_slice(&encode_var_int(0));
        }
        Ok(out)
    }
}

#[derive(Debug, Clone)]
pub struct TxOutput {
    pub value: Sats,
    pub token_prefix: Option<CashTokenPrefix>,
    pub locking_bytecode: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct UnsignedTransaction {
    pub version: i32,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    pub locktime: u32,
}

pub fn encode_var_int(n: u64) -> Vec<u8> {
    if n < 0xfd {
        vec![n as u8]
    } else if n <= 0xffff {
        let mut v = vec![0xfd];
        v.extend_from_slice(&(n as u16).to_le_bytes());
        v
    } else if n <= 0xffff_ffff {
        let mut v = vec![0xfe];
        v.extend_from_slice(&(n as u32).to_le_bytes());
        v
    } else {
        let mut v = vec![0xff];
        v.extend_from_slice(&n.to_le_bytes());
        v
    }
}

fn txid_internal_order(display_order_hex: &str) -> Result<[u8; 32], TxBuilderError> {
    let mut bytes = hex::decode(display_order_hex).map_err(|_| TxBuilderError::InvalidOutpoint)?;
    if bytes.len() != 32 {
        return Err(TxBuilderError::InvalidOutpoint);
    }
    bytes.reverse();
    let mut out = [0u8; 32];
    out.copy_from_slice(&bytes);
    Ok(out)
}

fn serialize_outpoint(outpoint: &Outpoint) -> Result<Vec<u8>, TxBuilderError> {
    let mut buf = Vec::with_capacity(36);
    buf.extend_from_slice(&txid_internal_order(&outpoint.txid)?);
    buf.extend_from_slice(&outpoint.vout.to_le_bytes());
    Ok(buf)
}

fn serialize_output(output: &TxOutput) -> Result<Vec<u8>, TxBuilderError> {
    let mut script = Vec::new();
    if let Some(prefix) = &output.token_prefix {
        script.extend_from_slice(&prefix.serialize()?);
    }
    script.extend_from_slice(&output.locking_bytecode);

    let mut buf = Vec::with_capacity(8 + 9 + script.len());
    buf.extend_from_slice(&output.value.as_u64().to_le_bytes());
    buf.extend_from_slice(&encode_var_int(script.len() as u64));
    buf.extend_from_slice(&script);
    Ok(buf)
}

impl UnsignedTransaction {
    fn hash_prevouts(&self) -> Result<[u8; 32], TxBuilderError> {
        let mut buf = Vec::new();
        for input in &self.inputs {
            buf.extend_from_slice(&serialize_outpoint(&input.outpoint)?);
        }
        Ok(hash256(&buf))
    }

    fn hash_sequence(&self) -> [u8; 32] {
        let mut buf = Vec::new();
        for input in &self.inputs {
            buf.extend_from_slice(&input.sequence.to_le_bytes());
        }
        hash256(&buf)
    }

    fn hash_outputs(&self) -> Result<[u8; 32], TxBuilderError> {
        let mut buf = Vec::new();
        for output in &self.outputs {
            buf.extend_from_slice(&serialize_output(output)?);
        }
        Ok(hash256(&buf))
    }

    /// Builds the BIP143-style BCH sighash preimage for input `index`.
    pub fn sighash_preimage(&self, index: usize) -> Result<Vec<u8>, TxBuilderError> {
        let input = self.inputs.get(index).ok_or(TxBuilderError::InvalidOutpoint)?;
        let mut buf = Vec::new();
        buf.extend_from_slice(&self.version.to_le_bytes());
        buf.extend_from_slice(&self.hash_prevouts()?);
        buf.extend_from_slice(&self.hash_sequence());
        buf.extend_from_slice(&serialize_outpoint(&input.outpoint)?);
        buf.extend_from_slice(&encode_var_int(input.prevout_script.len() as u64));
        buf.extend_from_slice(&input.prevout_script);
        buf.extend_from_slice(&input.value.as_u64().to_le_bytes());
        buf.extend_from_slice(&input.sequence.to_le_bytes());
        buf.extend_from_slice(&self.hash_outputs()?);
        buf.extend_from_slice(&self.locktime.to_le_bytes());
        buf.extend_from_slice(&SIGHASH_ALL_FORKID.to_le_bytes());
        Ok(buf)
    }

    pub fn sighash(&self, index: usize) -> Result<[u8; 32], TxBuilderError> {
        Ok(hash256(&self.sighash_preimage(index)?))
    }

    /// Signs input `index` with Schnorr and installs the standard P2PKH
    /// unlocking script `<sig||sighashType> <pubkey>`.
    pub fn sign_p2pkh_input(
        &mut self,
        index: usize,
        keypair: &Keypair,
    ) -> Result<(), TxBuilderError> {
        let sighash = self.sighash(index)?;
        let secp = Secp256k1::new();
        let message = Message::from_digest(sighash);
        let signature = secp.sign_schnorr(&message, keypair);
        let mut sig_with_type = signature.as_ref().to_vec();
        sig_with_type.push(SIGHASH_ALL_FORKID as u8);

        let pubkey = keypair.public_key().serialize();
        let mut script = Vec::with_capacity(1 + sig_with_type.len() + 1 + pubkey.len());
        script.push(sig_with_type.len() as u8);
        script.extend_from_slice(&sig_with_type);
        script.push(pubkey.len() as u8);
        script.extend_from_slice(&pubkey);

        let input = self
            .inputs
            .get_mut(index)
            .ok_or(TxBuilderError::InvalidOutpoint)?;
        input.unlocking_script = script;
        Ok(())
    }

    /// Installs a covenant unlocking script built by the covenant layer.
    pub fn set_unlocking_script(&mut self, index: usize, script: Vec<u8>) {
        if let Some(input) = self.inputs.get_mut(index) {
            input.unlocking_script = script;
        }
    }

    /// Serializes the fully-signed transaction to raw bytes.
    pub fn serialize(&self) -> Result<Vec<u8>, TxBuilderError> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&self.version.to_le_bytes());
        buf.extend_from_slice(&encode_var_int(self.inputs.len() as u64));
        for input in &self.inputs {
            buf.extend_from_slice(&serialize_outpoint(&input.outpoint)?);
            buf.extend_from_slice(&encode_var_int(input.unlocking_script.len() as u64));
            buf.extend_from_slice(&input.unlocking_script);
            buf.extend_from_slice(&input.sequence.to_le_bytes());
        }
        buf.extend_from_slice(&encode_var_int(self.outputs.len() as u64));
        for output in &self.outputs {
            buf.extend_from_slice(&serialize_output(output)?);
        }
        buf.extend_from_slice(&self.locktime.to_le_bytes());
        Ok(buf)
    }

    pub fn serialize_hex(&self) -> Result<String, TxBuilderError> {
        Ok(hex::encode(self.serialize()?))
    }

    /// The eventual txid: hash256 of the serialized transaction, display order.
    pub fn txid(&self) -> Result<String, TxBuilderError> {
        let mut digest = hash256(&self.serialize()?).to_vec();
        digest.reverse();
        Ok(hex::encode(digest))
    }

    pub fn total_input_value(&self) -> u64 {
        self.inputs.iter().map(|i| i.value.as_u64()).sum()
    }

    pub fn total_output_value(&self) -> u64 {
        self.outputs.iter().map(|o| o.value.as_u64()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_input() -> TxInput {
        TxInput {
            outpoint: Outpoint {
                txid: "00".repeat(32),
                vout: 0,
            },
            sequence: 0xffff_ffff,
            value: Sats::new(10_000),
            prevout_script: vec![0x76, 0xa9],
            unlocking_script: Vec::new(),
        }
    }

    #[test]
    fn token_prefix_bitfield_matches_spec_formula() {
        let with_commitment =
            CashTokenPrefix::mutable_nft("11".repeat(32), Some("aabbccdd00112233".into()));
        assert_eq!(with_commitment.bitfield(), 0x02 | 0x10 | 0x40);

        let without_commitment = CashTokenPrefix::mutable_nft("11".repeat(32), None);
        assert_eq!(without_commitment.bitfield(), 0x02 | 0x10);
    }

    #[test]
    fn sighash_is_deterministic_for_identical_transactions() {
        let tx = UnsignedTransaction {
            version: 2,
            inputs: vec![sample_input()],
            outputs: vec![TxOutput {
                value: Sats::new(9_000),
                token_prefix: None,
                locking_bytecode: vec![0x76, 0xa9, 0x88, 0xac],
            }],
            locktime: 0,
        };
        let a = tx.sighash(0).unwrap();
        let b = tx.sighash(0).unwrap();
        assert_eq!(a, b);
    }
}
