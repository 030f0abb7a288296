//! Tagged verbose-transaction types returned by the Electrum-protocol chain adapter.
//!
//! `spec.md` §9 ("Dynamic JSON typing → tagged variants") calls for modeling
//! a verbose transaction's outputs as a sum type over a plain output and a
//! CashToken-carrying output, rejecting anything that doesn't fit either
//! shape, rather than threading `Option<Option<...>>` through the verifier.

use crate::Sats;
use serde::{Deserialize, Serialize};

/// NFT capability of a CashToken output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NftCapability {
    None,
    Mutable,
    Minting,
}

/// The non-fungible component of a CashToken output, if present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NftData {
    pub capability: NftCapability,
    /// Hex-encoded commitment bytes (empty string if no commitment).
    pub commitment: String,
}

/// The token_data field of a verbose transaction output, when present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenData {
    /// Genesis txid, hex, in display order.
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nft: Option<NftData>,
}

/// A single output of a verbose transaction, tagged by whether it carries
/// a CashToken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerboseTxOutput {
    Plain {
        locking_bytecode_hex: String,
        value: Sats,
    },
    Token {
        locking_bytecode_hex: String,
        value: Sats,
        token_data: TokenData,
    },
}

impl VerboseTxOutput {
    pub fn locking_bytecode_hex(&self) -> &str {
        match self {
            VerboseTxOutput::Plain {
                locking_bytecode_hex,
                ..
            } => locking_bytecode_hex,
            VerboseTxOutput::Token {
                locking_bytecode_hex,
                ..
            } => locking_bytecode_hex,
        }
    }

    pub fn value(&self) -> Sats {
        match self {
            VerboseTxOutput::Plain { value, .. } => *value,
            VerboseTxOutput::Token { value, .. } => *value,
        }
    }

    pub fn token_data(&self) -> Option<&TokenData> {
        match self {
            VerboseTxOutput::Plain { .. } => None,
            VerboseTxOutput::Token { token_data, .. } => Some(token_data),
        }
    }
}

/// A verbose transaction as returned by `blockchain.transaction.get` (verbose=true).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerboseTx {
    pub txid: String,
    pub outputs: Vec<VerboseTxOutput>,
    pub confirmations: Option<u32>,
}
