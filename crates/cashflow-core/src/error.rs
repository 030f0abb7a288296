//! Per-component error enums for `cashflow-core` (`spec.md` §4.1-§4.14).

use crate::chain::ChainAdapterError;
use cashflow_types::ErrorKind;

impl ChainAdapterError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ChainAdapterError::NotFound => ErrorKind::NotFound,
            _ => ErrorKind::ServerError,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    #[error("invalid WIF: {0}")]
    InvalidWif(String),
    #[error("invalid NFT commitment: {0}")]
    InvalidCommitment(String),
}

#[derive(Debug, thiserror::Error)]
pub enum TxBuilderError {
    #[error("insufficient funds: inputs cover {have} sats, need {need} sats")]
    InsufficientFunds { have: u64, need: u64 },
    #[error("invalid outpoint")]
    InvalidOutpoint,
    #[error("signing failed: {0}")]
    SignFailed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum CovenantError {
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error(transparent)]
    TxBuilder(#[from] TxBuilderError),
    #[error(transparent)]
    Chain(#[from] ChainAdapterError),
    #[error("interval not yet elapsed: next claim allowed at block {next_claim_after_block}")]
    IntervalNotElapsed { next_claim_after_block: u64 },
    #[error("claim of {requested} sats exceeds remaining authorized {remaining}")]
    ExceedsAuthorized { requested: u64, remaining: u64 },
    #[error("contract UTXO not found for {contract_address}")]
    ContractUtxoMissing { contract_address: String },
    #[error("broadcast failed: {0}")]
    BroadcastFailed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record not found for key {0}")]
    NotFound(String),
    #[error("duplicate key {0}")]
    Duplicate(String),
    #[error("io error persisting store: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum UsageError {
    #[error("balance exhausted: effective balance {effective} sats, call costs {cost} sats")]
    BalanceExhausted { effective: u64, cost: u64 },
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("chain lookup failed: {0}")]
    Chain(#[from] ChainAdapterError),
    #[error("no output pays the expected merchant address with sufficient value")]
    NoMatchingOutput,
    #[error("token category mismatch")]
    CategoryMismatch,
    #[error("NFT capability is not mutable")]
    NotMutableNft,
    #[error("output has no token data")]
    MissingTokenData,
    #[error("funding output value is below the minimum required")]
    InsufficientValue,
}

#[derive(Debug, thiserror::Error)]
pub enum SettlementError {
    #[error("subscription not active")]
    NotActive,
    #[error("nothing pending to settle")]
    NothingPending,
    #[error(transparent)]
    Covenant(#[from] CovenantError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Usage(#[from] UsageError),
}

#[derive(Debug, thiserror::Error)]
pub enum GenesisError {
    #[error(transparent)]
    Chain(#[from] ChainAdapterError),
    #[error(transparent)]
    TxBuilder(#[from] TxBuilderError),
    #[error("no spendable non-token UTXO found for {0}")]
    NoFundingUtxo(String),
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,
    #[error("signature mismatch")]
    BadSignature,
    #[error("token expired")]
    Expired,
}
