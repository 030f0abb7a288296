//! Shared data-model and wire types for the CashFlow402 payment gateway.
//!
//! This crate provides the foundational types used throughout CashFlow402
//! for implementing HTTP 402 Payment Required flows on Bitcoin Cash:
//!
//! - [`sats`] - arbitrary-precision-safe satoshi amount newtype
//! - [`timestamp`] - Unix timestamp type used by nonces and tokens
//! - [`pkh`] - 20-byte hash160 newtype used for merchant/subscriber identities
//! - [`chain`] - tagged verbose-transaction types returned by the chain adapter
//! - [`error`] - the stable error-kind taxonomy shared by every HTTP surface
//! - [`util`] - base64 helpers

pub mod chain;
pub mod error;
pub mod pkh;
pub mod sats;
pub mod timestamp;
pub mod util;

pub use chain::{TokenData, VerboseTx, VerboseTxOutput};
pub use error::ErrorKind;
pub use pkh::Pkh;
pub use sats::Sats;
pub use timestamp::UnixTimestamp;
