#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Subscription metering, covenant, and settlement core for the
//! CashFlow402 payment gateway.
//!
//! # Modules
//!
//! - [`chain`] - persistent Electrum-protocol connection (`ChainAdapter` trait)
//! - [`keys`] - secp256k1 + cash-address key/address utilities
//! - [`cashaddr`] - the CashAddr text-encoding codec
//! - [`tx`] - BCH transaction assembly, sighash, and signing
//! - [`covenant`] - deterministic subscription covenant instantiation and spends
//! - [`genesis`] - the genesis funding transaction builder
//! - [`model`] - persisted record types (subscription, usage, plan, nonce)
//! - [`store`] - durable subscription store
//! - [`usage`] - per-subscription usage metering
//! - [`plans`] - merchant plan registry
//! - [`nonce`] - in-memory single-use challenge nonces
//! - [`verify`] - on-chain payment/funding verification
//! - [`settlement`] - claim/claim-all/cancel orchestration
//! - [`token`] - HMAC-signed access tokens
//! - [`error`] - per-component error taxonomies
//! - [`util`] - graceful shutdown helper

pub mod cashaddr;
pub mod chain;
pub mod covenant;
pub mod error;
pub mod genesis;
pub mod keys;
pub mod model;
pub mod nonce;
pub mod plans;
pub mod settlement;
pub mod store;
pub mod token;
pub mod tx;
pub mod usage;
pub mod util;
pub mod verify;
