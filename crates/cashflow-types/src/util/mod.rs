//! Helper types shared across CashFlow402 crates.
//!
//! - [`b64`] - base64 encoding/decoding utilities

pub mod b64;

pub use b64::*;
