//! Small helpers shared across `cashflow-core`.
//!
//! - [`sig_down`] - graceful shutdown signal handling

pub mod sig_down;

pub use sig_down::*;
