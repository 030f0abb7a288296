//! Shared application state, composing the gate crate's [`GateState`]
//! with the merchant signing key and webhook secret.

use crate::config::Config;
use cashflow_gate::GateState;
use secp256k1::Keypair;
use std::sync::Arc;

pub struct AppState {
    pub gate: Arc<GateState>,
    pub config: Arc<Config>,
    pub merchant_keypair: Keypair,
}
