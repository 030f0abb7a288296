//! Shared state threaded through both gates via `axum::extract::State`.

use cashflow_core::chain::ChainAdapter;
use cashflow_core::nonce::NonceStore;
use cashflow_core::plans::PlanRegistry;
use cashflow_core::settlement::SettlementOrchestrator;
use cashflow_core::store::SubscriptionStore;
use cashflow_core::token::TokenSigner;
use cashflow_core::usage::UsageMeter;
use cashflow_types::Sats;
use std::sync::Arc;

/// Gate-wide configuration pulled from the gateway's config layer
/// (`spec.md` §4.10, §4.11).
pub struct GateConfig {
    pub merchant_address: String,
    pub default_percall_rate_sats: Sats,
    pub verify_url: String,
    pub jit_threshold_sats: Sats,
}

pub struct GateState {
    pub config: GateConfig,
    pub nonces: Arc<NonceStore>,
    pub tokens: Arc<TokenSigner>,
    pub usage: Arc<UsageMeter>,
    pub store: Arc<SubscriptionStore>,
    pub plans: Arc<PlanRegistry>,
    pub chain: Arc<dyn ChainAdapter>,
    pub settlement: Arc<SettlementOrchestrator>,
}
