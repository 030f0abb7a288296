//! CashFlow402 Gateway Server
//!
//! - Loads `.env` variables and CLI configuration.
//! - Connects to an Electrum-protocol BCH node (or an in-memory mock
//!   behind the `mock-chain` feature, for local demos).
//! - Loads the subscription store, usage meter, plan registry, and nonce
//!   store, then starts an Axum HTTP server with the gate middleware
//!   wired over every protected route.
//!
//! Binds to the address specified by `--host`/`--port` (or `HOST`/`PORT`).

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::Method;
use cashflow_core::chain::electrum::{ElectrumChainAdapter, ElectrumConfig};
use cashflow_core::chain::ChainAdapter;
use cashflow_core::keys;
use cashflow_core::nonce::NonceStore;
use cashflow_core::plans::PlanRegistry;
use cashflow_core::settlement::SettlementOrchestrator;
use cashflow_core::store::SubscriptionStore;
use cashflow_core::token::TokenSigner;
use cashflow_core::usage::UsageMeter;
use cashflow_core::util::SigDown;
use cashflow_gate::{GateConfig, GateState};
use clap::Parser;
use dotenvy::dotenv;
use secp256k1::{Keypair, Secp256k1};
use tower_http::cors;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::handlers;
use crate::state::AppState;

fn build_chain_adapter(config: &Config) -> Arc<dyn ChainAdapter> {
    #[cfg(feature = "mock-chain")]
    {
        if config.bch_network == "mock" {
            return Arc::new(cashflow_core::chain::mock::MockChainAdapter::new());
        }
    }
    Arc::new(ElectrumChainAdapter::new(ElectrumConfig {
        host: config.electrum_host.clone(),
        port: config.electrum_port,
        use_tls: config.electrum_protocol != "tcp",
    }))
}

/// Initializes the CashFlow402 gateway server.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    #[cfg(feature = "telemetry")]
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::parse();
    tokio::fs::create_dir_all(&config.data_dir).await?;

    let merchant_generated = keys::wif_to_keypair(&config.merchant_wif)?;
    let secp = Secp256k1::new();
    let merchant_keypair = Keypair::from_secret_key(&secp, &merchant_generated.secret_key);

    let chain = build_chain_adapter(&config);
    let store = Arc::new(SubscriptionStore::load(config.subscriptions_path()).await?);
    let usage = Arc::new(UsageMeter::load(config.usage_path()).await?);
    let plans = Arc::new(PlanRegistry::new());
    let nonces = Arc::new(NonceStore::new());
    let tokens = Arc::new(TokenSigner::new(config.jwt_secret.clone().into_bytes()));
    let settlement = Arc::new(SettlementOrchestrator::new(
        store.clone(),
        usage.clone(),
        chain.clone(),
        merchant_keypair,
    ));

    let gate = Arc::new(GateState {
        config: GateConfig {
            merchant_address: config.merchant_address.clone(),
            default_percall_rate_sats: config.default_percall_rate(),
            verify_url: config.verify_url_base.clone(),
            jit_threshold_sats: config.jit_threshold(),
        },
        nonces,
        tokens,
        usage,
        store,
        plans,
        chain,
        settlement,
    });

    let app_state = Arc::new(AppState {
        gate,
        config: Arc::new(config.clone()),
        merchant_keypair,
    });

    let http_endpoints = handlers::routes(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(
            cors::CorsLayer::new()
                .allow_origin(cors::Any)
                .allow_methods([Method::GET, Method::POST, Method::PATCH])
                .allow_headers(cors::Any),
        );

    let addr = SocketAddr::new(config.host, config.port);
    tracing::info!("starting CashFlow402 gateway at http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .inspect_err(|e| tracing::error!("failed to bind to {addr}: {e}"))?;

    let sig_down = SigDown::try_new()?;
    let cancellation_token = sig_down.cancellation_token();
    let graceful_shutdown = async move { cancellation_token.cancelled().await };

    axum::serve(listener, http_endpoints)
        .with_graceful_shutdown(graceful_shutdown)
        .await?;

    Ok(())
}
