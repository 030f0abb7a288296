//! CashFlow402 Gateway HTTP entrypoint.
//!
//! This binary launches an Axum-based HTTP server that exposes the
//! CashFlow402 payment gates over Bitcoin Cash: per-call micropayments
//! and subscription covenants.
//!
//! Endpoints:
//! - `POST /deploy-subscription`, `/subscription/*` – subscription lifecycle
//! - `GET /payment/challenge`, `POST /verify-payment` – per-call micropayments
//! - `POST /merchant/*` – plan and dashboard management
//! - `POST /webhook/*` – chain-event notifications
//!
//! This server includes:
//! - `tower_http::trace::TraceLayer` request/response tracing
//! - CORS support for cross-origin clients
//! - An Electrum-protocol connection to a BCH full node
//!
//! Environment:
//! - `.env` values loaded at startup
//! - `HOST`, `PORT` control the bind address
//! - `ELECTRUM_HOST`, `ELECTRUM_PORT`, `ELECTRUM_PROTOCOL` control the chain connection

use std::process;

use cashflow_gateway::run;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{e}");
        process::exit(1);
    }
}
