//! Webhook routes for chain-event notifications (`spec.md` §6).
//!
//! Authenticated with a shared secret header when `WEBHOOK_SECRET` is
//! configured; a deployment without one leaves the routes open, matching
//! `merchant_address`/`jwt_secret` being the only hard requirements.

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

fn check_secret(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(expected) = &state.config.webhook_secret else {
        return Ok(());
    };
    let provided = headers
        .get("X-Webhook-Secret")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if provided != expected {
        return Err(ApiError::Unauthorized("invalid webhook secret".into()));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxConfirmedPayload {
    pub contract_address: String,
    pub txid: String,
    pub confirmations: u32,
}

pub async fn tx_confirmed(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<TxConfirmedPayload>,
) -> Result<Json<serde_json::Value>, ApiError> {
    check_secret(&state, &headers)?;
    info!(
        contract_address = %payload.contract_address,
        txid = %payload.txid,
        confirmations = payload.confirmations,
        "tx-confirmed webhook received"
    );
    Ok(Json(serde_json::json!({ "acknowledged": true })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockPayload {
    pub height: u64,
    pub hash: String,
}

pub async fn block(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<BlockPayload>,
) -> Result<Json<serde_json::Value>, ApiError> {
    check_secret(&state, &headers)?;
    info!(height = payload.height, hash = %payload.hash, "new block webhook received");
    Ok(Json(serde_json::json!({ "acknowledged": true })))
}
