//! Manual per-call challenge and verification routes (`spec.md` §4.10, §6).
//!
//! These give a client a way to obtain a challenge and redeem a payment
//! without first hitting a protected route; `cashflow_gate::percall_gate`
//! handles the same flow inline for requests to a protected route.

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::Json;
use cashflow_gate::response::{build_bip21_uri, PaymentChallengeBody};
use cashflow_gate::verify_payment;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

pub async fn challenge(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<PaymentChallengeBody> {
    let path = query
        .get("path")
        .cloned()
        .unwrap_or_else(|| "/premium".to_string());
    let amount_sats = state.gate.config.default_percall_rate_sats;
    let nonce_record = state
        .gate
        .nonces
        .issue(state.gate.config.merchant_address.clone(), amount_sats, path);

    let payment_uri = build_bip21_uri(
        &state.gate.config.merchant_address,
        amount_sats,
        "CashFlow402",
        "per-call payment",
        None,
        Some(&nonce_record.nonce.to_string()),
    );

    Json(PaymentChallengeBody {
        payment_uri,
        amount_sats,
        merchant_address: state.gate.config.merchant_address.clone(),
        nonce: nonce_record.nonce.to_string(),
        verify_url: state.gate.config.verify_url.clone(),
        expires_at: nonce_record.expires_at,
        instructions: vec![
            "Pay the exact amountSats to merchantAddress.".to_string(),
            "POST the resulting txid and nonce to verifyUrl.".to_string(),
            "Retry the original request with the returned token as a Bearer credential.".to_string(),
        ],
    })
}

#[derive(Debug, Deserialize)]
pub struct VerifyPaymentRequest {
    pub txid: String,
    pub nonce: Uuid,
}

pub async fn verify_payment_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<VerifyPaymentRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let outcome = verify_payment(&state.gate, &body.txid, body.nonce).await?;
    Ok(Json(serde_json::json!({
        "accessToken": outcome.token,
        "expiresAt": outcome.expires_at,
    })))
}
