//! Per-call Gate (`spec.md` §4.10).
//!
//! Challenges unauthenticated requests with a `402` BIP-21 payment URI,
//! then exchanges a confirmed on-chain payment for a short-lived
//! per-call token via [`verify_payment`].

use crate::response::{build_bip21_uri, GateError, PaymentChallengeBody};
use crate::state::GateState;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum_core::response::{IntoResponse, Response};
use cashflow_core::token::TokenPayload;
use cashflow_core::verify;
use cashflow_types::{Sats, UnixTimestamp};
use std::sync::Arc;
use uuid::Uuid;

/// Attached to the request extensions once a valid per-call token has
/// been presented, so downstream handlers can read the paid-for `txid`.
#[derive(Debug, Clone)]
pub struct PercallContext {
    pub txid: String,
    pub amount_sats: Sats,
}

fn extract_bearer(req: &Request) -> Option<String> {
    if let Some(value) = req.headers().get(http::header::AUTHORIZATION) {
        if let Ok(s) = value.to_str() {
            if let Some(token) = s.strip_prefix("Bearer ") {
                return Some(token.to_string());
            }
        }
    }
    req.headers()
        .get("X-Payment-Token")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

/// Axum middleware implementing the Per-call Gate (`spec.md` §4.10).
pub async fn percall_gate(
    State(state): State<Arc<GateState>>,
    mut req: Request,
    next: Next,
) -> Response {
    if let Some(token) = extract_bearer(&req) {
        match state.tokens.verify(&token) {
            Ok(TokenPayload::Percall { txid, amount_sats, .. }) => {
                let amount_sats = amount_sats.parse::<u64>().unwrap_or(0);
                req.extensions_mut().insert(PercallContext {
                    txid,
                    amount_sats: Sats::new(amount_sats),
                });
                return next.run(req).await;
            }
            Ok(TokenPayload::Subscription { .. }) => {
                return GateError::BadRequest("a subscription token cannot gate a per-call route".into())
                    .into_response();
            }
            Err(_) => {}
        }
    }

    let path = req.uri().path().to_string();
    let amount_sats = state.config.default_percall_rate_sats;
    let nonce_record = state
        .nonces
        .issue(state.config.merchant_address.clone(), amount_sats, path);

    let payment_uri = build_bip21_uri(
        &state.config.merchant_address,
        amount_sats,
        "CashFlow402",
        "per-call payment",
        None,
        Some(&nonce_record.nonce.to_string()),
    );

    PaymentChallengeBody {
        payment_uri,
        amount_sats,
        merchant_address: state.config.merchant_address.clone(),
        nonce: nonce_record.nonce.to_string(),
        verify_url: state.config.verify_url.clone(),
        expires_at: nonce_record.expires_at,
        instructions: vec![
            "Pay the exact amountSats to merchantAddress.".to_string(),
            "POST the resulting txid and nonce to verifyUrl.".to_string(),
            "Retry the original request with the returned token as a Bearer credential.".to_string(),
        ],
    }
    .into_response()
}

pub struct VerifyPaymentOutcome {
    pub token: String,
    pub expires_at: UnixTimestamp,
}

/// `verifyPayment({txid, nonce})` (`spec.md` §4.10): consumes the nonce,
/// confirms the payment on-chain, and mints a per-call token.
pub async fn verify_payment(
    state: &GateState,
    txid: &str,
    nonce: Uuid,
) -> Result<VerifyPaymentOutcome, GateError> {
    let nonce_record = state
        .nonces
        .consume(nonce)
        .ok_or_else(|| GateError::BadRequest("nonce is invalid, expired, or already consumed".into()))?;

    let verification = verify::verify_per_call(
        state.chain.as_ref(),
        txid,
        &nonce_record.merchant_address,
        nonce_record.amount_sats,
    )
    .await
    .map_err(|e| GateError::PaymentRequired(format!("payment not verified: {e}")))?;

    let token = state
        .tokens
        .sign_percall(txid.to_string(), verification.amount_sats.as_u64(), nonce.to_string())
        .map_err(|e| GateError::ServerError(e.to_string()))?;

    Ok(VerifyPaymentOutcome {
        token,
        expires_at: UnixTimestamp::now() + cashflow_core::token::PERCALL_TOKEN_EXPIRY_SECONDS,
    })
}
