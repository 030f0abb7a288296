//! Example protected resources demonstrating both gates end to end.
//! A real deployment replaces these with the merchant's own API; the
//! gates themselves are generic Axum middleware (`cashflow-gate`).

use axum::extract::Extension;
use axum::Json;
use cashflow_gate::{PercallContext, SubscriptionContext};
use serde_json::json;

pub async fn subscription_protected(Extension(ctx): Extension<SubscriptionContext>) -> Json<serde_json::Value> {
    Json(json!({
        "message": "paid content",
        "tokenCategory": ctx.token_category,
        "costSats": ctx.cost_sats.as_u64(),
        "remainingBalance": ctx.remaining_balance.as_u64(),
    }))
}

pub async fn percall_protected(Extension(ctx): Extension<PercallContext>) -> Json<serde_json::Value> {
    Json(json!({
        "message": "paid content",
        "txid": ctx.txid,
        "amountSats": ctx.amount_sats.as_u64(),
    }))
}
