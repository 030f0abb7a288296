//! HTTP route table (`spec.md` §6).

pub mod demo;
pub mod merchant;
pub mod percall;
pub mod subscription;
pub mod webhook;

use crate::state::AppState;
use axum::extract::{Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, patch, post};
use axum::Router;
use cashflow_gate::{percall_gate, subscription_gate};
use std::sync::Arc;
use uuid::Uuid;

/// Stamps every request and response with a fresh `X-Request-Id`
/// (`spec.md` §7).
async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    req.extensions_mut().insert(RequestId(request_id.clone()));
    let mut response = next.run(req).await;
    if let Ok(value) = http::HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("X-Request-Id", value);
    }
    response
}

#[derive(Debug, Clone)]
pub struct RequestId(pub String);

pub fn routes(state: Arc<AppState>) -> Router {
    let gate_state = state.gate.clone();

    let merchant_routes = Router::new()
        .route("/merchant/plan", post(merchant::create_plan))
        .route("/merchant/plans", get(merchant::list_plans))
        .route("/merchant/plans/{id}", get(merchant::get_plan))
        .route("/merchant/plans/{id}", patch(merchant::patch_plan))
        .route("/merchant/dashboard", get(merchant::dashboard))
        .route("/merchant/claim-all", post(merchant::claim_all));

    let subscription_routes = Router::new()
        .route("/deploy-subscription", post(subscription::deploy_subscription))
        .route("/subscription/create-session", post(subscription::create_session))
        .route("/subscription/auto-fund", post(subscription::auto_fund))
        .route("/subscription/fund-confirm", post(subscription::fund_confirm))
        .route("/subscription/status/{addr}", get(subscription::status))
        .route("/subscription/list", get(subscription::list))
        .route("/subscription/verify", get(subscription::verify))
        .route("/subscription/claim", post(subscription::claim))
        .route("/subscription/cancel", post(subscription::cancel));

    let percall_routes = Router::new()
        .route("/payment/challenge", get(percall::challenge))
        .route("/verify-payment", post(percall::verify_payment_handler));

    let webhook_routes = Router::new()
        .route("/webhook/tx-confirmed", post(webhook::tx_confirmed))
        .route("/webhook/block", post(webhook::block));

    let subscription_protected = Router::new()
        .route("/api/{*path}", get(demo::subscription_protected))
        .layer(middleware::from_fn_with_state(gate_state.clone(), subscription_gate));

    let percall_protected = Router::new()
        .route("/premium/{*path}", get(demo::percall_protected))
        .layer(middleware::from_fn_with_state(gate_state, percall_gate));

    let demo_routes = Router::new()
        .merge(subscription_protected)
        .merge(percall_protected);

    Router::new()
        .merge(merchant_routes)
        .merge(subscription_routes)
        .merge(percall_routes)
        .merge(webhook_routes)
        .merge(demo_routes)
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}
