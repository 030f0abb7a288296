//! Subscription Gate / Router402 (`spec.md` §4.11).
//!
//! Resolves the caller's subscription from its `tokenCategory`, debits
//! the call's cost against the subscription's balance via the
//! [`cashflow_core::usage::UsageMeter`], and — once the category's
//! `pendingSats` crosses the JIT threshold — triggers an inline
//! [`cashflow_core::settlement::SettlementOrchestrator::claim`] before
//! the response is sent.

use crate::response::GateError;
use crate::state::GateState;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum_core::response::{IntoResponse, Response};
use cashflow_core::model::{PlanStatus, SubscriptionStatus};
use cashflow_core::plans::PlanRegistry;
use cashflow_core::token::TokenPayload;
use cashflow_core::usage::RecordUsageInput;
use cashflow_types::Sats;
use std::sync::Arc;
use uuid::Uuid;

/// Attached to the request extensions once a call has been admitted, so
/// downstream handlers can read the resolved subscription context.
#[derive(Debug, Clone)]
pub struct SubscriptionContext {
    pub contract_address: String,
    pub token_category: String,
    pub cost_sats: Sats,
    pub remaining_balance: Sats,
}

/// Category extraction precedence (`spec.md` §4.11): a verified
/// subscription token (`Authorization: Bearer` or `X-Subscription-Token`)
/// wins over the unauthenticated `tokenCategory` query parameter, which
/// exists only so a merchant can smoke-test a route without minting a
/// token first.
fn extract_token_category(state: &GateState, req: &Request) -> Option<String> {
    let bearer = req
        .headers()
        .get(http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.to_string())
        .or_else(|| {
            req.headers()
                .get("X-Subscription-Token")
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string())
        });

    if let Some(token) = bearer {
        if let Ok(TokenPayload::Subscription { token_category, .. }) = state.tokens.verify(&token) {
            return Some(token_category);
        }
        return None;
    }

    req.uri().query().and_then(|q| {
        q.split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(k, _)| *k == "tokenCategory")
            .map(|(_, v)| v.to_string())
    })
}

fn request_id(req: &Request) -> Option<String> {
    req.headers()
        .get("X-Request-Id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

/// Axum middleware implementing the Subscription Gate (`spec.md` §4.11).
pub async fn subscription_gate(
    State(state): State<Arc<GateState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(token_category) = extract_token_category(&state, &req) else {
        return GateError::PaymentRequired(
            "missing or invalid subscription credential (Authorization: Bearer, X-Subscription-Token, or ?tokenCategory=)".into(),
        )
        .into_response();
    };

    let Some(record) = state.store.get_by_category(&token_category).await else {
        return GateError::PaymentRequired(format!("unknown token category {token_category}")).into_response();
    };

    if record.status != SubscriptionStatus::Active {
        return GateError::PaymentRequired(format!(
            "subscription is {:?}; fund it via /deploy-subscription or /subscription/auto-fund before retrying",
            record.status
        ))
        .into_response();
    }

    let path = req.uri().path();
    let plan = match record.plan_id.as_deref() {
        Some(plan_id) => match Uuid::parse_str(plan_id).ok().and_then(|id| state.plans.get(id)) {
            Some(plan) => Some(plan),
            None => return GateError::ServerError("subscription references an unknown plan".into()).into_response(),
        },
        None => None,
    };

    if let Some(plan) = &plan {
        if plan.status != PlanStatus::Active {
            return GateError::Conflict(format!("plan {:?} is {:?}, not active", plan.plan_id, plan.status)).into_response();
        }
        if !PlanRegistry::is_path_allowed(plan, path) {
            return GateError::Forbidden(format!("path {path} is not covered by this subscription's plan")).into_response();
        }
    }

    let cost_sats = plan
        .as_ref()
        .map(|p| p.per_call_sats)
        .unwrap_or(state.config.default_percall_rate_sats);

    let outcome = state
        .usage
        .record_usage(RecordUsageInput {
            token_category: token_category.clone(),
            contract_address: record.contract_address.clone(),
            current_balance: record.balance,
            cost_sats,
            api_path: path.to_string(),
            request_id: request_id(&req),
        })
        .await;

    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(e) => {
            return GateError::PaymentRequired(format!(
                "subscription balance exhausted: {e}; top up via /subscription/auto-fund or wait for the next claim interval"
            ))
            .into_response();
        }
    };

    req.extensions_mut().insert(SubscriptionContext {
        contract_address: record.contract_address.clone(),
        token_category: token_category.clone(),
        cost_sats,
        remaining_balance: outcome.remaining_balance,
    });

    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    insert_header(headers, "X-Subscription-Cost-Sats", cost_sats.as_u64().to_string());
    insert_header(headers, "X-Subscription-Balance-Sats", outcome.remaining_balance.as_u64().to_string());
    insert_header(headers, "X-Subscription-Pending-Sats", outcome.pending_sats.as_u64().to_string());
    insert_header(headers, "X-Subscription-Token-Category", token_category.clone());

    if outcome.pending_sats.as_u64() >= state.config.jit_threshold_sats.as_u64() {
        match state.settlement.claim(&record.contract_address).await {
            Ok(result) => insert_header(response.headers_mut(), "X-Claim-Txid", result.txid),
            Err(e) => tracing::warn!(
                contract_address = %record.contract_address,
                error = %e,
                "just-in-time settlement claim failed"
            ),
        }
    }

    response
}

fn insert_header(headers: &mut http::HeaderMap, name: &'static str, value: String) {
    if let Ok(value) = http::HeaderValue::from_str(&value) {
        headers.insert(name, value);
    }
}
