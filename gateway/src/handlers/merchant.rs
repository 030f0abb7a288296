//! Merchant management routes (`spec.md` §6): plans, dashboard, batch claim.

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use cashflow_core::model::{PlanRecord, PlanStatus};
use cashflow_core::plans::PlanPatch;
use cashflow_types::Sats;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePlanRequest {
    pub name: String,
    pub description: Option<String>,
    pub authorized_sats: u64,
    #[serde(default)]
    pub interval_blocks: Option<u32>,
    #[serde(default)]
    pub per_call_sats: Option<u64>,
    #[serde(default)]
    pub allowed_paths: Vec<String>,
}

pub async fn create_plan(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreatePlanRequest>,
) -> Result<(StatusCode, Json<PlanRecord>), ApiError> {
    if body.name.trim().is_empty() {
        return Err(ApiError::BadRequest("name is required".into()));
    }
    let plan = state.gate.plans.create(
        body.name,
        body.description,
        Sats::new(body.authorized_sats),
        body.interval_blocks.unwrap_or(state.config.default_interval_blocks),
        Sats::new(body.per_call_sats.unwrap_or(state.config.default_percall_rate_sats)),
        body.allowed_paths,
        state.config.merchant_address.clone(),
    );
    Ok((StatusCode::CREATED, Json(plan)))
}

pub async fn list_plans(State(state): State<Arc<AppState>>) -> Json<Vec<PlanRecord>> {
    Json(state.gate.plans.list())
}

pub async fn get_plan(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<PlanRecord>, ApiError> {
    state
        .gate
        .plans
        .get(id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no plan {id}")))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchPlanRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub authorized_sats: Option<u64>,
    pub interval_blocks: Option<u32>,
    pub per_call_sats: Option<u64>,
    pub allowed_paths: Option<Vec<String>>,
    pub status: Option<PlanStatus>,
}

pub async fn patch_plan(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<PatchPlanRequest>,
) -> Result<Json<PlanRecord>, ApiError> {
    let patch = PlanPatch {
        name: body.name,
        description: body.description,
        authorized_sats: body.authorized_sats.map(Sats::new),
        interval_blocks: body.interval_blocks,
        per_call_sats: body.per_call_sats.map(Sats::new),
        allowed_paths: body.allowed_paths,
        status: body.status,
    };
    let plan = state.gate.plans.patch(id, patch)?;
    Ok(Json(plan))
}

pub async fn dashboard(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let plans = state.gate.plans.list();
    let subscriptions = state.gate.store.get_all().await;
    let usage = state.gate.usage.get_all_usage().await;
    let total_pending_sats = state.gate.usage.get_total_pending_sats().await;
    Json(serde_json::json!({
        "plans": plans,
        "subscriptions": subscriptions,
        "usage": usage,
        "totalPendingSats": total_pending_sats,
    }))
}

pub async fn claim_all(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let result = state.gate.settlement.claim_all().await;
    Json(serde_json::json!({
        "entries": result.entries.iter().map(|e| {
            match &e.outcome {
                cashflow_core::settlement::ClaimAllOutcome::Claimed { txid, claimed_sats } => serde_json::json!({
                    "contractAddress": e.contract_address,
                    "status": "claimed",
                    "txid": txid,
                    "claimedSats": claimed_sats.as_u64(),
                }),
                cashflow_core::settlement::ClaimAllOutcome::Skipped { reason } => serde_json::json!({
                    "contractAddress": e.contract_address,
                    "status": "skipped",
                    "reason": reason,
                }),
                cashflow_core::settlement::ClaimAllOutcome::Error { message } => serde_json::json!({
                    "contractAddress": e.contract_address,
                    "status": "error",
                    "message": message,
                }),
            }
        }).collect::<Vec<_>>(),
        "totalClaimedSats": result.total_claimed_sats.as_u64(),
    }))
}
