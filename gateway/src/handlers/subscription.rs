//! Subscription lifecycle routes (`spec.md` §4.13, §6).

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::Json;
use cashflow_core::covenant::{self, InstantiateParams};
use cashflow_core::genesis::{self, GenesisParams};
use cashflow_core::keys::{self, Network};
use cashflow_core::model::{SubscriptionRecord, SubscriptionStatus};
use cashflow_types::{Sats, UnixTimestamp};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

fn network_of(state: &AppState) -> Network {
    state.config.network()
}

async fn instantiate_for(
    state: &AppState,
    subscriber_address: &str,
    plan_id: Option<Uuid>,
    interval_blocks: Option<u32>,
    authorized_sats: Option<u64>,
) -> Result<(SubscriptionRecord, covenant::InstantiateResult), ApiError> {
    let merchant_pkh = keys::address_to_pkh(&state.config.merchant_address)?;
    let subscriber_pkh = keys::address_to_pkh(subscriber_address)?;

    let (interval_blocks, authorized_sats) = if let Some(plan_id) = plan_id {
        let plan = state
            .gate
            .plans
            .get(plan_id)
            .ok_or_else(|| ApiError::NotFound(format!("no plan {plan_id}")))?;
        (plan.interval_blocks, plan.authorized_sats.as_u64())
    } else {
        (
            interval_blocks.unwrap_or(state.config.default_interval_blocks),
            authorized_sats.unwrap_or(state.config.default_authorized_sats),
        )
    };

    let instantiated = covenant::instantiate(
        &InstantiateParams {
            merchant_pkh,
            subscriber_pkh,
            interval_blocks,
            max_sats: Sats::new(authorized_sats),
        },
        network_of(state),
    );

    let now = UnixTimestamp::now();
    let record = SubscriptionRecord {
        contract_address: instantiated.contract_address.clone(),
        token_address: instantiated.token_address.clone(),
        token_category: format!("pending_{}", Uuid::new_v4()),
        merchant_pkh,
        subscriber_pkh,
        merchant_address: state.config.merchant_address.clone(),
        subscriber_address: subscriber_address.to_string(),
        interval_blocks,
        authorized_sats: Sats::new(authorized_sats),
        last_claim_block: 0,
        balance: Sats::ZERO,
        status: SubscriptionStatus::PendingFunding,
        plan_id: plan_id.map(|id| id.to_string()),
        created_at: now,
        updated_at: now,
    };
    Ok((record, instantiated))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploySubscriptionRequest {
    pub subscriber_address: String,
    pub plan_id: Option<Uuid>,
    pub interval_blocks: Option<u32>,
    pub authorized_sats: Option<u64>,
}

pub async fn deploy_subscription(
    State(state): State<Arc<AppState>>,
    Json(body): Json<DeploySubscriptionRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (record, _instantiated) = instantiate_for(
        &state,
        &body.subscriber_address,
        body.plan_id,
        body.interval_blocks,
        body.authorized_sats,
    )
    .await?;

    let genesis_commitment = keys::build_nft_commitment(0, record.authorized_sats.as_u64() as i32);
    let deposit_sats = state.config.default_deposit_sats();
    let funding_uri = cashflow_gate::response::build_bip21_uri(
        &record.token_address,
        deposit_sats,
        "CashFlow402",
        "subscription funding",
        Some(&record.token_category),
        None,
    );

    let response = serde_json::json!({
        "contractAddress": record.contract_address,
        "tokenAddress": record.token_address,
        "tokenCategory": record.token_category,
        "genesisCommitment": genesis_commitment,
        "fundingUri": funding_uri,
        "depositSats": deposit_sats.as_u64(),
    });
    state.gate.store.add(record).await?;
    Ok(Json(response))
}

pub async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(body): Json<DeploySubscriptionRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let generated = keys::generate_keypair(network_of(&state));
    let (record, _instantiated) = instantiate_for(
        &state,
        &generated.address,
        body.plan_id,
        body.interval_blocks,
        body.authorized_sats,
    )
    .await?;

    let genesis_commitment = keys::build_nft_commitment(0, record.authorized_sats.as_u64() as i32);
    let deposit_sats = state.config.default_deposit_sats();
    let response = serde_json::json!({
        "subscriberAddress": generated.address,
        "subscriberWif": generated.wif,
        "contractAddress": record.contract_address,
        "tokenAddress": record.token_address,
        "tokenCategory": record.token_category,
        "genesisCommitment": genesis_commitment,
        "depositSats": deposit_sats.as_u64(),
    });
    state.gate.store.add(record).await?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoFundRequest {
    pub contract_address: String,
    pub subscriber_wif: String,
}

pub async fn auto_fund(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AutoFundRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let record = state
        .gate
        .store
        .get_by_address(&body.contract_address)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("no subscription at {}", body.contract_address)))?;
    if record.status != SubscriptionStatus::PendingFunding {
        return Err(ApiError::Conflict("subscription is not pending funding".into()));
    }

    let generated = keys::wif_to_keypair(&body.subscriber_wif)?;
    let secp = secp256k1::Secp256k1::new();
    let keypair = secp256k1::Keypair::from_secret_key(&secp, &generated.secret_key);
    let deposit_sats = state.config.default_deposit_sats();

    let result = genesis::build_and_broadcast_genesis(
        GenesisParams {
            subscriber_keypair: &keypair,
            subscriber_pkh: record.subscriber_pkh,
            subscriber_address: &record.subscriber_address,
            contract_token_address: &record.token_address,
            genesis_commitment_hex: keys::build_nft_commitment(0, record.authorized_sats.as_u64() as i32),
            deposit_sats,
        },
        state.gate.chain.as_ref(),
    )
    .await?;

    let updated = state
        .gate
        .store
        .patch(&body.contract_address, |r| {
            r.token_category = result.token_category.clone();
            r.balance = deposit_sats;
            r.status = SubscriptionStatus::Active;
            r.last_claim_block = 0;
        })
        .await?;

    Ok(Json(serde_json::json!({
        "txid": result.txid,
        "subscription": updated,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FundConfirmRequest {
    pub contract_address: String,
    pub txid: String,
}

pub async fn fund_confirm(
    State(state): State<Arc<AppState>>,
    Json(body): Json<FundConfirmRequest>,
) -> Result<Json<SubscriptionRecord>, ApiError> {
    let record = state
        .gate
        .store
        .get_by_address(&body.contract_address)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("no subscription at {}", body.contract_address)))?;
    if record.status == SubscriptionStatus::Active {
        return Ok(Json(record));
    }
    if record.status != SubscriptionStatus::PendingFunding {
        return Err(ApiError::Conflict("subscription is not pending funding".into()));
    }

    let tx = state
        .gate
        .chain
        .get_raw_tx(&body.txid)
        .await
        .map_err(|e| ApiError::PaymentRequired(format!("could not fetch funding tx: {e}")))?;

    let expected_bytecode = hex::encode(keys::address_to_locking_bytecode(&record.token_address)?);
    let output = tx
        .outputs
        .iter()
        .find(|o| o.locking_bytecode_hex().eq_ignore_ascii_case(&expected_bytecode))
        .ok_or_else(|| ApiError::PaymentRequired("funding tx has no output paying this contract".into()))?;
    let token_data = output
        .token_data()
        .ok_or_else(|| ApiError::PaymentRequired("funding output carries no token data".into()))?;
    let nft = token_data
        .nft
        .as_ref()
        .ok_or_else(|| ApiError::PaymentRequired("funding output is not a mutable NFT".into()))?;
    let commitment = keys::parse_nft_commitment(&nft.commitment)?;

    let category = token_data.category.clone();
    let balance = output.value();

    let updated = state
        .gate
        .store
        .patch(&body.contract_address, |r| {
            r.token_category = category;
            r.balance = balance;
            r.status = SubscriptionStatus::Active;
            r.last_claim_block = commitment.last_claim_block.max(0) as u64;
        })
        .await?;
    Ok(Json(updated))
}

pub async fn status(
    State(state): State<Arc<AppState>>,
    Path(addr): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let record = state
        .gate
        .store
        .get_by_address(&addr)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("no subscription at {addr}")))?;

    let record = if record.status == SubscriptionStatus::Active {
        match covenant::current_balance(state.gate.chain.as_ref(), &record).await {
            Ok((balance, _commitment)) => state
                .gate
                .store
                .patch(&addr, |r| r.balance = balance)
                .await
                .unwrap_or(record),
            Err(_) => record,
        }
    } else {
        record
    };

    let current_height = state.gate.chain.get_block_height().await.unwrap_or(0);
    let can_claim_now = record.status == SubscriptionStatus::Active
        && current_height >= record.last_claim_block + record.interval_blocks as u64;

    Ok(Json(serde_json::json!({
        "subscription": record,
        "canClaimNow": can_claim_now,
    })))
}

pub async fn list(State(state): State<Arc<AppState>>) -> Json<Vec<SubscriptionRecord>> {
    Json(state.gate.store.get_all().await)
}

pub async fn verify(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let contract_address = query
        .get("contractAddress")
        .ok_or_else(|| ApiError::BadRequest("contractAddress is required".into()))?;
    let record = state
        .gate
        .store
        .get_by_address(contract_address)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("no subscription at {contract_address}")))?;
    if record.status != SubscriptionStatus::Active {
        return Err(ApiError::PaymentRequired(format!(
            "subscription is {:?}, not active",
            record.status
        )));
    }
    let token = state
        .gate
        .tokens
        .sign_subscription(record.token_category.clone(), record.contract_address.clone())
        .map_err(|e| ApiError::ServerError(e.to_string()))?;
    Ok(Json(serde_json::json!({ "accessToken": token })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimRequest {
    pub contract_address: String,
}

pub async fn claim(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ClaimRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let result = state.gate.settlement.claim(&body.contract_address).await?;
    Ok(Json(serde_json::json!({
        "txid": result.txid,
        "claimedSats": result.claimed_sats.as_u64(),
        "nextClaimAfterBlock": result.next_claim_after_block,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    pub contract_address: String,
    pub subscriber_wif: String,
}

pub async fn cancel(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CancelRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let result = state
        .gate
        .settlement
        .cancel(&body.contract_address, &body.subscriber_wif)
        .await?;
    Ok(Json(serde_json::json!({
        "txid": result.txid,
        "refundedSats": result.refunded_sats.as_u64(),
    })))
}
