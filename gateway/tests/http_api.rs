//! End-to-end router tests driving the CashFlow402 gateway's Axum
//! `Router` with a `MockChainAdapter` standing in for a live BCH node.
//! Exercises the per-call challenge/verify flow and the subscription
//! gate's balance metering over the `/api/*` and `/premium/*` demo
//! routes (`spec.md` §8).

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use cashflow_core::chain::mock::MockChainAdapter;
use cashflow_core::chain::ChainAdapter;
use cashflow_core::keys::{self, Network};
use cashflow_core::model::{SubscriptionRecord, SubscriptionStatus};
use cashflow_core::nonce::NonceStore;
use cashflow_core::plans::PlanRegistry;
use cashflow_core::settlement::SettlementOrchestrator;
use cashflow_core::store::SubscriptionStore;
use cashflow_core::token::TokenSigner;
use cashflow_core::usage::UsageMeter;
use cashflow_gateway::config::Config;
use cashflow_gateway::handlers;
use cashflow_gateway::state::AppState;
use cashflow_gate::{GateConfig, GateState};
use cashflow_types::{Pkh, Sats, UnixTimestamp, VerboseTx, VerboseTxOutput};
use secp256k1::{Keypair, Secp256k1};
use serde_json::{json, Value};
use tower::ServiceExt;

fn test_config(merchant_address: String, merchant_wif: String, data_dir: std::path::PathBuf) -> Config {
    Config {
        port: 8080,
        host: "0.0.0.0".parse().unwrap(),
        bch_network: "mock".to_string(),
        electrum_host: "localhost".to_string(),
        electrum_port: 50004,
        electrum_protocol: "tcp".to_string(),
        merchant_wif,
        merchant_address,
        jwt_secret: "test-secret-do-not-use-in-prod".to_string(),
        jwt_expiry_percall: 60,
        jwt_expiry_subscription: 3600,
        default_percall_rate_sats: 100,
        default_interval_blocks: 144,
        default_authorized_sats: 100_000,
        default_deposit_sats: 20_000,
        jit_threshold_sats: 10_000,
        webhook_secret: None,
        data_dir,
        verify_url_base: "http://localhost:8080/verify-payment".to_string(),
    }
}

async fn build_state(chain: Arc<MockChainAdapter>) -> (Arc<AppState>, Arc<SubscriptionStore>, Arc<TokenSigner>) {
    let merchant = keys::generate_keypair(Network::Chipnet);
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(merchant.address.clone(), merchant.wif.clone(), dir.path().to_path_buf());

    let secp = Secp256k1::new();
    let merchant_keypair = Keypair::from_secret_key(&secp, &merchant.secret_key);

    let chain: Arc<dyn ChainAdapter> = chain;
    let store = Arc::new(SubscriptionStore::load(config.subscriptions_path()).await.unwrap());
    let usage = Arc::new(UsageMeter::load(config.usage_path()).await.unwrap());
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
        tokens: tokens.clone(),
        usage,
        store: store.clone(),
        plans,
        chain,
        settlement,
    });

    let app_state = Arc::new(AppState {
        gate,
        config: Arc::new(config),
        merchant_keypair,
    });

    (app_state, store, tokens)
}

fn locking_bytecode_hex(address: &str) -> String {
    hex::encode(keys::address_to_locking_bytecode(address).unwrap())
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn percall_route_challenges_then_accepts_a_verified_payment() {
    let chain = Arc::new(MockChainAdapter::new());
    let (app_state, _store, _tokens) = build_state(chain.clone()).await;
    let app = handlers::routes(app_state.clone());

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/premium/report")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    let challenge: Value = json_body(response).await;
    let nonce = challenge["nonce"].as_str().unwrap().to_string();
    assert_eq!(challenge["amountSats"], "100");

    let merchant_address = app_state.gate.config.merchant_address.clone();
    chain.insert_tx(VerboseTx {
        txid: "paid-tx".to_string(),
        outputs: vec![VerboseTxOutput::Plain {
            locking_bytecode_hex: locking_bytecode_hex(&merchant_address),
            value: Sats::new(100),
        }],
        confirmations: Some(1),
    });

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/verify-payment")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({ "txid": "paid-tx", "nonce": nonce }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let access_token = body["accessToken"].as_str().unwrap().to_string();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/premium/report")
                .header("authorization", format!("Bearer {access_token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["txid"], "paid-tx");
}

#[tokio::test]
async fn reusing_a_consumed_nonce_is_rejected() {
    let chain = Arc::new(MockChainAdapter::new());
    let (app_state, _store, _tokens) = build_state(chain.clone()).await;
    let app = handlers::routes(app_state.clone());

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/payment/challenge")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let challenge: Value = json_body(response).await;
    let nonce = challenge["nonce"].as_str().unwrap().to_string();

    let merchant_address = app_state.gate.config.merchant_address.clone();
    chain.insert_tx(VerboseTx {
        txid: "once".to_string(),
        outputs: vec![VerboseTxOutput::Plain {
            locking_bytecode_hex: locking_bytecode_hex(&merchant_address),
            value: Sats::new(100),
        }],
        confirmations: Some(1),
    });

    let verify_once = || {
        Request::builder()
            .method("POST")
            .uri("/verify-payment")
            .header("content-type", "application/json")
            .body(Body::from(json!({ "txid": "once", "nonce": nonce }).to_string()))
            .unwrap()
    };

    let first = app.clone().oneshot(verify_once()).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app.oneshot(verify_once()).await.unwrap();
    assert_eq!(second.status(), StatusCode::BAD_REQUEST);
}

fn active_subscription(contract_address: &str, token_category: &str, merchant_address: &str, balance: u64) -> SubscriptionRecord {
    SubscriptionRecord {
        contract_address: contract_address.to_string(),
        token_address: format!("{contract_address}-token"),
        token_category: token_category.to_string(),
        merchant_pkh: Pkh::from_bytes([0u8; 20]),
        subscriber_pkh: Pkh::from_bytes([1u8; 20]),
        merchant_address: merchant_address.to_string(),
        subscriber_address: "bchtest:subscriber".to_string(),
        interval_blocks: 144,
        authorized_sats: Sats::new(100_000),
        last_claim_block: 0,
        balance: Sats::new(balance),
        status: SubscriptionStatus::Active,
        plan_id: None,
        created_at: UnixTimestamp::now(),
        updated_at: UnixTimestamp::now(),
    }
}

#[tokio::test]
async fn subscription_gated_route_debits_balance_and_reports_headers() {
    let chain = Arc::new(MockChainAdapter::new());
    let (app_state, store, _tokens) = build_state(chain).await;
    let merchant_address = app_state.gate.config.merchant_address.clone();

    store
        .add(active_subscription("bchtest:contract1", "cat-1", &merchant_address, 5_000))
        .await
        .unwrap();

    let app = handlers::routes(app_state);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/widgets?tokenCategory=cat-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("X-Subscription-Cost-Sats").unwrap(),
        "100"
    );
    assert_eq!(
        response.headers().get("X-Subscription-Token-Category").unwrap(),
        "cat-1"
    );
    let body = json_body(response).await;
    assert_eq!(body["tokenCategory"], "cat-1");
}

#[tokio::test]
async fn subscription_route_without_a_credential_is_payment_required() {
    let chain = Arc::new(MockChainAdapter::new());
    let (app_state, _store, _tokens) = build_state(chain).await;
    let app = handlers::routes(app_state);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/widgets")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
}

#[tokio::test]
async fn subscription_route_for_a_cancelled_subscription_is_payment_required() {
    let chain = Arc::new(MockChainAdapter::new());
    let (app_state, store, _tokens) = build_state(chain).await;
    let merchant_address = app_state.gate.config.merchant_address.clone();

    let mut record = active_subscription("bchtest:contract2", "cat-2", &merchant_address, 5_000);
    record.status = SubscriptionStatus::Cancelled;
    store.add(record).await.unwrap();

    let app = handlers::routes(app_state);
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/widgets?tokenCategory=cat-2")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
}

#[tokio::test]
async fn subscription_list_endpoint_returns_persisted_records() {
    let chain = Arc::new(MockChainAdapter::new());
    let (app_state, store, _tokens) = build_state(chain).await;
    let merchant_address = app_state.gate.config.merchant_address.clone();
    store
        .add(active_subscription("bchtest:contract3", "cat-3", &merchant_address, 1_000))
        .await
        .unwrap();

    let app = handlers::routes(app_state);
    let response = app
        .oneshot(
            Request::builder()
                .uri("/subscription/list")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let records = body.as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["contractAddress"], "bchtest:contract3");
}

#[tokio::test]
async fn subscription_route_bound_to_a_paused_plan_is_conflict() {
    let chain = Arc::new(MockChainAdapter::new());
    let (app_state, store, _tokens) = build_state(chain).await;
    let merchant_address = app_state.gate.config.merchant_address.clone();

    let plan = app_state.gate.plans.create(
        "basic".into(),
        None,
        Sats::new(100_000),
        144,
        Sats::new(100),
        vec!["/api/*".to_string()],
        merchant_address.clone(),
    );
    app_state
        .gate
        .plans
        .patch(
            plan.plan_id,
            cashflow_core::plans::PlanPatch {
                status: Some(cashflow_core::model::PlanStatus::Paused),
                ..Default::default()
            },
        )
        .unwrap();

    let mut record = active_subscription("bchtest:contract4", "cat-4", &merchant_address, 5_000);
    record.plan_id = Some(plan.plan_id.to_string());
    store.add(record).await.unwrap();

    let app = handlers::routes(app_state);
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/widgets?tokenCategory=cat-4")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn subscription_route_with_exhausted_balance_is_payment_required() {
    let chain = Arc::new(MockChainAdapter::new());
    let (app_state, store, _tokens) = build_state(chain).await;
    let merchant_address = app_state.gate.config.merchant_address.clone();

    store
        .add(active_subscription("bchtest:contract5", "cat-5", &merchant_address, 10))
        .await
        .unwrap();

    let app = handlers::routes(app_state);
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/widgets?tokenCategory=cat-5")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
}

#[tokio::test]
async fn every_response_carries_a_request_id_header() {
    let chain = Arc::new(MockChainAdapter::new());
    let (app_state, _store, _tokens) = build_state(chain).await;
    let app = handlers::routes(app_state);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/subscription/list")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(response.headers().contains_key("X-Request-Id"));
}
