//! Shared persisted record types (`spec.md` §3).

use cashflow_types::{Sats, UnixTimestamp};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

pub const RECENT_CALLS_CAP: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    PendingFunding,
    Active,
    Cancelled,
    Expired,
}

/// The subscription record, keyed primarily by `contractAddress` with a
/// secondary unique index by `tokenCategory` (`spec.md` §3, §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRecord {
    pub contract_address: String,
    pub token_address: String,
    pub token_category: String,
    pub merchant_pkh: cashflow_types::Pkh,
    pub subscriber_pkh: cashflow_types::Pkh,
    pub merchant_address: String,
    pub subscriber_address: String,
    pub interval_blocks: u32,
    pub authorized_sats: Sats,
    pub last_claim_block: u64,
    pub balance: Sats,
    pub status: SubscriptionStatus,
    #[serde(default)]
    pub plan_id: Option<String>,
    pub created_at: UnixTimestamp,
    pub updated_at: UnixTimestamp,
}

impl SubscriptionRecord {
    pub fn is_pending_category(&self) -> bool {
        self.token_category.starts_with("pending_")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRecord {
    pub timestamp: UnixTimestamp,
    pub api_path: String,
    pub cost_sats: Sats,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// Per-subscription usage counters (`spec.md` §3, §4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    pub token_category: String,
    pub contract_address: String,
    pub pending_sats: Sats,
    pub total_sats: Sats,
    pub recent_calls: VecDeque<CallRecord>,
    pub last_used_at: UnixTimestamp,
}

impl UsageRecord {
    pub fn new(token_category: String, contract_address: String) -> Self {
        UsageRecord {
            token_category,
            contract_address,
            pending_sats: Sats::ZERO,
            total_sats: Sats::ZERO,
            recent_calls: VecDeque::new(),
            last_used_at: UnixTimestamp::now(),
        }
    }

    pub fn push_call(&mut self, call: CallRecord) {
        self.recent_calls.push_front(call);
        while self.recent_calls.len() > RECENT_CALLS_CAP {
            self.recent_calls.pop_back();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Active,
    Paused,
    Archived,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanRecord {
    pub plan_id: uuid::Uuid,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub authorized_sats: Sats,
    pub interval_blocks: u32,
    pub per_call_sats: Sats,
    pub allowed_paths: Vec<String>,
    pub merchant_address: String,
    pub status: PlanStatus,
    pub subscriber_count: u64,
}

impl PlanRecord {
    pub fn default_allowed_paths() -> Vec<String> {
        vec!["/api/*".to_string()]
    }
}

#[derive(Debug, Clone)]
pub struct NonceRecord {
    pub nonce: uuid::Uuid,
    pub merchant_address: String,
    pub amount_sats: Sats,
    pub api_path: String,
    pub expires_at: UnixTimestamp,
    pub consumed: bool,
}
