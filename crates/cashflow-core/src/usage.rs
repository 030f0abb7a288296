//! Usage Meter (`spec.md` §4.6).
//!
//! Per-category `tokio::sync::Mutex` inside a `DashMap` so deductions on
//! different categories never contend, while deductions on the same
//! category are strictly ordered (`spec.md` §5). Arithmetic runs under
//! the per-category lock; the lock is released before the JSON flush.

use crate::error::{StoreError, UsageError};
use crate::model::{CallRecord, UsageRecord};
use cashflow_types::{Sats, UnixTimestamp};
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

pub struct RecordUsageInput {
    pub token_category: String,
    pub contract_address: String,
    pub current_balance: Sats,
    pub cost_sats: Sats,
    pub api_path: String,
    pub request_id: Option<String>,
}

pub struct RecordUsageOutcome {
    pub pending_sats: Sats,
    pub remaining_balance: Sats,
}

pub struct UsageMeter {
    path: PathBuf,
    categories: DashMap<String, Mutex<UsageRecord>>,
}

impl UsageMeter {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let records: Vec<UsageRecord> = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(StoreError::Io(e)),
        };
        let categories = DashMap::new();
        for record in records {
            categories.insert(record.token_category.clone(), Mutex::new(record));
        }
        Ok(UsageMeter { path, categories })
    }

    async fn flush(&self) -> Result<(), StoreError> {
        let mut snapshot = Vec::with_capacity(self.categories.len());
        for entry in self.categories.iter() {
            snapshot.push(entry.value().lock().await.clone());
        }
        let bytes = serde_json::to_vec_pretty(&snapshot)?;
        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &bytes).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }

    /// Debits `cost_sats` against the category's effective balance
    /// (`spec.md` §4.6, steps 1-6). The arithmetic runs under the
    /// per-category lock; the lock is released before `flush`.
    pub async fn record_usage(
        &self,
        input: RecordUsageInput,
    ) -> Result<RecordUsageOutcome, UsageError> {
        let entry = self
            .categories
            .entry(input.token_category.clone())
            .or_insert_with(|| {
                Mutex::new(UsageRecord::new(
                    input.token_category.clone(),
                    input.contract_address.clone(),
                ))
            });
        let outcome = {
            let mut record = entry.lock().await;
            let effective = input.current_balance.saturating_sub(record.pending_sats);
            if effective.as_u64() < input.cost_sats.as_u64() {
                return Err(UsageError::BalanceExhausted {
                    effective: effective.as_u64(),
                    cost: input.cost_sats.as_u64(),
                });
            }
            record.pending_sats += input.cost_sats;
            record.total_sats += input.cost_sats;
            record.last_used_at = UnixTimestamp::now();
            record.push_call(CallRecord {
                timestamp: record.last_used_at,
                api_path: input.api_path.clone(),
                cost_sats: input.cost_sats,
                request_id: input.request_id.clone(),
            });
            RecordUsageOutcome {
                pending_sats: record.pending_sats,
                remaining_balance: input.current_balance.saturating_sub(record.pending_sats),
            }
        };
        self.flush().await?;
        Ok(outcome)
    }

    /// Subtracts `claimed_sats` from the category's `pendingSats`, floored
    /// at zero (`spec.md` §4.6, §4.12).
    pub async fn reset_pending_sats(
        &self,
        category: &str,
        claimed_sats: Sats,
    ) -> Result<(), UsageError> {
        if let Some(entry) = self.categories.get(category) {
            {
                let mut record = entry.lock().await;
                record.pending_sats = record.pending_sats.saturating_sub(claimed_sats);
            }
            self.flush().await?;
        }
        Ok(())
    }

    pub async fn get_usage(&self, category: &str) -> Option<UsageRecord> {
        match self.categories.get(category) {
            Some(entry) => Some(entry.lock().await.clone()),
            None => None,
        }
    }

    pub async fn get_all_usage(&self) -> Vec<UsageRecord> {
        let mut out = Vec::with_capacity(self.categories.len());
        for entry in self.categories.iter() {
            out.push(entry.value().lock().await.clone());
        }
        out
    }

    pub async fn get_total_pending_sats(&self) -> Sats {
        let mut total = Sats::ZERO;
        for entry in self.categories.iter() {
            total += entry.value().lock().await.pending_sats;
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(category: &str, balance: u64, cost: u64) -> RecordUsageInput {
        RecordUsageInput {
            token_category: category.to_string(),
            contract_address: "addr".to_string(),
            current_balance: Sats::new(balance),
            cost_sats: Sats::new(cost),
            api_path: "/api/data".to_string(),
            request_id: None,
        }
    }

    #[tokio::test]
    async fn effective_balance_equal_to_cost_admits_the_call() {
        let dir = tempfile::tempdir().unwrap();
        let meter = UsageMeter::load(dir.path().join("usage.json")).await.unwrap();
        let outcome = meter.record_usage(input("cat1", 546, 546)).await.unwrap();
        assert_eq!(outcome.remaining_balance, Sats::ZERO);
    }

    #[tokio::test]
    async fn insufficient_effective_balance_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let meter = UsageMeter::load(dir.path().join("usage.json")).await.unwrap();
        let err = meter.record_usage(input("cat1", 100, 546)).await.unwrap_err();
        assert!(matches!(err, UsageError::BalanceExhausted { .. }));
    }

    #[tokio::test]
    async fn three_calls_accumulate_pending_and_recent_calls() {
        let dir = tempfile::tempdir().unwrap();
        let meter = UsageMeter::load(dir.path().join("usage.json")).await.unwrap();
        for _ in 0..3 {
            meter.record_usage(input("cat1", 100_000, 546)).await.unwrap();
        }
        let usage = meter.get_usage("cat1").await.unwrap();
        assert_eq!(usage.pending_sats, Sats::new(1638));
        assert_eq!(usage.recent_calls.len(), 3);
    }

    #[tokio::test]
    async fn reset_pending_sats_floors_at_zero() {
        let dir = tempfile::tempdir().unwrap();
        let meter = UsageMeter::load(dir.path().join("usage.json")).await.unwrap();
        meter.record_usage(input("cat1", 100_000, 546)).await.unwrap();
        meter.reset_pending_sats("cat1", Sats::new(10_000)).await.unwrap();
        let usage = meter.get_usage("cat1").await.unwrap();
        assert_eq!(usage.pending_sats, Sats::ZERO);
    }
}
