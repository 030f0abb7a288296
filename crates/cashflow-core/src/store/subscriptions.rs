//! Subscription Store (`spec.md` §4.5).
//!
//! A single JSON document (`subscriptions.json`) holding every record,
//! with a secondary in-memory index by `tokenCategory` rebuilt on load.
//! Guarded by a `tokio::sync::RwLock` since reads (every gated request)
//! vastly outnumber writes (`spec.md` §5's reader-writer-lock allowance).

use crate::error::StoreError;
use crate::model::{SubscriptionRecord, SubscriptionStatus};
use cashflow_types::{Sats, UnixTimestamp};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

struct Inner {
    by_address: HashMap<String, SubscriptionRecord>,
    by_category: HashMap<String, String>,
}

impl Inner {
    fn rebuild_index(&mut self) {
        self.by_category.clear();
        for record in self.by_address.values() {
            self.by_category
                .insert(record.token_category.clone(), record.contract_address.clone());
        }
    }
}

pub struct SubscriptionStore {
    path: PathBuf,
    inner: RwLock<Inner>,
}

impl SubscriptionStore {
    /// Loads `path` if it exists, otherwise starts empty.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let records: Vec<SubscriptionRecord> = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(StoreError::Io(e)),
        };
        let mut inner = Inner {
            by_address: HashMap::new(),
            by_category: HashMap::new(),
        };
        for record in records {
            inner.by_address.insert(record.contract_address.clone(), record);
        }
        inner.rebuild_index();
        Ok(SubscriptionStore {
            path,
            inner: RwLock::new(inner),
        })
    }

    async fn flush(&self, inner: &Inner) -> Result<(), StoreError> {
        let records: Vec<&SubscriptionRecord> = inner.by_address.values().collect();
        let bytes = serde_json::to_vec_pretty(&records)?;
        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &bytes).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }

    pub async fn add(&self, record: SubscriptionRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if inner.by_address.contains_key(&record.contract_address) {
            return Err(StoreError::Duplicate(record.contract_address));
        }
        inner
            .by_category
            .insert(record.token_category.clone(), record.contract_address.clone());
        inner.by_address.insert(record.contract_address.clone(), record);
        self.flush(&inner).await
    }

    pub async fn get_by_address(&self, address: &str) -> Option<SubscriptionRecord> {
        self.inner.read().await.by_address.get(address).cloned()
    }

    pub async fn get_by_category(&self, category: &str) -> Option<SubscriptionRecord> {
        let inner = self.inner.read().await;
        let address = inner.by_category.get(category)?;
        inner.by_address.get(address).cloned()
    }

    pub async fn get_all(&self) -> Vec<SubscriptionRecord> {
        self.inner.read().await.by_address.values().cloned().collect()
    }

    /// Merges `patch` into the stored record and stamps `updatedAt`.
    pub async fn patch(
        &self,
        address: &str,
        patch: impl FnOnce(&mut SubscriptionRecord),
    ) -> Result<SubscriptionRecord, StoreError> {
        let mut inner = self.inner.write().await;
        let record = inner
            .by_address
            .get_mut(address)
            .ok_or_else(|| StoreError::NotFound(address.to_string()))?;
        let old_category = record.token_category.clone();
        patch(record);
        record.updated_at = UnixTimestamp::now();
        let new_category = record.token_category.clone();
        let updated = record.clone();
        if old_category != new_category {
            inner.by_category.remove(&old_category);
            inner.by_category.insert(new_category, address.to_string());
        }
        self.flush(&inner).await?;
        Ok(updated)
    }

    pub async fn set_status(
        &self,
        address: &str,
        status: SubscriptionStatus,
    ) -> Result<SubscriptionRecord, StoreError> {
        self.patch(address, |record| record.status = status).await
    }

    pub async fn record_claim(
        &self,
        address: &str,
        new_last_claim_block: u64,
        new_balance: Sats,
    ) -> Result<SubscriptionRecord, StoreError> {
        self.patch(address, |record| {
            record.last_claim_block = new_last_claim_block;
            record.balance = new_balance;
        })
        .await
    }

    pub async fn remove(&self, address: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let record = inner
            .by_address
            .remove(address)
            .ok_or_else(|| StoreError::NotFound(address.to_string()))?;
        inner.by_category.remove(&record.token_category);
        self.flush(&inner).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cashflow_types::Pkh;

    fn sample(address: &str, category: &str) -> SubscriptionRecord {
        SubscriptionRecord {
            contract_address: address.to_string(),
            token_address: format!("{address}-token"),
            token_category: category.to_string(),
            merchant_pkh: Pkh::from_bytes([0u8; 20]),
            subscriber_pkh: Pkh::from_bytes([1u8; 20]),
            merchant_address: "bchtest:merchant".to_string(),
            subscriber_address: "bchtest:subscriber".to_string(),
            interval_blocks: 144,
            authorized_sats: Sats::new(20_000),
            last_claim_block: 0,
            balance: Sats::ZERO,
            status: SubscriptionStatus::PendingFunding,
            plan_id: None,
            created_at: UnixTimestamp::now(),
            updated_at: UnixTimestamp::now(),
        }
    }

    #[tokio::test]
    async fn secondary_index_stays_consistent_across_mutations() {
        let dir = tempfile::tempdir().unwrap();
        let store = SubscriptionStore::load(dir.path().join("subscriptions.json"))
            .await
            .unwrap();
        store.add(sample("addr1", "pending_abc")).await.unwrap();
        let fetched = store.get_by_category("pending_abc").await.unwrap();
        assert_eq!(fetched.contract_address, "addr1");

        store
            .patch("addr1", |r| r.token_category = "cafe".repeat(8))
            .await
            .unwrap();
        assert!(store.get_by_category("pending_abc").await.is_none());
        assert!(store.get_by_category(&"cafe".repeat(8)).await.is_some());
    }

    #[tokio::test]
    async fn reload_from_disk_rebuilds_the_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subscriptions.json");
        {
            let store = SubscriptionStore::load(&path).await.unwrap();
            store.add(sample("addr1", "cat1")).await.unwrap();
        }
        let reloaded = SubscriptionStore::load(&path).await.unwrap();
        assert!(reloaded.get_by_category("cat1").await.is_some());
    }

    #[tokio::test]
    async fn duplicate_contract_address_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = SubscriptionStore::load(dir.path().join("subscriptions.json"))
            .await
            .unwrap();
        store.add(sample("addr1", "cat1")).await.unwrap();
        let err = store.add(sample("addr1", "cat2")).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
    }
}
