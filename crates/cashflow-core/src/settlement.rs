//! Settlement Orchestrator (`spec.md` §4.12).

use crate::chain::ChainAdapter;
use crate::covenant;
use crate::error::SettlementError;
use crate::keys;
use crate::model::SubscriptionStatus;
use crate::store::SubscriptionStore;
use crate::usage::UsageMeter;
use cashflow_types::Sats;
use secp256k1::Keypair;
use std::sync::Arc;

pub struct ClaimResult {
    pub txid: String,
    pub claimed_sats: Sats,
    pub next_claim_after_block: u64,
}

pub struct CancelResult {
    pub txid: String,
    pub refunded_sats: Sats,
}

#[derive(Debug, Clone)]
pub enum ClaimAllOutcome {
    Claimed { txid: String, claimed_sats: Sats },
    Skipped { reason: String },
    Error { message: String },
}

pub struct ClaimAllEntry {
    pub contract_address: String,
    pub outcome: ClaimAllOutcome,
}

pub struct ClaimAllResult {
    pub entries: Vec<ClaimAllEntry>,
    pub total_claimed_sats: Sats,
}

pub struct SettlementOrchestrator {
    store: Arc<SubscriptionStore>,
    usage: Arc<UsageMeter>,
    chain: Arc<dyn ChainAdapter>,
    merchant_keypair: Keypair,
}

impl SettlementOrchestrator {
    pub fn new(
        store: Arc<SubscriptionStore>,
        usage: Arc<UsageMeter>,
        chain: Arc<dyn ChainAdapter>,
        merchant_keypair: Keypair,
    ) -> Self {
        SettlementOrchestrator {
            store,
            usage,
            chain,
            merchant_keypair,
        }
    }

    /// Settles a single subscription's accumulated `pendingSats`
    /// (`spec.md` §4.12).
    pub async fn claim(&self, contract_address: &str) -> Result<ClaimResult, SettlementError> {
        let record = self
            .store
            .get_by_address(contract_address)
            .await
            .ok_or(SettlementError::NotActive)?;
        if record.status != SubscriptionStatus::Active {
            return Err(SettlementError::NotActive);
        }
        let usage = self.usage.get_usage(&record.token_category).await;
        let pending_sats = usage.map(|u| u.pending_sats).unwrap_or(Sats::ZERO);
        if pending_sats.is_zero() {
            return Err(SettlementError::NothingPending);
        }

        let outcome = covenant::build_and_broadcast_claim(
            &record,
            pending_sats,
            &self.merchant_keypair,
            self.chain.as_ref(),
        )
        .await?;

        self.store
            .record_claim(contract_address, outcome.new_last_claim_block, outcome.new_balance)
            .await?;
        self.usage
            .reset_pending_sats(&record.token_category, outcome.claimed_sats)
            .await?;

        Ok(ClaimResult {
            txid: outcome.txid,
            claimed_sats: outcome.claimed_sats,
            next_claim_after_block: outcome.new_last_claim_block + record.interval_blocks as u64,
        })
    }

    /// Batch settlement over every active subscription (`spec.md` §4.12).
    /// Any single subscription's failure is non-fatal to the batch.
    pub async fn claim_all(&self) -> ClaimAllResult {
        let records = self.store.get_all().await;
        let mut entries = Vec::new();
        let mut total_claimed_sats = Sats::ZERO;

        for record in records {
            if record.status != SubscriptionStatus::Active {
                continue;
            }
            let usage = self.usage.get_usage(&record.token_category).await;
            let pending_sats = usage.map(|u| u.pending_sats).unwrap_or(Sats::ZERO);
            if pending_sats.is_zero() {
                entries.push(ClaimAllEntry {
                    contract_address: record.contract_address.clone(),
                    outcome: ClaimAllOutcome::Skipped {
                        reason: "nothing pending".to_string(),
                    },
                });
                continue;
            }

            let outcome = covenant::build_and_broadcast_claim(
                &record,
                pending_sats,
                &self.merchant_keypair,
                self.chain.as_ref(),
            )
            .await;

            match outcome {
                Ok(result) => {
                    let _ = self
                        .store
                        .record_claim(
                            &record.contract_address,
                            result.new_last_claim_block,
                            result.new_balance,
                        )
                        .await;
                    let _ = self
                        .usage
                        .reset_pending_sats(&record.token_category, result.claimed_sats)
                        .await;
                    total_claimed_sats += result.claimed_sats;
                    entries.push(ClaimAllEntry {
                        contract_address: record.contract_address.clone(),
                        outcome: ClaimAllOutcome::Claimed {
                            txid: result.txid,
                            claimed_sats: result.claimed_sats,
                        },
                    });
                }
                Err(crate::error::CovenantError::IntervalNotElapsed { .. }) => {
                    entries.push(ClaimAllEntry {
                        contract_address: record.contract_address.clone(),
                        outcome: ClaimAllOutcome::Skipped {
                            reason: "Interval not yet elapsed".to_string(),
                        },
                    });
                }
                Err(e) => {
                    entries.push(ClaimAllEntry {
                        contract_address: record.contract_address.clone(),
                        outcome: ClaimAllOutcome::Error {
                            message: e.to_string(),
                        },
                    });
                }
            }
        }

        ClaimAllResult {
            entries,
            total_claimed_sats,
        }
    }

    /// Sweeps the remaining balance to the subscriber and marks the
    /// subscription `cancelled` (`spec.md` §4.12).
    pub async fn cancel(
        &self,
        contract_address: &str,
        subscriber_wif: &str,
    ) -> Result<CancelResult, SettlementError> {
        let record = self
            .store
            .get_by_address(contract_address)
            .await
            .ok_or(SettlementError::NotActive)?;
        if record.status != SubscriptionStatus::Active {
            return Err(SettlementError::NotActive);
        }
        let subscriber = keys::wif_to_keypair(subscriber_wif)
            .map_err(|e| SettlementError::Covenant(crate::error::CovenantError::Key(e)))?;
        let secp = secp256k1::Secp256k1::new();
        let keypair = Keypair::from_secret_key(&secp, &subscriber.secret_key);

        let outcome =
            covenant::build_and_broadcast_cancel(&record, &keypair, self.chain.as_ref()).await?;

        self.store
            .set_status(contract_address, SubscriptionStatus::Cancelled)
            .await?;

        Ok(CancelResult {
            txid: outcome.txid,
            refunded_sats: outcome.refunded_sats,
        })
    }
}
