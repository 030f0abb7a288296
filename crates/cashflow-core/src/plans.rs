//! Plan Registry (`spec.md` §4.7).

use crate::error::StoreError;
use crate::model::{PlanRecord, PlanStatus};
use cashflow_types::Sats;
use dashmap::DashMap;
use uuid::Uuid;

pub struct PlanRegistry {
    plans: DashMap<Uuid, PlanRecord>,
}

#[derive(Debug, Clone, Default)]
pub struct PlanPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub authorized_sats: Option<Sats>,
    pub interval_blocks: Option<u32>,
    pub per_call_sats: Option<Sats>,
    pub allowed_paths: Option<Vec<String>>,
    pub status: Option<PlanStatus>,
}

impl Default for PlanRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PlanRegistry {
    pub fn new() -> Self {
        PlanRegistry {
            plans: DashMap::new(),
        }
    }

    pub fn create(
        &self,
        name: String,
        description: Option<String>,
        authorized_sats: Sats,
        interval_blocks: u32,
        per_call_sats: Sats,
        allowed_paths: Vec<String>,
        merchant_address: String,
    ) -> PlanRecord {
        let allowed_paths = if allowed_paths.is_empty() {
            PlanRecord::default_allowed_paths()
        } else {
            allowed_paths
        };
        let plan = PlanRecord {
            plan_id: Uuid::new_v4(),
            name,
            description,
            authorized_sats,
            interval_blocks,
            per_call_sats,
            allowed_paths,
            merchant_address,
            status: PlanStatus::Active,
            subscriber_count: 0,
        };
        self.plans.insert(plan.plan_id, plan.clone());
        plan
    }

    pub fn get(&self, plan_id: Uuid) -> Option<PlanRecord> {
        self.plans.get(&plan_id).map(|p| p.clone())
    }

    pub fn list(&self) -> Vec<PlanRecord> {
        self.plans.iter().map(|p| p.clone()).collect()
    }

    pub fn patch(&self, plan_id: Uuid, patch: PlanPatch) -> Result<PlanRecord, StoreError> {
        let mut entry = self
            .plans
            .get_mut(&plan_id)
            .ok_or_else(|| StoreError::NotFound(plan_id.to_string()))?;
        if let Some(name) = patch.name {
            entry.name = name;
        }
        if let Some(description) = patch.description {
            entry.description = Some(description);
        }
        if let Some(authorized_sats) = patch.authorized_sats {
            entry.authorized_sats = authorized_sats;
        }
        if let Some(interval_blocks) = patch.interval_blocks {
            entry.interval_blocks = interval_blocks;
        }
        if let Some(per_call_sats) = patch.per_call_sats {
            entry.per_call_sats = per_call_sats;
        }
        if let Some(allowed_paths) = patch.allowed_paths {
            entry.allowed_paths = allowed_paths;
        }
        if let Some(status) = patch.status {
            entry.status = status;
        }
        Ok(entry.clone())
    }

    pub fn increment_subscribers(&self, plan_id: Uuid) -> Result<PlanRecord, StoreError> {
        let mut entry = self
            .plans
            .get_mut(&plan_id)
            .ok_or_else(|| StoreError::NotFound(plan_id.to_string()))?;
        entry.subscriber_count += 1;
        Ok(entry.clone())
    }

    /// Glob matching with `*` as a whole-path-segment wildcard
    /// (`spec.md` §4.7) — not worth a dependency for single-wildcard
    /// semantics.
    pub fn is_path_allowed(plan: &PlanRecord, path: &str) -> bool {
        plan.allowed_paths
            .iter()
            .any(|pattern| path_matches_glob(pattern, path))
    }
}

fn path_matches_glob(pattern: &str, path: &str) -> bool {
    let pattern_segments: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
    let path_segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    let mut pi = 0;
    let mut si = 0;
    while pi < pattern_segments.len() {
        match pattern_segments[pi] {
            "*" => {
                if pi == pattern_segments.len() - 1 {
                    return true;
                }
                if si >= path_segments.len() {
                    return false;
                }
            }
            segment => {
                if si >= path_segments.len() || path_segments[si] != segment {
                    return false;
                }
            }
        }
        pi += 1;
        si += 1;
    }
    si == path_segments.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_matches_any_single_segment_suffix() {
        assert!(path_matches_glob("/api/subscription/*", "/api/subscription/data"));
        assert!(!path_matches_glob("/api/subscription/*", "/api/other/data"));
    }

    #[test]
    fn exact_prefix_matches_default_pattern() {
        assert!(path_matches_glob("/api/*", "/api/premium/hello"));
    }

    #[test]
    fn increment_subscribers_is_monotonic() {
        let registry = PlanRegistry::new();
        let plan = registry.create(
            "basic".into(),
            None,
            Sats::new(20_000),
            144,
            Sats::new(546),
            vec![],
            "bchtest:merchant".into(),
        );
        registry.increment_subscribers(plan.plan_id).unwrap();
        let updated = registry.get(plan.plan_id).unwrap();
        assert_eq!(updated.subscriber_count, 1);
    }
}
