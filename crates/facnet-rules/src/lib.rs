//! Rule Engine (C5) + Rule Catalogue (C6).
//!
//! Every rule handler, whether hard-coded or data-driven, implements
//! [`RuleHandler`] and is registered by id into an [`IndexMap`] so iteration
//! order matches registration order (the "deterministic order derived from
//! input order" requirement has no other source of truth to fall back on).
//! A handler that errors is caught at the call site, logged, and contributes
//! zero results — it never aborts the run.

mod annual_code;
mod generic;
mod gmf_8875;
mod intervention_clinique;
mod office_fees;
mod visit_duration;

pub use annual_code::AnnualCodeRule;
pub use generic::{load_generic_rules, GenericRuleError};
pub use gmf_8875::Gmf8875Rule;
pub use intervention_clinique::InterventionCliniqueRule;
pub use office_fees::OfficeFeeRule;
pub use visit_duration::VisitDurationRule;

use anyhow::Result;
use async_trait::async_trait;
use facnet_cache::ReferenceCache;
use facnet_schemas::{BillingRecord, ValidationResult};
use indexmap::IndexMap;
use uuid::Uuid;

/// The reserved id for the in-code office-fee handler. A `rules` row
/// declaring `rule_type = "office_fee_validation"` collides with this and
/// is skipped (spec.md §9 Open Question, resolved in favor of the in-code
/// handler — see DESIGN.md).
pub const OFFICE_FEE_VALIDATION_ID: &str = "office_fee_validation";

#[async_trait]
pub trait RuleHandler: Send + Sync {
    fn id(&self) -> &str;

    async fn run(&self, records: &[BillingRecord], run_id: Uuid, cache: &ReferenceCache) -> Result<Vec<ValidationResult>>;
}

/// Ordered, id-keyed set of rule handlers. Registration order is iteration
/// order; a second registration under an id already present is rejected
/// rather than silently overwriting the first (mirrors the host codebase's
/// single-dispatcher-by-construction posture for its own validation set).
#[derive(Default)]
pub struct RuleRegistry {
    handlers: IndexMap<String, Box<dyn RuleHandler>>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: Box<dyn RuleHandler>) {
        let id = handler.id().to_string();
        if self.handlers.contains_key(&id) {
            tracing::warn!(rule_id = %id, "duplicate registration, in-code handler wins");
            return;
        }
        self.handlers.insert(id, handler);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.handlers.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Registry pre-loaded with the five hard-coded rule handlers (§4.6 A-E).
    pub fn with_hardcoded_rules() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(office_fees::OfficeFeeRule));
        registry.register(Box::new(annual_code::AnnualCodeRule));
        registry.register(Box::new(gmf_8875::Gmf8875Rule));
        registry.register(Box::new(intervention_clinique::InterventionCliniqueRule));
        registry.register(Box::new(visit_duration::VisitDurationRule));
        registry
    }

    /// Run every registered handler against `records`, isolating failures
    /// per spec.md §4.5 point 3 / §8 property 6: a handler that errors is
    /// logged and contributes zero results, other handlers still run.
    /// `progress` receives a value in `[50, 90]` as handlers complete.
    pub async fn run_all(
        &self,
        records: &[BillingRecord],
        run_id: Uuid,
        cache: &ReferenceCache,
        mut progress: impl FnMut(u8),
    ) -> Vec<ValidationResult> {
        let total = self.handlers.len().max(1);
        let mut all_results = Vec::new();

        for (completed, (id, handler)) in self.handlers.iter().enumerate() {
            match handler.run(records, run_id, cache).await {
                Ok(mut results) => all_results.append(&mut results),
                Err(err) => {
                    tracing::error!(rule_id = %id, error = %err, "rule handler failed, skipping");
                }
            }
            let pct = 50 + ((completed + 1) * 40 / total);
            progress(pct.min(90) as u8);
        }

        all_results
    }
}

/// Group borrowed records by a key, preserving first-seen key order and
/// within-key input order. Used by every rule that groups billing records
/// by `(doctor, date)` / `(patient, year)` style keys so iteration order is
/// deterministic without an explicit sort.
pub(crate) fn group_by<'a, K, F, I>(records: I, key_fn: F) -> IndexMap<K, Vec<&'a BillingRecord>>
where
    K: std::hash::Hash + Eq,
    F: Fn(&'a BillingRecord) -> K,
    I: IntoIterator<Item = &'a BillingRecord>,
{
    let mut groups: IndexMap<K, Vec<&'a BillingRecord>> = IndexMap::new();
    for record in records {
        groups.entry(key_fn(record)).or_default().push(record);
    }
    groups
}

/// `true` when `element_contexte` carries any of the excluded tags (exact
/// match after comma split, per spec.md §4.6 common conventions).
pub(crate) fn elements_contains_any(element_contexte: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| facnet_schemas::elements_contains(element_contexte, n))
}
