//! Data-driven rule loading (spec.md §4.6 F / §9 "Generic rule handlers from
//! a database row"). Each enabled [`facnet_schemas::Rule`] row is turned into
//! a [`RuleHandler`] by deserializing its `condition` JSON against the shape
//! its `rule_type` expects; rows that fail to parse, or that collide with the
//! reserved in-code rule ids, are logged and skipped rather than failing the
//! whole load.

mod handlers;
mod params;

use async_trait::async_trait;
use facnet_cache::ReferenceCache;
use facnet_schemas::{BillingRecord, Rule, ValidationResult};
use thiserror::Error;
use uuid::Uuid;

use crate::{RuleHandler, OFFICE_FEE_VALIDATION_ID};
use params::*;

#[derive(Debug, Error)]
pub enum GenericRuleError {
    #[error("rule {id}: unknown rule_type {rule_type}")]
    UnknownRuleType { id: String, rule_type: String },
    #[error("rule {id}: invalid condition JSON for rule_type {rule_type}: {source}")]
    InvalidCondition {
        id: String,
        rule_type: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("rule {id}: rule_type {rule_type} requires a threshold value")]
    MissingThreshold { id: String, rule_type: String },
}

enum Parsed {
    Prohibition(ProhibitionParams),
    TimeRestriction(TimeRestrictionParams),
    Requirement(RequirementParams),
    LocationRestriction(LocationRestrictionParams),
    AgeRestriction(AgeRestrictionParams),
    AmountLimit(AmountLimitParams, rust_decimal::Decimal),
    MutualExclusion(MutualExclusionParams),
    MissingAnnualOpportunity(MissingAnnualOpportunityParams),
    AnnualLimit(AnnualLimitParams),
}

fn parse_condition(rule: &Rule) -> Result<Parsed, GenericRuleError> {
    let invalid = |source| GenericRuleError::InvalidCondition {
        id: rule.id.clone(),
        rule_type: rule.rule_type.clone(),
        source,
    };

    match rule.rule_type.as_str() {
        "prohibition" => Ok(Parsed::Prohibition(serde_json::from_value(rule.condition.clone()).map_err(invalid)?)),
        "time_restriction" => Ok(Parsed::TimeRestriction(serde_json::from_value(rule.condition.clone()).map_err(invalid)?)),
        "requirement" => Ok(Parsed::Requirement(serde_json::from_value(rule.condition.clone()).map_err(invalid)?)),
        "location_restriction" => Ok(Parsed::LocationRestriction(serde_json::from_value(rule.condition.clone()).map_err(invalid)?)),
        "age_restriction" => Ok(Parsed::AgeRestriction(serde_json::from_value(rule.condition.clone()).map_err(invalid)?)),
        "amount_limit" => {
            let threshold = rule.threshold.ok_or_else(|| GenericRuleError::MissingThreshold {
                id: rule.id.clone(),
                rule_type: rule.rule_type.clone(),
            })?;
            Ok(Parsed::AmountLimit(serde_json::from_value(rule.condition.clone()).map_err(invalid)?, threshold))
        }
        "mutual_exclusion" => Ok(Parsed::MutualExclusion(serde_json::from_value(rule.condition.clone()).map_err(invalid)?)),
        "missing_annual_opportunity" => {
            Ok(Parsed::MissingAnnualOpportunity(serde_json::from_value(rule.condition.clone()).map_err(invalid)?))
        }
        "annual_limit" => Ok(Parsed::AnnualLimit(serde_json::from_value(rule.condition.clone()).map_err(invalid)?)),
        other => Err(GenericRuleError::UnknownRuleType {
            id: rule.id.clone(),
            rule_type: other.to_string(),
        }),
    }
}

struct GenericRuleHandler {
    id: String,
    parsed: Parsed,
}

#[async_trait]
impl RuleHandler for GenericRuleHandler {
    fn id(&self) -> &str {
        &self.id
    }

    async fn run(&self, records: &[BillingRecord], run_id: Uuid, cache: &ReferenceCache) -> anyhow::Result<Vec<ValidationResult>> {
        let results = match &self.parsed {
            Parsed::Prohibition(p) => handlers::prohibition(&self.id, p, records, run_id),
            Parsed::TimeRestriction(p) => handlers::time_restriction(&self.id, p, records, run_id),
            Parsed::Requirement(p) => handlers::requirement(&self.id, p, records, run_id),
            Parsed::LocationRestriction(p) => {
                let establishments = cache.establishments().await;
                handlers::location_restriction(&self.id, p, records, run_id, &establishments)
            }
            Parsed::AgeRestriction(p) => handlers::age_restriction(&self.id, p, records, run_id),
            Parsed::AmountLimit(p, threshold) => handlers::amount_limit(&self.id, p, *threshold, records, run_id),
            Parsed::MutualExclusion(p) => handlers::mutual_exclusion(&self.id, p, records, run_id),
            Parsed::MissingAnnualOpportunity(p) => {
                let establishments = cache.establishments().await;
                handlers::missing_annual_opportunity(&self.id, p, records, run_id, &establishments)
            }
            Parsed::AnnualLimit(p) => handlers::annual_limit(&self.id, p, records, run_id),
        };
        Ok(results)
    }
}

/// Turns enabled `rules` table rows into handlers. The reserved
/// `office_fee_validation` id is always the in-code [`crate::office_fees::OfficeFeeRule`];
/// a database row claiming that id is logged and skipped here rather than at
/// registration time, so the skip reason is attributable to the loader.
pub fn load_generic_rules(rules: &[Rule]) -> Vec<Box<dyn RuleHandler>> {
    let mut handlers: Vec<Box<dyn RuleHandler>> = Vec::new();

    for rule in rules.iter().filter(|r| r.enabled) {
        if rule.id == OFFICE_FEE_VALIDATION_ID {
            tracing::warn!(rule_id = %rule.id, "reserved rule id claimed by a database row, in-code handler wins");
            continue;
        }

        match parse_condition(rule) {
            Ok(parsed) => handlers.push(Box::new(GenericRuleHandler { id: rule.id.clone(), parsed })),
            Err(err) => tracing::warn!(rule_id = %rule.id, rule_type = %rule.rule_type, error = %err, "skipping rule with invalid definition"),
        }
    }

    handlers
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rule(id: &str, rule_type: &str, condition: serde_json::Value) -> Rule {
        Rule {
            id: id.to_string(),
            name: id.to_string(),
            rule_type: rule_type.to_string(),
            condition,
            threshold: None,
            enabled: true,
        }
    }

    #[test]
    fn unknown_rule_type_is_skipped_not_fatal() {
        let rules = vec![rule("r1", "not_a_real_type", json!({}))];
        let handlers = load_generic_rules(&rules);
        assert!(handlers.is_empty());
    }

    #[test]
    fn reserved_office_fee_id_is_skipped() {
        let rules = vec![rule(OFFICE_FEE_VALIDATION_ID, "prohibition", json!({ "codes": ["1", "2"] }))];
        let handlers = load_generic_rules(&rules);
        assert!(handlers.is_empty());
    }

    #[test]
    fn valid_prohibition_row_loads() {
        let rules = vec![rule("r2", "prohibition", json!({ "codes": ["1", "2"] }))];
        let handlers = load_generic_rules(&rules);
        assert_eq!(handlers.len(), 1);
        assert_eq!(handlers[0].id(), "r2");
    }

    #[test]
    fn amount_limit_without_threshold_is_skipped() {
        let rules = vec![rule("r3", "amount_limit", json!({ "codes": ["1"], "group_by": "doctor" }))];
        let handlers = load_generic_rules(&rules);
        assert!(handlers.is_empty());
    }
}
