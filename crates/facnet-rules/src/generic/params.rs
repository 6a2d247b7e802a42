//! `rules.condition` JSON shapes, one struct per `rule_type`. Deserialization
//! failure at load time is the "invalid ruleType" rejection path (spec.md
//! §9 "Generic rule handlers from a database row"): log, skip, never panic.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct ProhibitionParams {
    pub codes: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct TimeWindow {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Deserialize)]
pub struct TimeRestrictionParams {
    pub codes: Vec<String>,
    pub window: TimeWindow,
}

#[derive(Debug, Deserialize)]
pub struct RequirementParams {
    pub codes: Vec<String>,
    pub required_context: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct EstablishmentPredicate {
    pub ep33: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct LocationRestrictionParams {
    pub codes: Vec<String>,
    #[serde(default)]
    pub establishment_predicate: EstablishmentPredicate,
}

#[derive(Debug, Deserialize)]
pub struct AgeRestrictionParams {
    pub codes: Vec<String>,
    pub min_age: Option<i32>,
    pub max_age: Option<i32>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum GroupKey {
    Doctor,
    Patient,
}

#[derive(Debug, Deserialize)]
pub struct AmountLimitParams {
    pub codes: Vec<String>,
    pub group_by: GroupKey,
}

#[derive(Debug, Deserialize)]
pub struct MutualExclusionParams {
    pub set_a: Vec<String>,
    pub set_b: Vec<String>,
    #[serde(default = "default_group_by_invoice")]
    pub group_by: MutualExclusionGrouping,
}

fn default_group_by_invoice() -> MutualExclusionGrouping {
    MutualExclusionGrouping::Invoice
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum MutualExclusionGrouping {
    Invoice,
    Day,
}

#[derive(Debug, Deserialize)]
pub struct MissingAnnualOpportunityParams {
    pub opportunity_codes: Vec<String>,
    pub target_code: String,
    #[serde(default)]
    pub excluded_tags: Vec<String>,
    #[serde(default)]
    pub establishment_predicate: EstablishmentPredicate,
    pub monetary_impact: rust_decimal::Decimal,
}

#[derive(Debug, Deserialize)]
pub struct AnnualLimitParams {
    pub codes: Vec<String>,
    #[serde(default = "default_annual_limit")]
    pub limit: i32,
}

fn default_annual_limit() -> i32 {
    1
}
