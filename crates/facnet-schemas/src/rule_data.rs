//! Per-rule structured payloads attached to a [`crate::ValidationResult`].
//!
//! Each in-code rule handler (office fees, annual code, GMF 8875,
//! intervention clinique, visit duration) gets its own variant so the
//! orchestrator and the UI can render rule-specific fields without parsing
//! JSON by hand. Data-driven rule types (F1-F9) fall back to `Generic`,
//! since their shape is whatever the `rules.condition` row describes.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "ruleId")]
pub enum RuleData {
    #[serde(rename = "office_fee_19928_19929")]
    OfficeFee(OfficeFeeData),
    #[serde(rename = "annual_billing_code")]
    AnnualCode(AnnualCodeData),
    #[serde(rename = "gmf_forfait_8875")]
    Gmf8875(Gmf8875Data),
    #[serde(rename = "intervention_clinique_daily_max")]
    InterventionClinique(InterventionCliniqueData),
    #[serde(rename = "visit_duration_optimization")]
    VisitDuration(VisitDurationData),
    Generic(serde_json::Value),
}

// `#[serde(other)]` only works on a unit variant, and `Generic` carries a
// payload, so the catch-all has to be written by hand: buffer to a `Value`,
// look at `ruleId`, and only fall through to `Generic` when it doesn't match
// one of the in-code rule families.
impl<'de> Deserialize<'de> for RuleData {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        let rule_id = value.get("ruleId").and_then(|v| v.as_str()).unwrap_or("");

        let known = match rule_id {
            "office_fee_19928_19929" => {
                Some(serde_json::from_value(value.clone()).map(RuleData::OfficeFee))
            }
            "annual_billing_code" => {
                Some(serde_json::from_value(value.clone()).map(RuleData::AnnualCode))
            }
            "gmf_forfait_8875" => Some(serde_json::from_value(value.clone()).map(RuleData::Gmf8875)),
            "intervention_clinique_daily_max" => {
                Some(serde_json::from_value(value.clone()).map(RuleData::InterventionClinique))
            }
            "visit_duration_optimization" => {
                Some(serde_json::from_value(value.clone()).map(RuleData::VisitDuration))
            }
            _ => None,
        };

        match known {
            Some(result) => result.map_err(serde::de::Error::custom),
            None => Ok(RuleData::Generic(value)),
        }
    }
}

impl RuleData {
    /// Monetary impact is meaningful across every rule family — centralized
    /// here so callers never have to match on the variant just to sum up a
    /// run's dollar exposure.
    pub fn monetary_impact(&self) -> Option<Decimal> {
        match self {
            RuleData::OfficeFee(d) => Some(d.monetary_impact),
            RuleData::AnnualCode(d) => Some(d.monetary_impact),
            RuleData::Gmf8875(d) => Some(d.monetary_impact),
            RuleData::InterventionClinique(d) => Some(d.monetary_impact),
            RuleData::VisitDuration(d) => Some(d.potential_additional_revenue),
            RuleData::Generic(v) => v
                .get("monetaryImpact")
                .and_then(|x| x.as_str())
                .and_then(|s| s.parse().ok()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfficeFeeData {
    pub doctor_info: String,
    pub date_service: chrono::NaiveDate,
    pub registered_patient_count: i32,
    pub walk_in_patient_count: i32,
    pub threshold_required: i32,
    pub code_billed: String,
    pub expected_tariff: Decimal,
    pub monetary_impact: Decimal,
    pub daily_cap: Decimal,
    pub overage: Decimal,
    pub finding: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnualCodeData {
    pub code: String,
    pub doctor_info: String,
    pub patient: String,
    pub occurrence_count: i32,
    pub first_date_service: chrono::NaiveDate,
    pub duplicate_dates_service: Vec<chrono::NaiveDate>,
    pub monetary_impact: Decimal,
    pub total_unpaid_amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gmf8875Data {
    pub establishment_numero: String,
    pub doctor_info: String,
    pub patient: String,
    pub date_service: chrono::NaiveDate,
    pub monetary_impact: Decimal,
    pub finding: String,
    pub excluded_tags_present: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterventionCliniqueData {
    pub doctor_info: String,
    pub date_service: chrono::NaiveDate,
    pub total_minutes_billed: i32,
    pub daily_cap_minutes: i32,
    pub excess_minutes: i32,
    pub monetary_impact: Decimal,
    pub all_paid: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisitDurationData {
    pub doctor_info: String,
    pub patient: String,
    pub date_service: chrono::NaiveDate,
    pub duration_minutes: i32,
    pub billed_code: String,
    pub billed_amount: Decimal,
    pub optimal_code_count: i32,
    pub potential_additional_revenue: Decimal,
}
