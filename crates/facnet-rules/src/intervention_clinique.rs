//! Intervention Clinique Daily Limit (§4.6 D): codes 8857 (fixed 30 min)
//! and 8859 (`unites` minutes), capped at 180 minutes per physician per day,
//! excluding records carrying an ICEP/ICSM/ICTOX context.

use anyhow::Result;
use async_trait::async_trait;
use facnet_cache::ReferenceCache;
use facnet_schemas::rule_data::InterventionCliniqueData;
use facnet_schemas::{BillingRecord, RuleData, Severity, ValidationResult};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{elements_contains_any, group_by, RuleHandler};

const CODE_FIXED_30MIN: &str = "8857";
const CODE_PER_UNIT: &str = "8859";
const EXCLUDED_CONTEXTS: &[&str] = &["ICEP", "ICSM", "ICTOX"];
const DAILY_CAP_MINUTES: i32 = 180;
const FIXED_MINUTES: i32 = 30;

fn minutes_for(record: &BillingRecord) -> i32 {
    if record.code == CODE_FIXED_30MIN {
        FIXED_MINUTES
    } else {
        record.unites.unwrap_or(Decimal::ZERO).round().to_i32().unwrap_or(0)
    }
}

pub struct InterventionCliniqueRule;

#[async_trait]
impl RuleHandler for InterventionCliniqueRule {
    fn id(&self) -> &str {
        "intervention_clinique_daily_max"
    }

    async fn run(&self, records: &[BillingRecord], run_id: Uuid, _cache: &ReferenceCache) -> Result<Vec<ValidationResult>> {
        let eligible: Vec<&BillingRecord> = records
            .iter()
            .filter(|r| (r.code == CODE_FIXED_30MIN || r.code == CODE_PER_UNIT) && !elements_contains_any(&r.element_contexte, EXCLUDED_CONTEXTS))
            .collect();

        let groups = group_by(eligible.iter().copied(), |r| (r.doctor_info.clone(), r.date_service));

        let mut results = Vec::new();
        let mut all_touched = Vec::new();

        for ((doctor_info, date_service), group) in &groups {
            all_touched.extend(group.iter().map(|r| r.id));
            let total_minutes: i32 = group.iter().map(|r| minutes_for(r)).sum();
            if total_minutes <= DAILY_CAP_MINUTES {
                continue;
            }

            let ids: Vec<Uuid> = group.iter().map(|r| r.id).collect();
            let unpaid: Vec<&&BillingRecord> = group.iter().filter(|r| r.montant_paye == Decimal::ZERO).collect();
            let all_paid = unpaid.is_empty();
            let unpaid_sum: Decimal = unpaid.iter().map(|r| r.montant_preliminaire).sum();

            if !all_paid {
                results.push(ValidationResult::new_finding(
                    run_id,
                    "intervention_clinique_daily_max",
                    None,
                    None,
                    Severity::Error,
                    "intervention_clinique",
                    format!("{total_minutes} minutes d'intervention clinique facturees le {date_service}, depassant le plafond quotidien de {DAILY_CAP_MINUTES} minutes."),
                    Some("Ajouter un contexte exclu (ICEP/ICSM/ICTOX) ou annuler les factures non payees en exces.".to_string()),
                    ids,
                    RuleData::InterventionClinique(InterventionCliniqueData {
                        doctor_info: doctor_info.clone(),
                        date_service: *date_service,
                        total_minutes_billed: total_minutes,
                        daily_cap_minutes: DAILY_CAP_MINUTES,
                        excess_minutes: total_minutes - DAILY_CAP_MINUTES,
                        monetary_impact: -unpaid_sum,
                        all_paid: false,
                    }),
                ));
            } else {
                results.push(ValidationResult::new_info_summary(
                    run_id,
                    "intervention_clinique_daily_max",
                    "intervention_clinique",
                    format!("{total_minutes} minutes d'intervention clinique facturees et payees le {date_service}, au-dela du plafond de {DAILY_CAP_MINUTES} minutes."),
                    &ids,
                    RuleData::InterventionClinique(InterventionCliniqueData {
                        doctor_info: doctor_info.clone(),
                        date_service: *date_service,
                        total_minutes_billed: total_minutes,
                        daily_cap_minutes: DAILY_CAP_MINUTES,
                        excess_minutes: total_minutes - DAILY_CAP_MINUTES,
                        monetary_impact: Decimal::ZERO,
                        all_paid: true,
                    }),
                ));
            }
        }

        if !all_touched.is_empty() {
            results.push(ValidationResult::new_info_summary(
                run_id,
                "intervention_clinique_daily_max",
                "intervention_clinique",
                format!("{} facture(s) d'intervention clinique analysee(s).", all_touched.len()),
                &all_touched,
                RuleData::Generic(serde_json::json!({ "monetaryImpact": "0" })),
            ));
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_code_minutes_is_constant() {
        let r = BillingRecord {
            id: Uuid::new_v4(),
            validation_run_id: Uuid::new_v4(),
            facture: "F1".into(),
            id_ramq: "R1".into(),
            patient: "P1".into(),
            doctor_info: "Dr. A".into(),
            date_service: chrono::NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            debut: None,
            fin: None,
            lieu_pratique: "L1".into(),
            secteur_activite: None,
            diagnostic: None,
            code: CODE_FIXED_30MIN.to_string(),
            unites: None,
            element_contexte: String::new(),
            montant_preliminaire: Decimal::ZERO,
            montant_paye: Decimal::ZERO,
            custom_fields: serde_json::Value::Null,
            created_at: chrono::Utc::now(),
        };
        assert_eq!(minutes_for(&r), 30);
    }
}
