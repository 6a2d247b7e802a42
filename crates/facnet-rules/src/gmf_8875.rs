//! GMF Forfait 8875 Rule (§4.6 C): duplicate-8875 detection plus
//! missed-opportunity detection for qualifying GMF visits never followed by
//! an 8875 claim.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Datelike;
use facnet_cache::ReferenceCache;
use facnet_schemas::rule_data::Gmf8875Data;
use facnet_schemas::{elements_contains, BillingRecord, RuleData, Severity, ValidationResult};
use rust_decimal::Decimal;
use std::collections::HashSet;
use uuid::Uuid;

use crate::group_by;
use crate::RuleHandler;

const CODE_8875: &str = "8875";
const QUALIFYING_CODES: &[&str] = &["8857", "8859"];
const QUALIFYING_GROUPS: &[&str] = &[
    "Visites sur rendez-vous (patient de 80 ans ou plus)",
    "Visites sur rendez-vous (patient de moins de 80 ans)",
];
const EXCLUDED_TAGS: &[&str] = &["MTA13", "GMFU", "GAP", "G160", "AR"];
const MISSED_OPPORTUNITY_IMPACT: Decimal = Decimal::from_parts(935, 0, 0, false, 2);

pub struct Gmf8875Rule;

#[async_trait]
impl RuleHandler for Gmf8875Rule {
    fn id(&self) -> &str {
        "gmf_forfait_8875"
    }

    async fn run(&self, records: &[BillingRecord], run_id: Uuid, cache: &ReferenceCache) -> Result<Vec<ValidationResult>> {
        let establishments = cache.establishments().await;
        let codes = cache.codes().await;
        let ep33_locations: HashSet<&str> = establishments.iter().filter(|e| e.ep33).map(|e| e.numero.as_str()).collect();
        let level1_group_of: std::collections::HashMap<&str, &str> = codes
            .iter()
            .filter_map(|c| c.level1_group.as_deref().map(|g| (c.code.as_str(), g)))
            .collect();

        let mut results = Vec::new();
        let mut all_touched = Vec::new();

        let by_patient_year_8875 = group_by(records.iter().filter(|r| r.code == CODE_8875), |r| (r.patient.clone(), r.date_service.year()));

        for ((patient, year), group) in &by_patient_year_8875 {
            all_touched.extend(group.iter().map(|r| r.id));
            let mut sorted: Vec<&&BillingRecord> = group.iter().collect();
            sorted.sort_by_key(|r| r.date_service);

            let first_paid_idx = sorted.iter().position(|r| r.montant_paye > Decimal::ZERO);
            if sorted.len() > 1 {
                if let Some(paid_idx) = first_paid_idx {
                    let first_paid_date = sorted[paid_idx].date_service;
                    for rec in sorted.iter().skip(paid_idx + 1) {
                        results.push(ValidationResult::new_finding(
                            run_id,
                            "gmf_forfait_8875",
                            Some(rec.id),
                            Some(rec.id_ramq.clone()),
                            Severity::Error,
                            "gmf_8875",
                            format!(
                                "Forfait 8875 deja facture et paye le {first_paid_date} pour ce patient en {year}; cette occurrence est en double."
                            ),
                            Some(format!("Annuler la facture en double (premiere occurrence payee le {first_paid_date}).")),
                            vec![rec.id],
                            RuleData::Gmf8875(Gmf8875Data {
                                establishment_numero: rec.lieu_pratique.clone(),
                                doctor_info: rec.doctor_info.clone(),
                                patient: patient.clone(),
                                date_service: rec.date_service,
                                monetary_impact: Decimal::ZERO,
                                finding: "duplicate_8875".to_string(),
                                excluded_tags_present: vec![],
                            }),
                        ));
                    }
                }
            }
        }

        let billed_8875_patients: HashSet<(String, i32)> = records
            .iter()
            .filter(|r| r.code == CODE_8875)
            .map(|r| (r.patient.clone(), r.date_service.year()))
            .collect();

        let qualifying: Vec<&BillingRecord> = records
            .iter()
            .filter(|r| {
                let code_qualifies = QUALIFYING_CODES.contains(&r.code.as_str())
                    || level1_group_of.get(r.code.as_str()).is_some_and(|g| QUALIFYING_GROUPS.contains(g));
                code_qualifies
                    && ep33_locations.contains(r.lieu_pratique.as_str())
                    && !EXCLUDED_TAGS.iter().any(|tag| elements_contains(&r.element_contexte, tag))
            })
            .collect();

        let by_patient_year_qualifying = group_by(qualifying.iter().copied(), |r| (r.patient.clone(), r.date_service.year()));

        for ((patient, year), group) in &by_patient_year_qualifying {
            if billed_8875_patients.contains(&(patient.clone(), *year)) {
                continue;
            }
            let mut sorted: Vec<&&BillingRecord> = group.iter().collect();
            sorted.sort_by_key(|r| r.date_service);
            let earliest = sorted[0];
            all_touched.push(earliest.id);

            let present_tags: Vec<String> = EXCLUDED_TAGS
                .iter()
                .filter(|t| facnet_schemas::elements_contains(&earliest.element_contexte, t))
                .map(|t| t.to_string())
                .collect();

            results.push(ValidationResult::new_finding(
                run_id,
                "gmf_forfait_8875",
                Some(earliest.id),
                Some(earliest.id_ramq.clone()),
                Severity::Optimization,
                "gmf_8875",
                format!("Visite GMF admissible le {} sans forfait 8875 facture pour ce patient en {year}.", earliest.date_service),
                Some("Envisager de facturer le forfait 8875.".to_string()),
                vec![earliest.id],
                RuleData::Gmf8875(Gmf8875Data {
                    establishment_numero: earliest.lieu_pratique.clone(),
                    doctor_info: earliest.doctor_info.clone(),
                    patient: patient.clone(),
                    date_service: earliest.date_service,
                    monetary_impact: MISSED_OPPORTUNITY_IMPACT,
                    finding: "missed_opportunity".to_string(),
                    excluded_tags_present: present_tags,
                }),
            ));
        }

        if !all_touched.is_empty() {
            results.push(ValidationResult::new_info_summary(
                run_id,
                "gmf_forfait_8875",
                "gmf_8875",
                format!("{} facture(s) liees au forfait 8875 analysee(s).", all_touched.len()),
                &all_touched,
                RuleData::Generic(serde_json::json!({ "monetaryImpact": "0" })),
            ));
        }

        Ok(results)
    }
}
