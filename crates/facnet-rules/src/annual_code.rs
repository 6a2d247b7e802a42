//! Annual Billing Code Rule (§4.6 B): codes whose `leaf` marks them as an
//! annual forfait (take-charge / periodic visit), billed at most once per
//! patient per calendar year.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Datelike;
use facnet_cache::ReferenceCache;
use facnet_schemas::rule_data::AnnualCodeData;
use facnet_schemas::{BillingRecord, RuleData, Severity, ValidationResult};
use rust_decimal::Decimal;
use std::collections::HashSet;
use uuid::Uuid;

use crate::{group_by, RuleHandler};

const ANNUAL_LEAVES: &[&str] = &["Visite de prise en charge", "Visite périodique"];

pub struct AnnualCodeRule;

#[async_trait]
impl RuleHandler for AnnualCodeRule {
    fn id(&self) -> &str {
        "annual_billing_code"
    }

    async fn run(&self, records: &[BillingRecord], run_id: Uuid, cache: &ReferenceCache) -> Result<Vec<ValidationResult>> {
        let codes = cache.codes().await;
        let annual_codes: HashSet<&str> = codes
            .iter()
            .filter(|c| c.leaf.as_deref().is_some_and(|leaf| ANNUAL_LEAVES.contains(&leaf)))
            .map(|c| c.code.as_str())
            .collect();

        let tariff_of: std::collections::HashMap<&str, Decimal> = codes.iter().map(|c| (c.code.as_str(), c.tariff_value)).collect();

        let annual_records: Vec<&BillingRecord> = records.iter().filter(|r| annual_codes.contains(r.code.as_str())).collect();

        let groups = group_by(annual_records.iter().copied(), |r| (r.patient.clone(), r.date_service.year()));

        let mut results = Vec::new();
        let mut all_touched = Vec::new();

        for ((patient, _year), group) in &groups {
            all_touched.extend(group.iter().map(|r| r.id));

            if group.len() == 1 {
                let r = group[0];
                results.push(ValidationResult::new_info_summary(
                    run_id,
                    "annual_billing_code",
                    "annual_code",
                    format!("Code annuel {} facture une seule fois pour ce patient en {}.", r.code, r.date_service.year()),
                    &[r.id],
                    RuleData::AnnualCode(AnnualCodeData {
                        code: r.code.clone(),
                        doctor_info: r.doctor_info.clone(),
                        patient: patient.clone(),
                        occurrence_count: 1,
                        first_date_service: r.date_service,
                        duplicate_dates_service: vec![],
                        monetary_impact: Decimal::ZERO,
                        total_unpaid_amount: Decimal::ZERO,
                    }),
                ));
                continue;
            }

            let mut sorted: Vec<&&BillingRecord> = group.iter().collect();
            sorted.sort_by_key(|r| r.date_service);

            let paid: Vec<&&&BillingRecord> = sorted.iter().filter(|r| r.montant_paye > Decimal::ZERO).collect();
            let unpaid_ids: Vec<Uuid> = sorted.iter().filter(|r| r.montant_paye == Decimal::ZERO).map(|r| r.id).collect();
            let total_unpaid_amount: Decimal = sorted
                .iter()
                .filter(|r| r.montant_paye == Decimal::ZERO)
                .map(|r| r.montant_preliminaire)
                .sum();
            let first = sorted[0];
            let code = first.code.clone();
            let tariff = tariff_of.get(code.as_str()).copied().unwrap_or(Decimal::ZERO);
            let all_ids: Vec<Uuid> = sorted.iter().map(|r| r.id).collect();
            let dates: Vec<chrono::NaiveDate> = sorted.iter().map(|r| r.date_service).collect();

            if paid.len() > 1 {
                results.push(ValidationResult::new_finding(
                    run_id,
                    "annual_billing_code",
                    None,
                    None,
                    Severity::Error,
                    "annual_code",
                    format!("Code annuel {code} facture et paye {} fois pour le meme patient en une annee. Contacter la RAMQ.", paid.len()),
                    Some("Contacter la RAMQ pour resoudre le paiement multiple.".to_string()),
                    all_ids,
                    RuleData::AnnualCode(AnnualCodeData {
                        code,
                        doctor_info: first.doctor_info.clone(),
                        patient: patient.clone(),
                        occurrence_count: sorted.len() as i32,
                        first_date_service: first.date_service,
                        duplicate_dates_service: dates,
                        monetary_impact: Decimal::ZERO,
                        total_unpaid_amount,
                    }),
                ));
            } else if paid.len() == 1 {
                results.push(ValidationResult::new_finding(
                    run_id,
                    "annual_billing_code",
                    None,
                    None,
                    Severity::Error,
                    "annual_code",
                    format!("Code annuel {code} facture {} fois; une seule occurrence payee, les autres doivent etre annulees.", sorted.len()),
                    Some(format!("Annuler les factures non payees: {unpaid_ids:?}")),
                    all_ids,
                    RuleData::AnnualCode(AnnualCodeData {
                        code,
                        doctor_info: first.doctor_info.clone(),
                        patient: patient.clone(),
                        occurrence_count: sorted.len() as i32,
                        first_date_service: first.date_service,
                        duplicate_dates_service: dates,
                        monetary_impact: Decimal::ZERO,
                        total_unpaid_amount,
                    }),
                ));
            } else {
                results.push(ValidationResult::new_finding(
                    run_id,
                    "annual_billing_code",
                    None,
                    None,
                    Severity::Error,
                    "annual_code",
                    format!("Code annuel {code} facture {} fois, aucune occurrence payee.", sorted.len()),
                    Some("Valider le motif de refus aupres de la RAMQ.".to_string()),
                    all_ids,
                    RuleData::AnnualCode(AnnualCodeData {
                        code,
                        doctor_info: first.doctor_info.clone(),
                        patient: patient.clone(),
                        occurrence_count: sorted.len() as i32,
                        first_date_service: first.date_service,
                        duplicate_dates_service: dates,
                        monetary_impact: tariff,
                        total_unpaid_amount,
                    }),
                ));
            }
        }

        if !all_touched.is_empty() {
            results.push(ValidationResult::new_info_summary(
                run_id,
                "annual_billing_code",
                "annual_code",
                format!("{} facture(s) de code annuel analysee(s).", all_touched.len()),
                &all_touched,
                RuleData::Generic(serde_json::json!({ "monetaryImpact": "0" })),
            ));
        }

        Ok(results)
    }
}
