//! Visit Duration Optimization (§4.6 E): consultation/visit codes billed
//! for longer than the equivalent intervention-clinique billing would cost,
//! suggesting 8857/8859 in place of the billed code.

use anyhow::Result;
use async_trait::async_trait;
use facnet_cache::ReferenceCache;
use facnet_schemas::rule_data::VisitDurationData;
use facnet_schemas::{BillingRecord, RuleData, Severity, ValidationResult};
use rust_decimal::Decimal;
use std::collections::HashSet;
use uuid::Uuid;

use crate::RuleHandler;

const TOP_LEVEL_CONSULTATION: &str = "B - CONSULTATION, EXAMEN ET VISITE";
const EXCLUDED_CODES: &[&str] = &["8857", "8859"];
const MIN_DURATION_MINUTES: i64 = 30;
const BASE_RATE: Decimal = Decimal::from_parts(5970, 0, 0, false, 2);
const PER_15MIN_RATE: Decimal = Decimal::from_parts(2985, 0, 0, false, 2);

fn parse_hhmm(s: &str) -> Option<i64> {
    let (h, m) = s.trim().split_once(':')?;
    let h: i64 = h.trim().parse().ok()?;
    let m: i64 = m.trim().parse().ok()?;
    Some(h * 60 + m)
}

/// Duration in minutes, handling midnight crossing (`fin < debut` means the
/// visit crossed into the next day).
fn duration_minutes(debut: &str, fin: &str) -> Option<i64> {
    let start = parse_hhmm(debut)?;
    let mut end = parse_hhmm(fin)?;
    if end < start {
        end += 24 * 60;
    }
    Some(end - start)
}

/// $59.70 base plus $29.85 per additional 15-minute period beyond the first
/// 30 minutes, rounded up.
fn intervention_equivalent(duration_minutes: i64) -> (Decimal, i32) {
    if duration_minutes <= MIN_DURATION_MINUTES {
        return (BASE_RATE, 0);
    }
    let extra = duration_minutes - MIN_DURATION_MINUTES;
    let periods = ((extra as f64) / 15.0).ceil() as i32;
    (BASE_RATE + PER_15MIN_RATE * Decimal::from(periods), periods)
}

pub struct VisitDurationRule;

#[async_trait]
impl RuleHandler for VisitDurationRule {
    fn id(&self) -> &str {
        "visit_duration_optimization"
    }

    async fn run(&self, records: &[BillingRecord], run_id: Uuid, cache: &ReferenceCache) -> Result<Vec<ValidationResult>> {
        let codes = cache.codes().await;
        let consultation_codes: HashSet<&str> = codes
            .iter()
            .filter(|c| c.top_level.as_deref() == Some(TOP_LEVEL_CONSULTATION))
            .map(|c| c.code.as_str())
            .collect();

        let mut results = Vec::new();
        let mut all_touched = Vec::new();
        let mut total_potential: Decimal = Decimal::ZERO;

        for record in records {
            if !consultation_codes.contains(record.code.as_str()) || EXCLUDED_CODES.contains(&record.code.as_str()) {
                continue;
            }
            let (Some(debut), Some(fin)) = (&record.debut, &record.fin) else {
                continue;
            };
            let Some(duration) = duration_minutes(debut, fin) else {
                continue;
            };
            if duration < MIN_DURATION_MINUTES {
                continue;
            }

            all_touched.push(record.id);
            let (equivalent, periods) = intervention_equivalent(duration);
            if equivalent <= record.montant_preliminaire {
                continue;
            }

            let gain = equivalent - record.montant_preliminaire;
            total_potential += gain;
            let suggested_codes: Vec<&str> = if periods > 0 { vec!["8857", "8859"] } else { vec!["8857"] };

            results.push(ValidationResult::new_finding(
                run_id,
                "visit_duration_optimization",
                Some(record.id),
                Some(record.id_ramq.clone()),
                Severity::Optimization,
                "visit_duration",
                format!(
                    "Visite de {duration} minutes facturee au code {} ({} $); l'equivalent en intervention clinique aurait rapporte {equivalent} $.",
                    record.code, record.montant_preliminaire
                ),
                Some(format!("Envisager de facturer {}.", suggested_codes.join(" + "))),
                vec![record.id],
                RuleData::VisitDuration(VisitDurationData {
                    doctor_info: record.doctor_info.clone(),
                    patient: record.patient.clone(),
                    date_service: record.date_service,
                    duration_minutes: duration as i32,
                    billed_code: record.code.clone(),
                    billed_amount: record.montant_preliminaire,
                    optimal_code_count: suggested_codes.len() as i32,
                    potential_additional_revenue: gain,
                }),
            ));
        }

        if !all_touched.is_empty() {
            results.push(ValidationResult::new_info_summary(
                run_id,
                "visit_duration_optimization",
                "visit_duration",
                format!(
                    "{} visite(s) analysee(s) pour l'optimisation de duree; gain potentiel total: {total_potential} $.",
                    all_touched.len()
                ),
                &all_touched,
                RuleData::Generic(serde_json::json!({ "monetaryImpact": total_potential.to_string() })),
            ));
        }

        Ok(results)
    }
}
