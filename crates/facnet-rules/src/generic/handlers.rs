//! Evaluation logic for each data-driven `ruleType` (spec.md §4.6 F).

use chrono::Datelike;
use facnet_schemas::{elements_contains, BillingRecord, Establishment, RuleData, Severity, ValidationResult};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::group_by;

use super::params::*;

fn info(run_id: Uuid, rule_id: &str, category: &str, message: String, ids: &[Uuid]) -> Option<ValidationResult> {
    if ids.is_empty() {
        return None;
    }
    Some(ValidationResult::new_info_summary(
        run_id,
        rule_id,
        category,
        message,
        ids,
        RuleData::Generic(serde_json::json!({ "monetaryImpact": "0" })),
    ))
}

pub fn prohibition(rule_id: &str, params: &ProhibitionParams, records: &[BillingRecord], run_id: Uuid) -> Vec<ValidationResult> {
    let mut results = Vec::new();
    let mut touched = Vec::new();

    let by_facture = group_by(records.iter(), |r| r.facture.clone());
    for (facture, group) in &by_facture {
        let present: Vec<&&BillingRecord> = group.iter().filter(|r| params.codes.contains(&r.code)).collect();
        if present.len() >= 2 {
            let ids: Vec<Uuid> = present.iter().map(|r| r.id).collect();
            touched.extend(ids.iter().copied());
            let codes: Vec<&str> = present.iter().map(|r| r.code.as_str()).collect();
            results.push(ValidationResult::new_finding(
                run_id,
                rule_id,
                None,
                None,
                Severity::Error,
                "prohibition",
                format!("La facture {facture} combine des codes qui ne peuvent coexister: {}.", codes.join(", ")),
                Some("Retirer l'un des codes en conflit de la facture.".to_string()),
                ids,
                RuleData::Generic(serde_json::json!({ "monetaryImpact": "0", "facture": facture, "codes": codes })),
            ));
        }
    }

    if let Some(r) = info(run_id, rule_id, "prohibition", format!("{} facture(s) evaluee(s) pour prohibition de codes.", by_facture.len()), &touched) {
        results.push(r);
    }
    results
}

fn in_window(time: &str, window: &TimeWindow) -> bool {
    match (time.split_once(':'), window.start.split_once(':'), window.end.split_once(':')) {
        (Some(_), Some(_), Some(_)) => time >= window.start.as_str() && time <= window.end.as_str(),
        _ => true,
    }
}

pub fn time_restriction(rule_id: &str, params: &TimeRestrictionParams, records: &[BillingRecord], run_id: Uuid) -> Vec<ValidationResult> {
    let mut results = Vec::new();
    let mut touched = Vec::new();

    for record in records.iter().filter(|r| params.codes.contains(&r.code)) {
        touched.push(record.id);
        let Some(debut) = &record.debut else { continue };
        if !in_window(debut, &params.window) {
            results.push(ValidationResult::new_finding(
                run_id,
                rule_id,
                Some(record.id),
                Some(record.id_ramq.clone()),
                Severity::Error,
                "time_restriction",
                format!(
                    "Le code {} a ete facture a {debut}, hors de la fenetre autorisee {}-{}.",
                    record.code, params.window.start, params.window.end
                ),
                Some("Verifier l'heure de debut facturee.".to_string()),
                vec![record.id],
                RuleData::Generic(serde_json::json!({ "monetaryImpact": "0" })),
            ));
        }
    }

    if let Some(r) = info(run_id, rule_id, "time_restriction", format!("{} facture(s) evaluee(s) pour restriction horaire.", touched.len()), &touched) {
        results.push(r);
    }
    results
}

pub fn requirement(rule_id: &str, params: &RequirementParams, records: &[BillingRecord], run_id: Uuid) -> Vec<ValidationResult> {
    let mut results = Vec::new();
    let mut touched = Vec::new();

    for record in records.iter().filter(|r| params.codes.contains(&r.code)) {
        touched.push(record.id);
        if !elements_contains(&record.element_contexte, &params.required_context) {
            results.push(ValidationResult::new_finding(
                run_id,
                rule_id,
                Some(record.id),
                Some(record.id_ramq.clone()),
                Severity::Error,
                "requirement",
                format!("Le code {} requiert le contexte {} qui est absent.", record.code, params.required_context),
                Some(format!("Ajouter le contexte {} ou retirer le code.", params.required_context)),
                vec![record.id],
                RuleData::Generic(serde_json::json!({ "monetaryImpact": "0" })),
            ));
        }
    }

    if let Some(r) = info(run_id, rule_id, "requirement", format!("{} facture(s) evaluee(s) pour exigence de contexte.", touched.len()), &touched) {
        results.push(r);
    }
    results
}

pub fn location_restriction(
    rule_id: &str,
    params: &LocationRestrictionParams,
    records: &[BillingRecord],
    run_id: Uuid,
    establishments: &[Establishment],
) -> Vec<ValidationResult> {
    let mut results = Vec::new();
    let mut touched = Vec::new();

    for record in records.iter().filter(|r| params.codes.contains(&r.code)) {
        touched.push(record.id);
        let establishment = establishments.iter().find(|e| e.numero == record.lieu_pratique);
        let satisfies = match (establishment, params.establishment_predicate.ep33) {
            (Some(e), Some(expected)) => e.ep33 == expected,
            (None, Some(_)) => false,
            _ => true,
        };
        if !satisfies {
            results.push(ValidationResult::new_finding(
                run_id,
                rule_id,
                Some(record.id),
                Some(record.id_ramq.clone()),
                Severity::Error,
                "location_restriction",
                format!("Le code {} a ete facture dans un etablissement qui ne satisfait pas la restriction de lieu.", record.code),
                Some("Verifier l'etablissement de pratique facture.".to_string()),
                vec![record.id],
                RuleData::Generic(serde_json::json!({ "monetaryImpact": "0" })),
            ));
        }
    }

    if let Some(r) = info(run_id, rule_id, "location_restriction", format!("{} facture(s) evaluee(s) pour restriction de lieu.", touched.len()), &touched) {
        results.push(r);
    }
    results
}

/// Age inference is limited to what ingestion actually carries: a `custom_fields.age`
/// column, when the source CSV provided one. Records without an inferable age are
/// skipped rather than guessed at (spec.md §4.6 F names this predicate as conditional
/// on "when the ingestion provides it").
fn inferred_age(record: &BillingRecord) -> Option<i32> {
    record.custom_fields.get("age").and_then(|v| v.as_str()).and_then(|s| s.parse().ok())
}

pub fn age_restriction(rule_id: &str, params: &AgeRestrictionParams, records: &[BillingRecord], run_id: Uuid) -> Vec<ValidationResult> {
    let mut results = Vec::new();
    let mut touched = Vec::new();

    for record in records.iter().filter(|r| params.codes.contains(&r.code)) {
        let Some(age) = inferred_age(record) else { continue };
        touched.push(record.id);
        let below = params.min_age.is_some_and(|min| age < min);
        let above = params.max_age.is_some_and(|max| age > max);
        if below || above {
            results.push(ValidationResult::new_finding(
                run_id,
                rule_id,
                Some(record.id),
                Some(record.id_ramq.clone()),
                Severity::Error,
                "age_restriction",
                format!("Le code {} a ete facture pour un patient d'age {age}, hors de la plage admissible.", record.code),
                Some("Verifier l'age du patient ou le code facture.".to_string()),
                vec![record.id],
                RuleData::Generic(serde_json::json!({ "monetaryImpact": "0" })),
            ));
        }
    }

    if let Some(r) = info(run_id, rule_id, "age_restriction", format!("{} facture(s) evaluee(s) pour restriction d'age.", touched.len()), &touched) {
        results.push(r);
    }
    results
}

pub fn amount_limit(rule_id: &str, params: &AmountLimitParams, threshold: Decimal, records: &[BillingRecord], run_id: Uuid) -> Vec<ValidationResult> {
    let mut results = Vec::new();
    let mut touched = Vec::new();

    let eligible: Vec<&BillingRecord> = records.iter().filter(|r| params.codes.contains(&r.code)).collect();
    let groups = match params.group_by {
        GroupKey::Doctor => group_by(eligible.iter().copied(), |r| r.doctor_info.clone()),
        GroupKey::Patient => group_by(eligible.iter().copied(), |r| r.patient.clone()),
    };

    for (key, group) in &groups {
        let ids: Vec<Uuid> = group.iter().map(|r| r.id).collect();
        touched.extend(ids.iter().copied());
        let total: Decimal = group.iter().map(|r| r.montant_preliminaire).sum();
        if total > threshold {
            results.push(ValidationResult::new_finding(
                run_id,
                rule_id,
                None,
                None,
                Severity::Error,
                "amount_limit",
                format!("Le total facture pour {key} ({total}$) depasse le seuil de {threshold}$."),
                Some("Annuler ou ajuster les factures en exces du seuil.".to_string()),
                ids,
                RuleData::Generic(serde_json::json!({ "monetaryImpact": (threshold - total).to_string() })),
            ));
        }
    }

    if let Some(r) = info(run_id, rule_id, "amount_limit", format!("{} facture(s) evaluee(s) pour plafond de montant.", touched.len()), &touched) {
        results.push(r);
    }
    results
}

pub fn mutual_exclusion(rule_id: &str, params: &MutualExclusionParams, records: &[BillingRecord], run_id: Uuid) -> Vec<ValidationResult> {
    let mut results = Vec::new();
    let mut touched = Vec::new();

    let groups = match params.group_by {
        MutualExclusionGrouping::Invoice => group_by(records.iter(), |r| r.facture.clone()),
        MutualExclusionGrouping::Day => group_by(records.iter(), |r| format!("{}|{}", r.doctor_info, r.date_service)),
    };

    for (key, group) in &groups {
        let has_a = group.iter().any(|r| params.set_a.contains(&r.code));
        let has_b = group.iter().any(|r| params.set_b.contains(&r.code));
        if has_a && has_b {
            let ids: Vec<Uuid> = group
                .iter()
                .filter(|r| params.set_a.contains(&r.code) || params.set_b.contains(&r.code))
                .map(|r| r.id)
                .collect();
            touched.extend(ids.iter().copied());
            results.push(ValidationResult::new_finding(
                run_id,
                rule_id,
                None,
                None,
                Severity::Error,
                "mutual_exclusion",
                format!("Le regroupement {key} combine deux codes mutuellement exclusifs."),
                Some("Retirer l'un des deux codes en conflit.".to_string()),
                ids,
                RuleData::Generic(serde_json::json!({ "monetaryImpact": "0" })),
            ));
        } else {
            touched.extend(group.iter().map(|r| r.id));
        }
    }

    if let Some(r) = info(run_id, rule_id, "mutual_exclusion", format!("{} facture(s) evaluee(s) pour exclusion mutuelle.", touched.len()), &touched) {
        results.push(r);
    }
    results
}

pub fn missing_annual_opportunity(
    rule_id: &str,
    params: &MissingAnnualOpportunityParams,
    records: &[BillingRecord],
    run_id: Uuid,
    establishments: &[Establishment],
) -> Vec<ValidationResult> {
    let mut results = Vec::new();
    let mut touched = Vec::new();

    let ep33_locations: std::collections::HashSet<&str> = establishments
        .iter()
        .filter(|e| params.establishment_predicate.ep33 != Some(true) || e.ep33)
        .map(|e| e.numero.as_str())
        .collect();

    let billed_target: std::collections::HashSet<(String, i32)> = records
        .iter()
        .filter(|r| r.code == params.target_code)
        .map(|r| (r.patient.clone(), r.date_service.year()))
        .collect();

    let qualifying: Vec<&BillingRecord> = records
        .iter()
        .filter(|r| {
            params.opportunity_codes.contains(&r.code)
                && (params.establishment_predicate.ep33 != Some(true) || ep33_locations.contains(r.lieu_pratique.as_str()))
                && !params.excluded_tags.iter().any(|t| elements_contains(&r.element_contexte, t))
        })
        .collect();

    let groups = group_by(qualifying.iter().copied(), |r| (r.patient.clone(), r.date_service.year()));
    for ((patient, year), group) in &groups {
        if billed_target.contains(&(patient.clone(), *year)) {
            continue;
        }
        let mut sorted: Vec<&&BillingRecord> = group.iter().collect();
        sorted.sort_by_key(|r| r.date_service);
        let earliest = sorted[0];
        touched.push(earliest.id);

        results.push(ValidationResult::new_finding(
            run_id,
            rule_id,
            Some(earliest.id),
            Some(earliest.id_ramq.clone()),
            Severity::Optimization,
            "missing_annual_opportunity",
            format!("Visite admissible le {} sans le code {} facture pour ce patient en {year}.", earliest.date_service, params.target_code),
            Some(format!("Envisager de facturer le code {}.", params.target_code)),
            vec![earliest.id],
            RuleData::Generic(serde_json::json!({ "monetaryImpact": params.monetary_impact.to_string() })),
        ));
    }

    if let Some(r) = info(
        run_id,
        rule_id,
        "missing_annual_opportunity",
        format!("{} opportunite(s) annuelle(s) manquee(s) analysee(s).", touched.len()),
        &touched,
    ) {
        results.push(r);
    }
    results
}

pub fn annual_limit(rule_id: &str, params: &AnnualLimitParams, records: &[BillingRecord], run_id: Uuid) -> Vec<ValidationResult> {
    let mut results = Vec::new();
    let mut touched = Vec::new();

    let eligible: Vec<&BillingRecord> = records.iter().filter(|r| params.codes.contains(&r.code)).collect();
    let groups = group_by(eligible.iter().copied(), |r| (r.patient.clone(), r.date_service.year()));

    for ((patient, year), group) in &groups {
        let ids: Vec<Uuid> = group.iter().map(|r| r.id).collect();
        touched.extend(ids.iter().copied());
        if group.len() as i32 > params.limit {
            results.push(ValidationResult::new_finding(
                run_id,
                rule_id,
                None,
                None,
                Severity::Error,
                "annual_limit",
                format!("{} occurrence(s) facturee(s) pour le patient {patient} en {year}, au-dela de la limite annuelle de {}.", group.len(), params.limit),
                Some("Annuler les occurrences en exces de la limite annuelle.".to_string()),
                ids,
                RuleData::Generic(serde_json::json!({ "monetaryImpact": "0" })),
            ));
        }
    }

    if let Some(r) = info(run_id, rule_id, "annual_limit", format!("{} facture(s) evaluee(s) pour limite annuelle.", touched.len()), &touched) {
        results.push(r);
    }
    results
}
