// DB-backed test, skipped if FACNET_DATABASE_URL is not set.
//
// Covers the rule-catalogue scenarios whose handlers read `cache.codes()`
// (annual_code, gmf_8875), so a real reference-data row has to exist behind
// the cache rather than being stubbed at the call site.

use facnet_cache::ReferenceCache;
use facnet_rules::RuleHandler;
use facnet_schemas::rule_data::{AnnualCodeData, Gmf8875Data};
use facnet_schemas::{BillingRecord, Code, Establishment, RuleData};
use rust_decimal::Decimal;
use uuid::Uuid;

async fn pool_or_skip() -> Option<sqlx::PgPool> {
    let url = match std::env::var(facnet_db::ENV_DB_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: FACNET_DATABASE_URL not set");
            return None;
        }
    };
    let pool = sqlx::postgres::PgPoolOptions::new().max_connections(2).connect(&url).await.unwrap();
    facnet_db::migrate(&pool).await.unwrap();
    Some(pool)
}

fn record(code: &str, patient: &str, date: chrono::NaiveDate, paid: &str) -> BillingRecord {
    BillingRecord {
        id: Uuid::new_v4(),
        validation_run_id: Uuid::new_v4(),
        facture: format!("F-{patient}-{date}"),
        id_ramq: "RAMQ1".to_string(),
        patient: patient.to_string(),
        doctor_info: "Dr. Tremblay".to_string(),
        date_service: date,
        debut: None,
        fin: None,
        lieu_pratique: "Clinique".to_string(),
        secteur_activite: None,
        diagnostic: None,
        code: code.to_string(),
        unites: None,
        element_contexte: String::new(),
        montant_preliminaire: Decimal::new(4500, 2),
        montant_paye: paid.parse().unwrap(),
        custom_fields: serde_json::Value::Null,
        created_at: chrono::Utc::now(),
    }
}

#[tokio::test]
async fn s2_annual_code_billed_twice_all_unpaid_yields_error_with_tariff_impact() {
    let Some(pool) = pool_or_skip().await else { return };

    facnet_db::upsert_code(
        &pool,
        &Code {
            code: "8888".to_string(),
            description: "Visite de prise en charge".to_string(),
            tariff_value: Decimal::new(4500, 2),
            leaf: Some("Visite de prise en charge".to_string()),
            top_level: None,
            level1_group: None,
            active: true,
        },
    )
    .await
    .unwrap();

    let run_id = Uuid::new_v4();
    let records = vec![
        record("8888", "patient-a", chrono::NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(), "0"),
        record("8888", "patient-a", chrono::NaiveDate::from_ymd_opt(2025, 8, 15).unwrap(), "0"),
    ];

    let cache = ReferenceCache::new(pool);
    let rule = facnet_rules::AnnualCodeRule;
    let results = rule.run(&records, run_id, &cache).await.unwrap();

    let err = results
        .iter()
        .find(|r| matches!(&r.rule_data, RuleData::AnnualCode(d) if d.occurrence_count == 2))
        .expect("expected an annual-code error for the duplicate billing");
    match &err.rule_data {
        RuleData::AnnualCode(AnnualCodeData { monetary_impact, .. }) => {
            assert_eq!(*monetary_impact, Decimal::new(4500, 2), "all-unpaid case carries the code's tariff as impact");
        }
        other => panic!("unexpected rule data: {other:?}"),
    }
}

#[tokio::test]
async fn s3_gmf_8875_missed_opportunity_on_qualifying_unflagged_visit() {
    let Some(pool) = pool_or_skip().await else { return };

    facnet_db::upsert_code(
        &pool,
        &Code {
            code: "8857".to_string(),
            description: "Intervention clinique".to_string(),
            tariff_value: Decimal::new(3000, 2),
            leaf: None,
            top_level: None,
            level1_group: Some("Visites sur rendez-vous (patient de moins de 80 ans)".to_string()),
            active: true,
        },
    )
    .await
    .unwrap();

    facnet_db::upsert_establishment(
        &pool,
        &Establishment {
            numero: "EP33-LOCATION".to_string(),
            name: "GMF Rosemont".to_string(),
            ep33: true,
        },
    )
    .await
    .unwrap();

    let run_id = Uuid::new_v4();
    let mut qualifying = record("8857", "patient-b", chrono::NaiveDate::from_ymd_opt(2025, 4, 2).unwrap(), "30.00");
    qualifying.lieu_pratique = "EP33-LOCATION".to_string();

    let cache = ReferenceCache::new(pool);
    let rule = facnet_rules::Gmf8875Rule;
    let results = rule.run(std::slice::from_ref(&qualifying), run_id, &cache).await.unwrap();

    assert!(
        results.iter().any(|r| matches!(&r.rule_data, RuleData::Gmf8875(Gmf8875Data { finding, .. }) if finding == "missed_opportunity")),
        "expected a missed-opportunity finding for the qualifying, unflagged visit"
    );
}
