//! Fixture and bootstrap helpers shared by the integration test suites
//! under each crate's `tests/` directory: a migrated pool, a seeded
//! user/file/run triple, and builders for the CSV rows `facnet-ingest`
//! expects and the reference entities `facnet-rules` checks against.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use facnet_db::{NewUploadedFile, NewValidationRun};
use facnet_schemas::{BillingRecord, Code, Establishment};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

/// Connects using `FACNET_DATABASE_URL` and runs migrations. Callers that
/// want a skip-if-unset test should check `std::env::var(facnet_db::
/// ENV_DB_URL)` themselves before calling this.
pub async fn db_pool() -> Result<PgPool> {
    facnet_db::testkit_db_pool().await
}

/// A user, an uploaded file row and a queued validation run, wired
/// together the way the orchestrator and queue expect to find them.
pub struct SeededRun {
    pub user_id: Uuid,
    pub file_id: Uuid,
    pub run_id: Uuid,
}

/// Insert a user + uploaded_files row + validation_runs row. `stored_name`
/// should match a file actually written under the caller's storage dir if
/// the test goes on to call `facnet_orchestrator::run_validation`.
pub async fn seed_validation_run(pool: &PgPool, stored_name: &str) -> Result<SeededRun> {
    let (user_id,): (Uuid,) =
        sqlx::query_as("insert into users (display_name, email) values ($1, $2) returning id")
            .bind("Testkit User")
            .bind(format!("testkit-{}@example.test", Uuid::new_v4()))
            .fetch_one(pool)
            .await
            .context("seed user failed")?;

    let file_id = facnet_db::create_uploaded_file(
        pool,
        &NewUploadedFile {
            original_name: "billing.csv".into(),
            stored_name: stored_name.into(),
            byte_size: 0,
            mime_type: "text/csv".into(),
            uploaded_by: user_id,
        },
    )
    .await
    .context("seed uploaded file failed")?;

    let run = facnet_db::create_validation_run(
        pool,
        &NewValidationRun {
            file_id,
            file_name: "billing.csv".into(),
            created_by: user_id,
        },
    )
    .await
    .context("seed validation run failed")?;

    Ok(SeededRun { user_id, file_id, run_id: run.id })
}

/// Header row matching `facnet-ingest`'s synonym table, camelCase so it
/// also exercises the normalizer rather than just the canonical names.
pub const CSV_HEADER: &str =
    "facture,idRamq,patient,doctorInfo,dateService,lieuPratique,secteurActivite,code,montantPreliminaire,montantPaye,elementContexte";

/// Build one CSV data row matching [`CSV_HEADER`]'s column order.
pub fn csv_row(
    facture: &str,
    id_ramq: &str,
    patient: &str,
    doctor_info: &str,
    date_service: &str,
    lieu_pratique: &str,
    code: &str,
    montant_preliminaire: &str,
    montant_paye: &str,
    element_contexte: &str,
) -> String {
    format!(
        "{facture},{id_ramq},{patient},{doctor_info},{date_service},{lieu_pratique},,{code},{montant_preliminaire},{montant_paye},{element_contexte}"
    )
}

/// A minimally valid `BillingRecord` for rule-handler unit tests that
/// don't go through CSV ingestion at all.
pub fn sample_billing_record(validation_run_id: Uuid) -> BillingRecord {
    BillingRecord {
        id: Uuid::new_v4(),
        validation_run_id,
        facture: "F-0001".into(),
        id_ramq: "RAMQ0001".into(),
        patient: "DOE, JOHN".into(),
        doctor_info: "1234 Dr Smith".into(),
        date_service: NaiveDate::from_ymd_opt(2026, 1, 15).expect("valid date"),
        debut: None,
        fin: None,
        lieu_pratique: "12345".into(),
        secteur_activite: None,
        diagnostic: None,
        code: "00103".into(),
        unites: None,
        element_contexte: String::new(),
        montant_preliminaire: Decimal::new(5000, 2),
        montant_paye: Decimal::new(5000, 2),
        custom_fields: serde_json::json!({}),
        created_at: chrono::Utc::now(),
    }
}

pub fn sample_code(code: &str, tariff_cents: i64) -> Code {
    Code {
        code: code.into(),
        description: format!("test code {code}"),
        tariff_value: Decimal::new(tariff_cents, 2),
        leaf: None,
        top_level: None,
        level1_group: None,
        active: true,
    }
}

pub fn sample_establishment(numero: &str, ep33: bool) -> Establishment {
    Establishment { numero: numero.into(), name: format!("Test Establishment {numero}"), ep33 }
}
