use anyhow::{Context, Result};
use facnet_schemas::BillingRecord;
use rust_decimal::Decimal;
use sqlx::{PgPool, QueryBuilder, Row};
use uuid::Uuid;

/// Postgres binds each query to 65535 params max. 18 columns per row keeps
/// each chunk well under that limit with headroom for future columns.
const COLUMNS_PER_ROW: usize = 18;
const MAX_PARAMS: usize = 65_535;
const CHUNK_ROWS: usize = MAX_PARAMS / COLUMNS_PER_ROW;

fn row_to_billing_record(row: sqlx::postgres::PgRow) -> Result<BillingRecord> {
    Ok(BillingRecord {
        id: row.try_get("id")?,
        validation_run_id: row.try_get("validation_run_id")?,
        facture: row.try_get("facture")?,
        id_ramq: row.try_get("id_ramq")?,
        patient: row.try_get("patient")?,
        doctor_info: row.try_get("doctor_info")?,
        date_service: row.try_get("date_service")?,
        debut: row.try_get("debut")?,
        fin: row.try_get("fin")?,
        lieu_pratique: row.try_get("lieu_pratique")?,
        secteur_activite: row.try_get("secteur_activite")?,
        diagnostic: row.try_get("diagnostic")?,
        code: row.try_get("code")?,
        unites: row.try_get::<Option<Decimal>, _>("unites")?,
        element_contexte: row.try_get("element_contexte")?,
        montant_preliminaire: row.try_get("montant_preliminaire")?,
        montant_paye: row.try_get("montant_paye")?,
        custom_fields: row.try_get("custom_fields")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Batch-insert parsed billing records for a run. Chunked to stay under
/// Postgres's per-statement parameter limit; each chunk is its own insert
/// (the ingestor has already decided these rows belong together — a
/// mid-batch failure surfaces as a partial-ingestion error to the caller,
/// which aborts the run rather than silently completing with a gap).
pub async fn create_billing_records(pool: &PgPool, records: &[BillingRecord]) -> Result<()> {
    for chunk in records.chunks(CHUNK_ROWS) {
        let mut qb: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(
            "insert into billing_records (id, validation_run_id, facture, id_ramq, patient, \
             doctor_info, date_service, debut, fin, lieu_pratique, secteur_activite, diagnostic, \
             code, unites, element_contexte, montant_preliminaire, montant_paye, custom_fields) ",
        );

        qb.push_values(chunk, |mut b, rec| {
            b.push_bind(rec.id)
                .push_bind(rec.validation_run_id)
                .push_bind(&rec.facture)
                .push_bind(&rec.id_ramq)
                .push_bind(&rec.patient)
                .push_bind(&rec.doctor_info)
                .push_bind(rec.date_service)
                .push_bind(&rec.debut)
                .push_bind(&rec.fin)
                .push_bind(&rec.lieu_pratique)
                .push_bind(&rec.secteur_activite)
                .push_bind(&rec.diagnostic)
                .push_bind(&rec.code)
                .push_bind(rec.unites)
                .push_bind(&rec.element_contexte)
                .push_bind(rec.montant_preliminaire)
                .push_bind(rec.montant_paye)
                .push_bind(&rec.custom_fields);
        });

        qb.build()
            .execute(pool)
            .await
            .context("create_billing_records batch insert failed")?;
    }

    Ok(())
}

pub async fn get_billing_records(pool: &PgPool, run_id: Uuid) -> Result<Vec<BillingRecord>> {
    let rows = sqlx::query(
        r#"
        select id, validation_run_id, facture, id_ramq, patient, doctor_info, date_service,
               debut, fin, lieu_pratique, secteur_activite, diagnostic, code, unites,
               element_contexte, montant_preliminaire, montant_paye, custom_fields, created_at
        from billing_records
        where validation_run_id = $1
        order by date_service, created_at
        "#,
    )
    .bind(run_id)
    .fetch_all(pool)
    .await
    .context("get_billing_records failed")?;

    rows.into_iter().map(row_to_billing_record).collect()
}

/// Remove previously-ingested records/results/logs for a run without
/// deleting the run row itself, so a re-run starts from a clean slate
/// (used by the cancellation/restart path — spec scenario S6).
pub async fn cleanup_validation_data(pool: &PgPool, run_id: Uuid) -> Result<()> {
    let mut tx = pool.begin().await.context("cleanup_validation_data begin tx failed")?;

    sqlx::query("delete from validation_results where validation_run_id = $1")
        .bind(run_id)
        .execute(&mut *tx)
        .await
        .context("cleanup_validation_data: delete validation_results failed")?;

    sqlx::query("delete from billing_records where validation_run_id = $1")
        .bind(run_id)
        .execute(&mut *tx)
        .await
        .context("cleanup_validation_data: delete billing_records failed")?;

    sqlx::query("delete from validation_logs where validation_run_id = $1")
        .bind(run_id)
        .execute(&mut *tx)
        .await
        .context("cleanup_validation_data: delete validation_logs failed")?;

    tx.commit().await.context("cleanup_validation_data commit failed")?;
    Ok(())
}
