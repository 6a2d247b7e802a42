use anyhow::{Context, Result};
use facnet_schemas::{Severity, ValidationResult};
use sqlx::{PgPool, QueryBuilder, Row};
use uuid::Uuid;

const COLUMNS_PER_ROW: usize = 10;
const MAX_PARAMS: usize = 65_535;
const CHUNK_ROWS: usize = MAX_PARAMS / COLUMNS_PER_ROW;

fn row_to_validation_result(row: sqlx::postgres::PgRow) -> Result<ValidationResult> {
    let severity: String = row.try_get("severity")?;
    let rule_data_json: serde_json::Value = row.try_get("rule_data")?;
    Ok(ValidationResult {
        id: row.try_get("id")?,
        validation_run_id: row.try_get("validation_run_id")?,
        rule_id: row.try_get("rule_id")?,
        billing_record_id: row.try_get("billing_record_id")?,
        id_ramq: row.try_get("id_ramq")?,
        severity: Severity::parse(&severity)?,
        category: row.try_get("category")?,
        message: row.try_get("message")?,
        solution: row.try_get("solution")?,
        affected_records: row.try_get("affected_records")?,
        rule_data: serde_json::from_value(rule_data_json).context("rule_data deserialize failed")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Batch-insert validation findings for a run, chunked under Postgres's
/// parameter limit. A rule handler that fails is expected to have produced
/// zero findings (rule-failure isolation happens upstream in facnet-rules);
/// this function has no opinion about partial rule output.
pub async fn create_validation_results(pool: &PgPool, results: &[ValidationResult]) -> Result<()> {
    for chunk in results.chunks(CHUNK_ROWS) {
        let mut qb: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(
            "insert into validation_results (id, validation_run_id, rule_id, billing_record_id, \
             id_ramq, severity, category, message, solution, affected_records, rule_data) ",
        );

        qb.push_values(chunk, |mut b, res| {
            let rule_data_json = serde_json::to_value(&res.rule_data).expect("RuleData always serializes");
            b.push_bind(res.id)
                .push_bind(res.validation_run_id)
                .push_bind(&res.rule_id)
                .push_bind(res.billing_record_id)
                .push_bind(&res.id_ramq)
                .push_bind(res.severity.as_str())
                .push_bind(&res.category)
                .push_bind(&res.message)
                .push_bind(&res.solution)
                .push_bind(&res.affected_records)
                .push_bind(rule_data_json);
        });

        qb.build()
            .execute(pool)
            .await
            .context("create_validation_results batch insert failed")?;
    }

    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct ResultFilter {
    pub severity: Option<Severity>,
    pub rule_id: Option<String>,
}

pub async fn get_validation_results(
    pool: &PgPool,
    run_id: Uuid,
    filter: &ResultFilter,
) -> Result<Vec<ValidationResult>> {
    let rows = sqlx::query(
        r#"
        select id, validation_run_id, rule_id, billing_record_id, id_ramq, severity,
               category, message, solution, affected_records, rule_data, created_at
        from validation_results
        where validation_run_id = $1
          and ($2::text is null or severity = $2)
          and ($3::text is null or rule_id = $3)
        order by created_at
        "#,
    )
    .bind(run_id)
    .bind(filter.severity.map(|s| s.as_str().to_string()))
    .bind(&filter.rule_id)
    .fetch_all(pool)
    .await
    .context("get_validation_results failed")?;

    rows.into_iter().map(row_to_validation_result).collect()
}
