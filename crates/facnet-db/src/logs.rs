use anyhow::{Context, Result};
use facnet_schemas::{LogLevel, SafeMeta, ValidationLog};
use sqlx::{PgPool, QueryBuilder, Row};
use uuid::Uuid;

fn row_to_log(row: sqlx::postgres::PgRow) -> Result<ValidationLog> {
    let level: String = row.try_get("level")?;
    let metadata_json: serde_json::Value = row.try_get("metadata")?;
    Ok(ValidationLog {
        id: row.try_get("id")?,
        validation_run_id: row.try_get("validation_run_id")?,
        timestamp: row.try_get("timestamp")?,
        level: LogLevel::parse(&level)?,
        source: row.try_get("source")?,
        message: row.try_get("message")?,
        metadata: serde_json::from_value(metadata_json).unwrap_or_default(),
    })
}

pub async fn create_validation_log(pool: &PgPool, log: &ValidationLog) -> Result<()> {
    let metadata_json = serde_json::to_value(&log.metadata).context("SafeMeta always serializes")?;
    sqlx::query(
        r#"
        insert into validation_logs (id, validation_run_id, timestamp, level, source, message, metadata)
        values ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(log.id)
    .bind(log.validation_run_id)
    .bind(log.timestamp)
    .bind(log.level.as_str())
    .bind(&log.source)
    .bind(&log.message)
    .bind(metadata_json)
    .execute(pool)
    .await
    .context("create_validation_log failed")?;
    Ok(())
}

/// Batch insert used by the per-run log sink to avoid one round-trip per
/// line during a busy ingestion/rule pass.
pub async fn create_validation_logs_batch(pool: &PgPool, logs: &[ValidationLog]) -> Result<()> {
    if logs.is_empty() {
        return Ok(());
    }

    let mut qb: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(
        "insert into validation_logs (id, validation_run_id, timestamp, level, source, message, metadata) ",
    );

    qb.push_values(logs, |mut b, log| {
        let metadata_json = serde_json::to_value(&log.metadata).expect("SafeMeta always serializes");
        b.push_bind(log.id)
            .push_bind(log.validation_run_id)
            .push_bind(log.timestamp)
            .push_bind(log.level.as_str())
            .push_bind(&log.source)
            .push_bind(&log.message)
            .push_bind(metadata_json);
    });

    qb.build()
        .execute(pool)
        .await
        .context("create_validation_logs_batch failed")?;
    Ok(())
}

pub async fn get_validation_logs(pool: &PgPool, run_id: Uuid) -> Result<Vec<ValidationLog>> {
    let rows = sqlx::query(
        r#"
        select id, validation_run_id, timestamp, level, source, message, metadata
        from validation_logs
        where validation_run_id = $1
        order by timestamp
        "#,
    )
    .bind(run_id)
    .fetch_all(pool)
    .await
    .context("get_validation_logs failed")?;

    rows.into_iter().map(row_to_log).collect()
}
