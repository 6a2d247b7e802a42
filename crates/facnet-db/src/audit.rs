use anyhow::{Context, Result};
use facnet_schemas::AuditLog;
use sqlx::{PgPool, Row};
use uuid::Uuid;

pub struct NewAuditLog {
    pub user_id: Uuid,
    pub email: String,
    pub endpoint: String,
    pub run_id: Option<Uuid>,
    pub record_count: i64,
}

/// Record a deliberate PHI-redaction bypass (spec.md §4.3 invariant 4). This
/// is the only write path into `audit_logs`; there is no update or delete.
pub async fn create_audit_log(pool: &PgPool, new: &NewAuditLog) -> Result<AuditLog> {
    let row = sqlx::query(
        r#"
        insert into audit_logs (user_id, email, endpoint, run_id, record_count)
        values ($1, $2, $3, $4, $5)
        returning id, user_id, email, endpoint, run_id, timestamp, record_count
        "#,
    )
    .bind(new.user_id)
    .bind(&new.email)
    .bind(&new.endpoint)
    .bind(new.run_id)
    .bind(new.record_count)
    .fetch_one(pool)
    .await
    .context("create_audit_log failed")?;

    Ok(AuditLog {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        email: row.try_get("email")?,
        endpoint: row.try_get("endpoint")?,
        run_id: row.try_get("run_id")?,
        timestamp: row.try_get("timestamp")?,
        record_count: row.try_get("record_count")?,
    })
}

pub async fn get_audit_logs_for_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<AuditLog>> {
    let rows = sqlx::query(
        r#"
        select id, user_id, email, endpoint, run_id, timestamp, record_count
        from audit_logs
        where user_id = $1
        order by timestamp desc
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .context("get_audit_logs_for_user failed")?;

    rows.into_iter()
        .map(|row| {
            Ok(AuditLog {
                id: row.try_get("id")?,
                user_id: row.try_get("user_id")?,
                email: row.try_get("email")?,
                endpoint: row.try_get("endpoint")?,
                run_id: row.try_get("run_id")?,
                timestamp: row.try_get("timestamp")?,
                record_count: row.try_get("record_count")?,
            })
        })
        .collect()
}
