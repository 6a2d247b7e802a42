use anyhow::{Context, Result};
use chrono::Utc;
use facnet_schemas::{RunFilter, RunStatus, ValidationRun};
use sqlx::{PgPool, Row};
use uuid::Uuid;

pub struct NewValidationRun {
    pub file_id: Uuid,
    pub file_name: String,
    pub created_by: Uuid,
}

fn row_to_run(row: sqlx::postgres::PgRow) -> Result<ValidationRun> {
    let status: String = row.try_get("status")?;
    Ok(ValidationRun {
        id: row.try_get("id")?,
        file_id: row.try_get("file_id")?,
        file_name: row.try_get("file_name")?,
        created_by: row.try_get("created_by")?,
        status: RunStatus::parse(&status)?,
        progress: row.try_get("progress")?,
        job_id: row.try_get("job_id")?,
        error_message: row.try_get("error_message")?,
        created_at: row.try_get("created_at")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}

/// Insert a new run row in `queued` status.
pub async fn create_validation_run(pool: &PgPool, new: &NewValidationRun) -> Result<ValidationRun> {
    let row = sqlx::query(
        r#"
        insert into validation_runs (file_id, file_name, created_by)
        values ($1, $2, $3)
        returning id, file_id, file_name, created_by, status, progress,
                  job_id, error_message, created_at, started_at, completed_at
        "#,
    )
    .bind(new.file_id)
    .bind(&new.file_name)
    .bind(new.created_by)
    .fetch_one(pool)
    .await
    .context("create_validation_run failed")?;

    row_to_run(row)
}

pub async fn get_validation_run(pool: &PgPool, run_id: Uuid) -> Result<Option<ValidationRun>> {
    let row = sqlx::query(
        r#"
        select id, file_id, file_name, created_by, status, progress,
               job_id, error_message, created_at, started_at, completed_at
        from validation_runs
        where id = $1
        "#,
    )
    .bind(run_id)
    .fetch_optional(pool)
    .await
    .context("get_validation_run failed")?;

    row.map(row_to_run).transpose()
}

/// List runs with optional status/owner filter. `page` is 1-indexed.
pub async fn list_validation_runs(pool: &PgPool, filter: &RunFilter) -> Result<Vec<ValidationRun>> {
    let page = filter.page.max(1);
    let page_size = filter.page_size.clamp(1, 200);
    let offset = (page - 1) * page_size;

    let rows = sqlx::query(
        r#"
        select id, file_id, file_name, created_by, status, progress,
               job_id, error_message, created_at, started_at, completed_at
        from validation_runs
        where ($1::text is null or status = $1)
          and ($2::uuid is null or created_by = $2)
        order by created_at desc
        limit $3 offset $4
        "#,
    )
    .bind(filter.status.map(|s| s.as_str().to_string()))
    .bind(filter.owner)
    .bind(page_size)
    .bind(offset)
    .fetch_all(pool)
    .await
    .context("list_validation_runs failed")?;

    rows.into_iter().map(row_to_run).collect()
}

/// Move a run into `processing` and stamp `started_at`. No-op (does not error)
/// if the run is already in a terminal state, since progress is monotone and
/// terminal states are absorbing (spec invariant).
pub async fn start_validation_run(pool: &PgPool, run_id: Uuid, job_id: &str) -> Result<()> {
    sqlx::query(
        r#"
        update validation_runs
           set status = 'processing',
               job_id = $2,
               started_at = now()
         where id = $1
           and status not in ('completed', 'failed')
        "#,
    )
    .bind(run_id)
    .bind(job_id)
    .execute(pool)
    .await
    .context("start_validation_run failed")?;
    Ok(())
}

/// Advance progress. Rejected (no-op) if it would move progress backwards or
/// the run already reached a terminal status.
pub async fn update_validation_run_progress(pool: &PgPool, run_id: Uuid, progress: i16) -> Result<()> {
    sqlx::query(
        r#"
        update validation_runs
           set progress = $2
         where id = $1
           and status not in ('completed', 'failed')
           and progress <= $2
        "#,
    )
    .bind(run_id)
    .bind(progress)
    .execute(pool)
    .await
    .context("update_validation_run_progress failed")?;
    Ok(())
}

pub async fn complete_validation_run(pool: &PgPool, run_id: Uuid) -> Result<()> {
    sqlx::query(
        r#"
        update validation_runs
           set status = 'completed',
               progress = 100,
               completed_at = now()
         where id = $1
           and status <> 'failed'
        "#,
    )
    .bind(run_id)
    .execute(pool)
    .await
    .context("complete_validation_run failed")?;
    Ok(())
}

pub async fn fail_validation_run(pool: &PgPool, run_id: Uuid, error_message: &str) -> Result<()> {
    sqlx::query(
        r#"
        update validation_runs
           set status = 'failed',
               error_message = $2,
               completed_at = now()
         where id = $1
           and status <> 'completed'
        "#,
    )
    .bind(run_id)
    .bind(error_message)
    .execute(pool)
    .await
    .context("fail_validation_run failed")?;
    Ok(())
}

pub struct NewUploadedFile {
    pub original_name: String,
    pub stored_name: String,
    pub byte_size: i64,
    pub mime_type: String,
    pub uploaded_by: Uuid,
}

pub async fn get_uploaded_file(pool: &PgPool, file_id: Uuid) -> Result<Option<facnet_schemas::UploadedFile>> {
    let row = sqlx::query(
        r#"
        select id, original_name, stored_name, byte_size, mime_type, uploaded_by, created_at
        from uploaded_files
        where id = $1
        "#,
    )
    .bind(file_id)
    .fetch_optional(pool)
    .await
    .context("get_uploaded_file failed")?;

    row.map(|r| {
        Ok(facnet_schemas::UploadedFile {
            id: r.try_get("id")?,
            original_name: r.try_get("original_name")?,
            stored_name: r.try_get("stored_name")?,
            byte_size: r.try_get("byte_size")?,
            mime_type: r.try_get("mime_type")?,
            uploaded_by: r.try_get("uploaded_by")?,
            created_at: r.try_get("created_at")?,
        })
    })
    .transpose()
}

pub async fn create_uploaded_file(pool: &PgPool, new: &NewUploadedFile) -> Result<Uuid> {
    let (id,): (Uuid,) = sqlx::query_as(
        r#"
        insert into uploaded_files (original_name, stored_name, byte_size, mime_type, uploaded_by)
        values ($1, $2, $3, $4, $5)
        returning id
        "#,
    )
    .bind(&new.original_name)
    .bind(&new.stored_name)
    .bind(new.byte_size)
    .bind(&new.mime_type)
    .bind(new.uploaded_by)
    .fetch_one(pool)
    .await
    .context("create_uploaded_file failed")?;

    Ok(id)
}

/// Delete runs (and their cascaded records/results/logs) older than `cutoff`.
/// Returns the number of runs removed.
pub async fn cleanup_old_validations(pool: &PgPool, cutoff: chrono::DateTime<Utc>) -> Result<u64> {
    let result = sqlx::query(
        r#"
        delete from validation_runs
         where created_at < $1
           and status in ('completed', 'failed')
        "#,
    )
    .bind(cutoff)
    .execute(pool)
    .await
    .context("cleanup_old_validations failed")?;

    Ok(result.rows_affected())
}
