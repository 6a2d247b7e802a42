//! Durable job queue operations backing `facnet-queue`'s worker pool.
//!
//! Mirrors the host codebase's outbox dispatch protocol: idempotent
//! insert-on-conflict enqueue, `FOR UPDATE SKIP LOCKED` batch claim, and an
//! explicit done/retry/fail transition instead of a separate scheduler
//! process.

use anyhow::{Context, Result};
use facnet_schemas::{Job, JobStatus};
use sqlx::{PgPool, Row};
use uuid::Uuid;

fn row_to_job(row: sqlx::postgres::PgRow) -> Result<Job> {
    let status: String = row.try_get("status")?;
    Ok(Job {
        id: row.try_get("id")?,
        dedup_key: row.try_get("dedup_key")?,
        validation_run_id: row.try_get("validation_run_id")?,
        status: JobStatus::parse(&status)?,
        attempts: row.try_get("attempts")?,
        max_attempts: row.try_get("max_attempts")?,
        next_attempt_at: row.try_get("next_attempt_at")?,
        last_error: row.try_get("last_error")?,
        claimed_by: row.try_get("claimed_by")?,
        claimed_at: row.try_get("claimed_at")?,
        created_at: row.try_get("created_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}

/// Idempotent enqueue keyed on `uuid_v5(validation_run_id)`. Returns `true`
/// if a new row was inserted, `false` if a job for this run already existed
/// (re-enqueuing after a crash must not create a duplicate, spec.md §8
/// property 7).
pub async fn enqueue_job(pool: &PgPool, validation_run_id: Uuid, max_attempts: i32) -> Result<bool> {
    let dedup_key = Uuid::new_v5(&Uuid::NAMESPACE_OID, validation_run_id.as_bytes());
    let row: Option<(Uuid,)> = sqlx::query_as(
        r#"
        insert into jobs (dedup_key, validation_run_id, max_attempts)
        values ($1, $2, $3)
        on conflict (dedup_key) do nothing
        returning id
        "#,
    )
    .bind(dedup_key)
    .bind(validation_run_id)
    .bind(max_attempts)
    .fetch_optional(pool)
    .await
    .context("enqueue_job failed")?;
    Ok(row.is_some())
}

/// Atomically claim up to `batch_size` pending, due jobs. `FOR UPDATE SKIP
/// LOCKED` means concurrent worker tasks never claim the same row.
pub async fn claim_batch(pool: &PgPool, batch_size: i64, claimed_by: &str) -> Result<Vec<Job>> {
    let rows = sqlx::query(
        r#"
        with to_claim as (
            select id
            from jobs
            where status = 'pending' and next_attempt_at <= now()
            order by next_attempt_at asc
            limit $1
            for update skip locked
        )
        update jobs
           set status = 'claimed',
               claimed_at = now(),
               claimed_by = $2
         where id in (select id from to_claim)
        returning id, dedup_key, validation_run_id, status, attempts, max_attempts,
                  next_attempt_at, last_error, claimed_by, claimed_at, created_at, completed_at
        "#,
    )
    .bind(batch_size)
    .bind(claimed_by)
    .fetch_all(pool)
    .await
    .context("claim_batch failed")?;

    rows.into_iter().map(row_to_job).collect()
}

pub async fn mark_job_done(pool: &PgPool, job_id: Uuid) -> Result<()> {
    sqlx::query("update jobs set status = 'completed', completed_at = now() where id = $1")
        .bind(job_id)
        .execute(pool)
        .await
        .context("mark_job_done failed")?;
    Ok(())
}

/// Transient failure: bump `attempts`, schedule the next try with
/// `1s * 2^attempts` backoff, or transition to `failed` once `max_attempts`
/// is reached. `sanitized_error` must already be PHI-redacted by the caller.
pub async fn retry_or_fail_job(pool: &PgPool, job_id: Uuid, sanitized_error: &str) -> Result<()> {
    sqlx::query(
        r#"
        update jobs
           set attempts = attempts + 1,
               status = case when attempts + 1 >= max_attempts then 'failed' else 'pending' end,
               next_attempt_at = case
                   when attempts + 1 >= max_attempts then next_attempt_at
                   else now() + (interval '1 second' * power(2, attempts))
               end,
               last_error = $2,
               claimed_by = null,
               claimed_at = null
         where id = $1
        "#,
    )
    .bind(job_id)
    .bind(sanitized_error)
    .execute(pool)
    .await
    .context("retry_or_fail_job failed")?;
    Ok(())
}

/// Fatal failure (spec.md §7's persistence-integrity class): fail
/// immediately, no further retries regardless of `attempts` remaining.
pub async fn fail_job_permanently(pool: &PgPool, job_id: Uuid, sanitized_error: &str) -> Result<()> {
    sqlx::query("update jobs set status = 'failed', last_error = $2, completed_at = now() where id = $1")
        .bind(job_id)
        .bind(sanitized_error)
        .execute(pool)
        .await
        .context("fail_job_permanently failed")?;
    Ok(())
}

pub async fn get_job(pool: &PgPool, job_id: Uuid) -> Result<Option<Job>> {
    let row = sqlx::query(
        r#"
        select id, dedup_key, validation_run_id, status, attempts, max_attempts,
               next_attempt_at, last_error, claimed_by, claimed_at, created_at, completed_at
        from jobs
        where id = $1
        "#,
    )
    .bind(job_id)
    .fetch_optional(pool)
    .await
    .context("get_job failed")?;

    row.map(row_to_job).transpose()
}
