// DB-backed test, skipped if FACNET_DATABASE_URL is not set.
//
// Covers idempotent re-enqueue (spec.md §8 property 7), the
// claim-then-ack/retry lifecycle, and fatal-vs-transient failure handling.

use anyhow::Result;
use facnet_db::{create_uploaded_file, create_validation_run, jobs, NewUploadedFile, NewValidationRun};
use uuid::Uuid;

async fn seed_run(pool: &sqlx::PgPool) -> Result<Uuid> {
    let (user_id,): (Uuid,) = sqlx::query_as("insert into users (display_name, email) values ($1, $2) returning id")
        .bind("Queue Test User")
        .bind(format!("user-{}@example.test", Uuid::new_v4()))
        .fetch_one(pool)
        .await?;

    let file_id = create_uploaded_file(
        pool,
        &NewUploadedFile {
            original_name: "billing.csv".into(),
            stored_name: "stored.csv".into(),
            byte_size: 1024,
            mime_type: "text/csv".into(),
            uploaded_by: user_id,
        },
    )
    .await?;

    let run = create_validation_run(
        pool,
        &NewValidationRun {
            file_id,
            file_name: "billing.csv".into(),
            created_by: user_id,
        },
    )
    .await?;

    Ok(run.id)
}

#[tokio::test]
async fn reenqueue_after_crash_is_a_no_op() -> Result<()> {
    let url = match std::env::var(facnet_db::ENV_DB_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: FACNET_DATABASE_URL not set");
            return Ok(());
        }
    };
    let pool = sqlx::postgres::PgPoolOptions::new().max_connections(2).connect(&url).await?;
    facnet_db::migrate(&pool).await?;

    let run_id = seed_run(&pool).await?;

    let first = facnet_queue::enqueue(&pool, run_id, 3).await?;
    assert!(first, "first enqueue must create a job row");

    let second = facnet_queue::enqueue(&pool, run_id, 3).await?;
    assert!(!second, "re-enqueuing the same run after a crash must be a no-op");

    Ok(())
}

#[tokio::test]
async fn claim_batch_skips_locked_rows_and_retry_backs_off() -> Result<()> {
    let url = match std::env::var(facnet_db::ENV_DB_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: FACNET_DATABASE_URL not set");
            return Ok(());
        }
    };
    let pool = sqlx::postgres::PgPoolOptions::new().max_connections(2).connect(&url).await?;
    facnet_db::migrate(&pool).await?;

    let run_id = seed_run(&pool).await?;
    facnet_queue::enqueue(&pool, run_id, 2).await?;

    let claimed = jobs::claim_batch(&pool, 10, "worker-a").await?;
    assert_eq!(claimed.len(), 1);
    let job = &claimed[0];
    assert_eq!(job.attempts, 0);

    let empty = jobs::claim_batch(&pool, 10, "worker-b").await?;
    assert!(empty.is_empty(), "an already-claimed job must not be claimable again");

    jobs::retry_or_fail_job(&pool, job.id, "transient: connection reset").await?;
    let after_first_failure = jobs::get_job(&pool, job.id).await?.unwrap();
    assert_eq!(after_first_failure.attempts, 1);
    assert_eq!(after_first_failure.status.as_str(), "pending", "max_attempts is 2, one failure must still retry");

    // Force the next_attempt_at into the past so this test doesn't have to
    // sleep out the real backoff window.
    sqlx::query("update jobs set next_attempt_at = now() - interval '1 second' where id = $1")
        .bind(job.id)
        .execute(&pool)
        .await?;

    let reclaimed = jobs::claim_batch(&pool, 10, "worker-a").await?;
    assert_eq!(reclaimed.len(), 1);
    jobs::retry_or_fail_job(&pool, job.id, "transient: connection reset again").await?;
    let after_second_failure = jobs::get_job(&pool, job.id).await?.unwrap();
    assert_eq!(after_second_failure.attempts, 2);
    assert_eq!(after_second_failure.status.as_str(), "failed", "exhausting max_attempts must fail the job");

    Ok(())
}

#[tokio::test]
async fn fatal_failure_skips_retry_even_with_attempts_remaining() -> Result<()> {
    let url = match std::env::var(facnet_db::ENV_DB_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: FACNET_DATABASE_URL not set");
            return Ok(());
        }
    };
    let pool = sqlx::postgres::PgPoolOptions::new().max_connections(2).connect(&url).await?;
    facnet_db::migrate(&pool).await?;

    let run_id = seed_run(&pool).await?;
    facnet_queue::enqueue(&pool, run_id, 3).await?;
    let claimed = jobs::claim_batch(&pool, 10, "worker-a").await?;
    let job = &claimed[0];

    jobs::fail_job_permanently(&pool, job.id, "fk violation on billing_records").await?;
    let failed = jobs::get_job(&pool, job.id).await?.unwrap();
    assert_eq!(failed.status.as_str(), "failed");
    assert_eq!(failed.attempts, 0, "a fatal failure does not count against the retry budget");

    Ok(())
}
