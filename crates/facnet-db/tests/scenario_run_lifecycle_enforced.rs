// DB-backed test, skipped if FACNET_DATABASE_URL is not set.
//
// Covers spec invariant 2 (progress monotonicity, terminal-state absorption):
// a run that has reached `completed` or `failed` cannot be pushed backwards
// or re-started.

use anyhow::Result;
use facnet_db::{
    complete_validation_run, create_uploaded_file, create_validation_run, fail_validation_run,
    get_validation_run, start_validation_run, update_validation_run_progress, NewUploadedFile,
    NewValidationRun,
};
use uuid::Uuid;

async fn seed_user(pool: &sqlx::PgPool) -> Result<Uuid> {
    let (id,): (Uuid,) = sqlx::query_as(
        "insert into users (display_name, email) values ($1, $2) returning id",
    )
    .bind("Test User")
    .bind(format!("user-{}@example.test", Uuid::new_v4()))
    .fetch_one(pool)
    .await?;
    Ok(id)
}

#[tokio::test]
async fn progress_is_monotone_and_terminal_state_absorbs() -> Result<()> {
    let url = match std::env::var(facnet_db::ENV_DB_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: FACNET_DATABASE_URL not set");
            return Ok(());
        }
    };

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(2)
        .connect(&url)
        .await?;
    facnet_db::migrate(&pool).await?;

    let user_id = seed_user(&pool).await?;
    let file_id = create_uploaded_file(
        &pool,
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
        &pool,
        &NewValidationRun {
            file_id,
            file_name: "billing.csv".into(),
            created_by: user_id,
        },
    )
    .await?;

    start_validation_run(&pool, run.id, "job-1").await?;
    update_validation_run_progress(&pool, run.id, 50).await?;

    // Attempting to move progress backwards must be a no-op.
    update_validation_run_progress(&pool, run.id, 10).await?;
    let mid = get_validation_run(&pool, run.id).await?.unwrap();
    assert_eq!(mid.progress, 50, "progress must never move backwards");

    complete_validation_run(&pool, run.id).await?;
    let done = get_validation_run(&pool, run.id).await?.unwrap();
    assert_eq!(done.status.as_str(), "completed");
    assert_eq!(done.progress, 100);
    assert!(done.completed_at.is_some());

    // Once completed, neither progress updates nor fail_validation_run may
    // move the run out of its terminal state.
    update_validation_run_progress(&pool, run.id, 20).await?;
    fail_validation_run(&pool, run.id, "should not apply").await?;
    let still_done = get_validation_run(&pool, run.id).await?.unwrap();
    assert_eq!(still_done.status.as_str(), "completed");
    assert_eq!(still_done.progress, 100);
    assert!(still_done.error_message.is_none());

    Ok(())
}
