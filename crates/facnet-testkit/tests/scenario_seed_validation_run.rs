// DB-backed test, skipped if FACNET_DATABASE_URL is not set.

use anyhow::Result;

#[tokio::test]
async fn seed_validation_run_produces_a_queued_run_row() -> Result<()> {
    if std::env::var(facnet_db::ENV_DB_URL).is_err() {
        eprintln!("SKIP: FACNET_DATABASE_URL not set");
        return Ok(());
    }

    let pool = facnet_testkit::db_pool().await?;
    let seeded = facnet_testkit::seed_validation_run(&pool, "stored-testkit.csv").await?;

    let run = facnet_db::get_validation_run(&pool, seeded.run_id)
        .await?
        .expect("seeded run must be readable back");
    assert_eq!(run.file_id, seeded.file_id);
    assert_eq!(run.progress, 0);

    let file = facnet_db::get_uploaded_file(&pool, seeded.file_id)
        .await?
        .expect("seeded file must be readable back");
    assert_eq!(file.uploaded_by, seeded.user_id);

    Ok(())
}
