// DB-backed test, skipped if FACNET_DATABASE_URL is not set.

use anyhow::Result;

#[tokio::test]
async fn migrate_runs_twice_without_error() -> Result<()> {
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
    facnet_db::migrate(&pool).await?;

    let st = facnet_db::status(&pool).await?;
    assert!(st.ok);
    assert!(st.has_runs_table);

    Ok(())
}
