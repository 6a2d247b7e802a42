// DB-backed test, skipped if FACNET_DATABASE_URL is not set.

use anyhow::Result;
use facnet_cache::ReferenceCache;

#[tokio::test]
async fn warm_up_then_repeat_reads_are_cache_hits() -> Result<()> {
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

    let cache = ReferenceCache::new(pool);
    cache.warm_up().await?;

    let before = cache.stats();
    assert_eq!(before.misses, 4, "warm_up should populate all four slots, one miss each");

    cache.codes().await;
    cache.contexts().await;
    let after = cache.stats();
    assert_eq!(after.hits, before.hits + 2, "repeat reads within TTL must be hits");

    cache.invalidate_all().await;
    let invalidated = cache.stats();
    assert_eq!(invalidated.invalidations, 4);

    cache.codes().await;
    let refreshed = cache.stats();
    assert_eq!(refreshed.misses, before.misses + 1, "read after invalidation must miss");

    Ok(())
}
