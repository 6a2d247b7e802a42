//! Shared runtime state for the worker's `/healthz`/`/readyz` surface.
//!
//! The worker process itself has no other HTTP surface: job intake and
//! result retrieval are a separate API service's concern (out of scope for
//! this binary, see spec.md §6). This state exists only so an operator's
//! load balancer / orchestrator can tell the process is up and its
//! dependencies are reachable.

use std::sync::Arc;
use std::time::Instant;

use facnet_cache::ReferenceCache;
use sqlx::PgPool;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub cache: ReferenceCache,
    started_at: Instant,
}

impl AppState {
    pub fn new(pool: PgPool, cache: ReferenceCache) -> Arc<Self> {
        Arc::new(Self {
            pool,
            cache,
            started_at: Instant::now(),
        })
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
