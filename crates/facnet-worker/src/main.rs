//! Worker Process Shell (C11).
//!
//! This file is intentionally thin: tracing init, config load, cache
//! warm-up, worker pool spawn, and a minimal `/healthz`/`/readyz` surface.
//! Job handling itself lives in `facnet-orchestrator`; this binary only
//! wires it into `facnet-queue`'s worker pool.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use facnet_cache::ReferenceCache;
use facnet_orchestrator::OrchestratorJobHandler;
use facnet_queue::{WorkerPool, WorkerPoolConfig};
use facnet_worker::{routes, state};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (_config, env) = facnet_config::bootstrap(&[]).context("failed to load configuration")?;
    init_tracing();

    let pool = facnet_db::connect(&env.database_url).await?;
    facnet_db::migrate(&pool).await.context("database migration failed")?;

    let cache = ReferenceCache::new(pool.clone());
    cache.warm_up().await.context("reference cache warm-up failed")?;

    let handler = Arc::new(OrchestratorJobHandler::new(pool.clone(), cache.clone(), env.storage_dir.clone()));
    let worker_pool = WorkerPool::new(
        pool.clone(),
        handler,
        WorkerPoolConfig {
            worker_count: env.worker_concurrency,
            poll_interval: Duration::from_millis(500),
            batch_size: 1,
            drain_timeout: Duration::from_secs(30),
        },
    );
    let cancel = worker_pool.cancellation_token();
    let worker_task = tokio::spawn(worker_pool.run());

    let shared = state::AppState::new(pool, cache);
    let app = routes::build_router(shared).layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    let addr = bind_addr_from_env().unwrap_or_else(|| std::net::SocketAddr::from(([127, 0, 0, 1], 8899)));
    info!("facnet-worker listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await
        .context("server crashed")?;

    cancel.cancel();
    worker_task.await.context("worker pool task panicked")?;

    Ok(())
}

async fn shutdown_signal(cancel: tokio_util::sync::CancellationToken) {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        let mut sig = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        sig.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received, stopping job intake");
    cancel.cancel();
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
}

fn bind_addr_from_env() -> Option<std::net::SocketAddr> {
    std::env::var("FACNET_WORKER_ADDR").ok()?.parse().ok()
}
