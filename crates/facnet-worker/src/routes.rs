//! `/healthz` / `/readyz` router (C11).
//!
//! `/healthz` is a liveness probe: it never touches the database, so a
//! slow Postgres never makes the process look dead. `/readyz` is a
//! readiness probe: it runs `facnet_db::status`, so a worker that can't
//! reach its database is correctly pulled out of rotation.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .with_state(state)
}

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
    uptime_secs: u64,
}

async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthBody {
        status: "ok",
        uptime_secs: state.uptime_secs(),
    })
}

#[derive(Serialize)]
struct ReadyBody {
    db_ok: bool,
    cache_hit_ratio: f64,
}

async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match facnet_db::status(&state.pool).await {
        Ok(status) if status.ok && status.has_runs_table => (
            StatusCode::OK,
            Json(ReadyBody {
                db_ok: true,
                cache_hit_ratio: state.cache.stats().hit_ratio,
            }),
        ),
        Ok(status) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadyBody {
                db_ok: status.ok,
                cache_hit_ratio: state.cache.stats().hit_ratio,
            }),
        ),
        Err(err) => {
            tracing::warn!(error = %err, "readyz: database status check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ReadyBody {
                    db_ok: false,
                    cache_hit_ratio: state.cache.stats().hit_ratio,
                }),
            )
        }
    }
}
