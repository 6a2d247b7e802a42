//! Runtime environment resolution.
//!
//! This module is the single source of truth for the named `FACNET_*`
//! variables the worker and CLI depend on at startup. Downstream code
//! accepts a [`RuntimeEnv`] rather than scattering `std::env::var` calls.
//! `Debug` redacts the database/cache URLs since they carry credentials.

use anyhow::{bail, Result};

#[derive(Clone)]
pub struct RuntimeEnv {
    pub database_url: String,
    pub cache_url: Option<String>,
    pub phi_salt: String,
    pub telemetry_sample_rate: f64,
    pub log_sink_endpoint: Option<String>,
    pub worker_concurrency: usize,
    pub retry_max_attempts: u32,
    pub retry_backoff_base_ms: u64,
    pub storage_dir: String,
}

impl std::fmt::Debug for RuntimeEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeEnv")
            .field("database_url", &"<REDACTED>")
            .field("cache_url", &self.cache_url.as_ref().map(|_| "<REDACTED>"))
            .field("phi_salt", &"<REDACTED>")
            .field("telemetry_sample_rate", &self.telemetry_sample_rate)
            .field("log_sink_endpoint", &self.log_sink_endpoint)
            .field("worker_concurrency", &self.worker_concurrency)
            .field("retry_max_attempts", &self.retry_max_attempts)
            .field("retry_backoff_base_ms", &self.retry_backoff_base_ms)
            .field("storage_dir", &self.storage_dir)
            .finish()
    }
}

fn resolve_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

impl RuntimeEnv {
    /// Read the named `FACNET_*` variables from the process environment.
    /// Errors report the variable NAME only, never a value.
    pub fn from_process_env() -> Result<Self> {
        let database_url = resolve_env("FACNET_DATABASE_URL").ok_or_else(|| {
            anyhow::anyhow!("CONFIG_MISSING: required env var 'FACNET_DATABASE_URL' is not set or empty")
        })?;

        let phi_salt = resolve_env("FACNET_PHI_SALT").ok_or_else(|| {
            anyhow::anyhow!("CONFIG_MISSING: required env var 'FACNET_PHI_SALT' is not set or empty")
        })?;

        let cache_url = resolve_env("FACNET_CACHE_URL");
        let log_sink_endpoint = resolve_env("FACNET_LOG_SINK_ENDPOINT");

        let telemetry_sample_rate = match resolve_env("FACNET_TELEMETRY_SAMPLE_RATE") {
            Some(v) => v
                .parse::<f64>()
                .map_err(|_| anyhow::anyhow!("CONFIG_INVALID: 'FACNET_TELEMETRY_SAMPLE_RATE' must be a float"))?,
            None => 1.0,
        };

        let worker_concurrency = match resolve_env("FACNET_WORKER_CONCURRENCY") {
            Some(v) => v
                .parse::<usize>()
                .map_err(|_| anyhow::anyhow!("CONFIG_INVALID: 'FACNET_WORKER_CONCURRENCY' must be a positive integer"))?,
            None => 4,
        };

        let retry_max_attempts = match resolve_env("FACNET_RETRY_MAX_ATTEMPTS") {
            Some(v) => v
                .parse::<u32>()
                .map_err(|_| anyhow::anyhow!("CONFIG_INVALID: 'FACNET_RETRY_MAX_ATTEMPTS' must be a positive integer"))?,
            None => 5,
        };

        let retry_backoff_base_ms = match resolve_env("FACNET_RETRY_BACKOFF_BASE_MS") {
            Some(v) => v
                .parse::<u64>()
                .map_err(|_| anyhow::anyhow!("CONFIG_INVALID: 'FACNET_RETRY_BACKOFF_BASE_MS' must be a positive integer"))?,
            None => 500,
        };

        let storage_dir = resolve_env("FACNET_STORAGE_DIR").unwrap_or_else(|| "./storage".to_string());

        if telemetry_sample_rate < 0.0 || telemetry_sample_rate > 1.0 {
            bail!("CONFIG_INVALID: 'FACNET_TELEMETRY_SAMPLE_RATE' must be within [0, 1]");
        }
        if worker_concurrency == 0 {
            bail!("CONFIG_INVALID: 'FACNET_WORKER_CONCURRENCY' must be >= 1");
        }

        Ok(RuntimeEnv {
            database_url,
            cache_url,
            phi_salt,
            telemetry_sample_rate,
            log_sink_endpoint,
            worker_concurrency,
            retry_max_attempts,
            retry_backoff_base_ms,
            storage_dir,
        })
    }
}
