//! `RuntimeEnv` must require FACNET_DATABASE_URL / FACNET_PHI_SALT and apply
//! sane defaults for everything else. Tests run serially (env vars are
//! process-global) by funnelling every assertion through one #[test].

use facnet_config::RuntimeEnv;

#[test]
fn required_vars_enforced_and_defaults_applied() {
    // Missing entirely.
    std::env::remove_var("FACNET_DATABASE_URL");
    std::env::remove_var("FACNET_PHI_SALT");
    assert!(RuntimeEnv::from_process_env().is_err());

    std::env::set_var("FACNET_DATABASE_URL", "postgres://localhost/facnet");
    assert!(RuntimeEnv::from_process_env().is_err(), "phi salt still missing");

    std::env::set_var("FACNET_PHI_SALT", "unit-test-salt");
    let env = RuntimeEnv::from_process_env().expect("both required vars present");
    assert_eq!(env.worker_concurrency, 4);
    assert_eq!(env.retry_max_attempts, 5);
    assert_eq!(env.retry_backoff_base_ms, 500);
    assert!((env.telemetry_sample_rate - 1.0).abs() < 1e-9);
    assert!(env.cache_url.is_none());

    std::env::set_var("FACNET_TELEMETRY_SAMPLE_RATE", "1.5");
    assert!(
        RuntimeEnv::from_process_env().is_err(),
        "sample rate outside [0,1] must be rejected"
    );
    std::env::remove_var("FACNET_TELEMETRY_SAMPLE_RATE");

    std::env::set_var("FACNET_WORKER_CONCURRENCY", "0");
    assert!(RuntimeEnv::from_process_env().is_err(), "zero workers must be rejected");

    std::env::remove_var("FACNET_DATABASE_URL");
    std::env::remove_var("FACNET_PHI_SALT");
    std::env::remove_var("FACNET_WORKER_CONCURRENCY");
}
