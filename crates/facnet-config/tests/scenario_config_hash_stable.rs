//! Config hash must be stable under re-load and under key reordering, and
//! must change when a value changes.

use facnet_config::load_layered_yaml;
use std::io::Write;

fn write_temp(contents: &str) -> tempfile::NamedTempFile {
    let mut f = tempfile::NamedTempFile::new().expect("create temp file");
    f.write_all(contents.as_bytes()).expect("write temp file");
    f
}

const BASE_YAML: &str = r#"
rules:
  office_fee:
    cap: 64.80
    registered_threshold: 6
cache:
  ttl_seconds: 300
"#;

const BASE_YAML_REORDERED: &str = r#"
cache:
  ttl_seconds: 300
rules:
  office_fee:
    registered_threshold: 6
    cap: 64.80
"#;

#[test]
fn same_input_produces_identical_hash() {
    let f = write_temp(BASE_YAML);
    let path = f.path().to_str().unwrap();

    let a = load_layered_yaml(&[path]).unwrap();
    let b = load_layered_yaml(&[path]).unwrap();

    assert_eq!(a.config_hash, b.config_hash);
    assert_eq!(a.canonical_json, b.canonical_json);
}

#[test]
fn reordered_keys_produce_same_hash() {
    let base = write_temp(BASE_YAML);
    let reordered = write_temp(BASE_YAML_REORDERED);

    let a = load_layered_yaml(&[base.path().to_str().unwrap()]).unwrap();
    let b = load_layered_yaml(&[reordered.path().to_str().unwrap()]).unwrap();

    assert_eq!(a.config_hash, b.config_hash);
}

#[test]
fn different_values_produce_different_hash() {
    let base = write_temp(BASE_YAML);
    let changed = write_temp(
        r#"
rules:
  office_fee:
    cap: 99.00
    registered_threshold: 6
cache:
  ttl_seconds: 300
"#,
    );

    let a = load_layered_yaml(&[base.path().to_str().unwrap()]).unwrap();
    let b = load_layered_yaml(&[changed.path().to_str().unwrap()]).unwrap();

    assert_ne!(a.config_hash, b.config_hash);
}

#[test]
fn layered_overlay_overrides_base() {
    let base = write_temp(BASE_YAML);
    let overlay = write_temp(
        r#"
rules:
  office_fee:
    cap: 80.00
"#,
    );

    let merged = load_layered_yaml(&[base.path().to_str().unwrap(), overlay.path().to_str().unwrap()]).unwrap();

    let cap = merged
        .config_json
        .pointer("/rules/office_fee/cap")
        .and_then(|v| v.as_f64())
        .unwrap();
    assert!((cap - 80.0).abs() < 1e-9);

    let threshold = merged
        .config_json
        .pointer("/rules/office_fee/registered_threshold")
        .and_then(|v| v.as_i64())
        .unwrap();
    assert_eq!(threshold, 6, "base-only key must survive the overlay merge");
}

#[test]
fn hash_is_64_hex_chars() {
    let f = write_temp(BASE_YAML);
    let loaded = load_layered_yaml(&[f.path().to_str().unwrap()]).unwrap();

    assert_eq!(loaded.config_hash.len(), 64);
    assert!(loaded.config_hash.chars().all(|c| c.is_ascii_hexdigit()));
}
