//! PHI protection (C3).
//!
//! Two distinct redactors live here, matched to the two places PHI can leak
//! (spec.md §4.3, §7, §8 invariant 4):
//!
//! - [`PhiRedactor`] runs at the API boundary on `BillingRecord`/
//!   `ValidationResult` fields before they reach a response or a UI.
//! - [`TelemetryRedactor`] runs on free-text log/error messages before they
//!   reach the structured-logging sink, since a stack trace or SQL error can
//!   carry a patient id or doctor name verbatim.

use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};

// ---------------------------------------------------------------------------
// Boundary redaction
// ---------------------------------------------------------------------------

/// Deterministic, salted patient-id tokenization + doctor-info redaction.
/// `idRamq` is never redacted (spec.md invariant 4) — it is not PHI under
/// this system's data model, only a billing identifier.
#[derive(Clone)]
pub struct PhiRedactor {
    salt: String,
}

impl PhiRedactor {
    pub fn new(salt: impl Into<String>) -> Self {
        Self { salt: salt.into() }
    }

    /// `[PATIENT-xxxxxxxx]`, first 8 hex chars of SHA-256(salt || patient).
    /// Deterministic: the same patient value under the same salt always
    /// tokenizes to the same string, so duplicate-patient rules (GMF 8875,
    /// annual billing code) still group correctly after redaction.
    pub fn tokenize_patient(&self, patient: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.salt.as_bytes());
        hasher.update(patient.as_bytes());
        let digest = hex::encode(hasher.finalize());
        format!("[PATIENT-{}]", &digest[..8])
    }

    pub fn redact_doctor_info(&self, _doctor_info: &str) -> String {
        "[REDACTED]".to_string()
    }

    /// Apply both redactions to a billing record's PHI-bearing fields,
    /// returning owned copies suitable for an API response.
    pub fn redact_record_fields(&self, patient: &str, doctor_info: &str) -> (String, String) {
        (self.tokenize_patient(patient), self.redact_doctor_info(doctor_info))
    }
}

// ---------------------------------------------------------------------------
// Telemetry redaction
// ---------------------------------------------------------------------------

static HEALTH_CARD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Za-z]{4}[ -]?\d{4}[ -]?\d{4}\b").expect("valid regex"));

static PATIENT_REF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bpatient[:\s]+\S+").expect("valid regex"));

static DOCTOR_REF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bdoctor[:\s]+[A-Za-z .'-]+").expect("valid regex"));

static ID_RAMQ_REF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bidRamq[:\s=]+\S+").expect("valid regex"));

/// Metadata keys a rule handler or the ingestor may legitimately attach to a
/// log line. Anything not on this list is dropped, not merely redacted —
/// the closed-set contract lives structurally in `facnet_schemas::SafeMeta`,
/// this list is the matching contract for loosely-typed `serde_json::Value`
/// telemetry payloads that arrive from outside that struct.
const METADATA_WHITELIST: &[&str] = &[
    "row_count",
    "duration_ms",
    "encoding",
    "delimiter",
    "error_code",
    "rule_id",
    "job_id",
    "progress",
    "attempt",
];

pub struct TelemetryRedactor;

impl TelemetryRedactor {
    /// Sweep free text for PHI-shaped substrings. Fail-safe: if the regex
    /// engine ever panics on pathological input, the original message is
    /// replaced wholesale rather than risk leaking it.
    pub fn redact_text(message: &str) -> String {
        let result = catch_unwind(AssertUnwindSafe(|| {
            let mut redacted = message.to_string();
            redacted = HEALTH_CARD_RE.replace_all(&redacted, "[HEALTH-CARD]").to_string();
            redacted = PATIENT_REF_RE.replace_all(&redacted, "patient: [REDACTED]").to_string();
            redacted = DOCTOR_REF_RE.replace_all(&redacted, "doctor: [REDACTED]").to_string();
            redacted = ID_RAMQ_REF_RE.replace_all(&redacted, "idRamq: [REDACTED]").to_string();
            redacted
        }));

        result.unwrap_or_else(|_| "[REDACTED: sweep failed]".to_string())
    }

    /// Drop any metadata key not on [`METADATA_WHITELIST`]. Used as a
    /// second line of defense for callers building `serde_json::Value`
    /// metadata outside the `SafeMeta` struct (e.g. bridging a third-party
    /// error into a log line).
    pub fn redact_metadata(meta: &serde_json::Map<String, serde_json::Value>) -> serde_json::Map<String, serde_json::Value> {
        let allowed: HashSet<&str> = METADATA_WHITELIST.iter().copied().collect();
        meta.iter()
            .filter(|(k, _)| allowed.contains(k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_patient_is_deterministic() {
        let r = PhiRedactor::new("fixed-salt");
        assert_eq!(r.tokenize_patient("12345"), r.tokenize_patient("12345"));
    }

    #[test]
    fn tokenize_patient_differs_by_salt() {
        let a = PhiRedactor::new("salt-a");
        let b = PhiRedactor::new("salt-b");
        assert_ne!(a.tokenize_patient("12345"), b.tokenize_patient("12345"));
    }

    #[test]
    fn tokenize_patient_format() {
        let r = PhiRedactor::new("salt");
        let token = r.tokenize_patient("12345");
        assert!(token.starts_with("[PATIENT-"));
        assert!(token.ends_with(']'));
        assert_eq!(token.len(), "[PATIENT-".len() + 8 + 1);
    }

    #[test]
    fn doctor_info_always_fully_redacted() {
        let r = PhiRedactor::new("salt");
        assert_eq!(r.redact_doctor_info("Dr. Jane Smith, 123456"), "[REDACTED]");
    }

    #[test]
    fn telemetry_sweep_redacts_patient_reference() {
        let msg = "failed to parse row for patient: 98765";
        let redacted = TelemetryRedactor::redact_text(msg);
        assert!(!redacted.contains("98765"));
        assert!(redacted.contains("[REDACTED]"));
    }

    #[test]
    fn telemetry_sweep_preserves_safe_messages() {
        let msg = "connection to database timed out after 30s";
        assert_eq!(TelemetryRedactor::redact_text(msg), msg);
    }

    #[test]
    fn metadata_whitelist_drops_unknown_keys() {
        let mut meta = serde_json::Map::new();
        meta.insert("row_count".to_string(), serde_json::json!(10));
        meta.insert("patient_name".to_string(), serde_json::json!("Jane Doe"));

        let filtered = TelemetryRedactor::redact_metadata(&meta);
        assert!(filtered.contains_key("row_count"));
        assert!(!filtered.contains_key("patient_name"));
    }
}
