//! Shared DTOs for the billing-validation pipeline.
//!
//! Every crate in the workspace that crosses a process or persistence
//! boundary speaks these types rather than inventing its own. Enums that
//! round-trip through Postgres (`status`, `severity`, `level`, `role`) carry
//! an explicit `as_str`/`parse` pair instead of relying on serde's string
//! representation, since the database column is the source of truth.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod rule_data;

pub use rule_data::RuleData;

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Pending,
    Viewer,
    Editor,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Pending => "pending",
            UserRole::Viewer => "viewer",
            UserRole::Editor => "editor",
            UserRole::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "pending" => Ok(UserRole::Pending),
            "viewer" => Ok(UserRole::Viewer),
            "editor" => Ok(UserRole::Editor),
            "admin" => Ok(UserRole::Admin),
            other => Err(anyhow::anyhow!("invalid user role: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedactionLevel {
    Full,
    None,
}

impl RedactionLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RedactionLevel::Full => "full",
            RedactionLevel::None => "none",
        }
    }

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "full" => Ok(RedactionLevel::Full),
            "none" => Ok(RedactionLevel::None),
            other => Err(anyhow::anyhow!("invalid redaction level: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub display_name: String,
    pub email: String,
    pub role: UserRole,
    pub phi_redaction_enabled: bool,
    pub redaction_level: RedactionLevel,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// UploadedFile
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadedFile {
    pub id: Uuid,
    pub original_name: String,
    pub stored_name: String,
    pub byte_size: i64,
    pub mime_type: String,
    pub uploaded_by: Uuid,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// ValidationRun
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::Processing => "processing",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "queued" => Ok(RunStatus::Queued),
            "processing" => Ok(RunStatus::Processing),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            other => Err(anyhow::anyhow!("invalid run status: {other}")),
        }
    }

    /// Terminal states are absorbing (spec.md §3 ValidationRun invariants).
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationRun {
    pub id: Uuid,
    pub file_id: Uuid,
    pub file_name: String,
    pub created_by: Uuid,
    pub status: RunStatus,
    pub progress: i16,
    pub job_id: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct RunFilter {
    pub status: Option<RunStatus>,
    pub owner: Option<Uuid>,
    pub page: i64,
    pub page_size: i64,
}

// ---------------------------------------------------------------------------
// BillingRecord
// ---------------------------------------------------------------------------

/// One canonicalized CSV line. `elementContexte` is kept as the raw
/// comma-separated string; rules split and trim it on demand through
/// [`context_tags`] / [`elements_contains`] so there is exactly one place
/// that defines tag equality.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingRecord {
    pub id: Uuid,
    pub validation_run_id: Uuid,
    pub facture: String,
    pub id_ramq: String,
    pub patient: String,
    pub doctor_info: String,
    pub date_service: NaiveDate,
    pub debut: Option<String>,
    pub fin: Option<String>,
    pub lieu_pratique: String,
    pub secteur_activite: Option<String>,
    pub diagnostic: Option<String>,
    pub code: String,
    pub unites: Option<Decimal>,
    pub element_contexte: String,
    pub montant_preliminaire: Decimal,
    pub montant_paye: Decimal,
    pub custom_fields: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Split `elementContexte` on commas and trim. Exact-match only — never
/// substring ("EPICENE" must never match "ICEP").
pub fn context_tags(element_contexte: &str) -> impl Iterator<Item = &str> {
    element_contexte
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
}

pub fn elements_contains(element_contexte: &str, needle: &str) -> bool {
    context_tags(element_contexte).any(|tag| tag == needle)
}

// ---------------------------------------------------------------------------
// ValidationResult
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
    Optimization,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Optimization => "optimization",
            Severity::Info => "info",
        }
    }

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "error" => Ok(Severity::Error),
            "warning" => Ok(Severity::Warning),
            "optimization" => Ok(Severity::Optimization),
            "info" => Ok(Severity::Info),
            other => Err(anyhow::anyhow!("invalid severity: {other}")),
        }
    }
}

/// `affectedRecords` population policy (spec.md §9 Open Question, resolved):
/// the full set for error/warning/optimization, a capped representative
/// sample for info summaries. Encoded as a constructor-time invariant rather
/// than left to call-site discipline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub id: Uuid,
    pub validation_run_id: Uuid,
    pub rule_id: String,
    pub billing_record_id: Option<Uuid>,
    pub id_ramq: Option<String>,
    pub severity: Severity,
    pub category: String,
    pub message: String,
    pub solution: Option<String>,
    pub affected_records: Vec<Uuid>,
    pub rule_data: RuleData,
    pub created_at: DateTime<Utc>,
}

const INFO_SAMPLE_CAP: usize = 10;

impl ValidationResult {
    /// Full set of affected records — for error/warning/optimization findings.
    #[allow(clippy::too_many_arguments)]
    pub fn new_finding(
        validation_run_id: Uuid,
        rule_id: impl Into<String>,
        billing_record_id: Option<Uuid>,
        id_ramq: Option<String>,
        severity: Severity,
        category: impl Into<String>,
        message: impl Into<String>,
        solution: Option<String>,
        affected_records: Vec<Uuid>,
        rule_data: RuleData,
    ) -> Self {
        debug_assert_ne!(severity, Severity::Info, "use new_info_summary for info findings");
        Self {
            id: Uuid::new_v4(),
            validation_run_id,
            rule_id: rule_id.into(),
            billing_record_id,
            id_ramq,
            severity,
            category: category.into(),
            message: message.into(),
            solution,
            affected_records,
            rule_data,
            created_at: Utc::now(),
        }
    }

    /// Representative sample (capped) — for `info` summaries only.
    pub fn new_info_summary(
        validation_run_id: Uuid,
        rule_id: impl Into<String>,
        category: impl Into<String>,
        message: impl Into<String>,
        all_related_records: &[Uuid],
        rule_data: RuleData,
    ) -> Self {
        let sample = all_related_records
            .iter()
            .take(INFO_SAMPLE_CAP)
            .copied()
            .collect();
        Self {
            id: Uuid::new_v4(),
            validation_run_id,
            rule_id: rule_id.into(),
            billing_record_id: None,
            id_ramq: None,
            severity: Severity::Info,
            category: category.into(),
            message: message.into(),
            solution: None,
            affected_records: sample,
            rule_data,
            created_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Reference entities: Code / Context / Establishment / Rule
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Code {
    pub code: String,
    pub description: String,
    pub tariff_value: Decimal,
    pub leaf: Option<String>,
    pub top_level: Option<String>,
    pub level1_group: Option<String>,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Context {
    pub code: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Establishment {
    pub numero: String,
    pub name: String,
    pub ep33: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub name: String,
    pub rule_type: String,
    pub condition: serde_json::Value,
    pub threshold: Option<Decimal>,
    pub enabled: bool,
}

// ---------------------------------------------------------------------------
// ValidationLog
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARN" => Ok(LogLevel::Warn),
            "ERROR" => Ok(LogLevel::Error),
            other => Err(anyhow::anyhow!("invalid log level: {other}")),
        }
    }
}

/// Strictly-typed safe-metadata for [`ValidationLog`]. This is the "closed
/// set of technical keys" contract from spec.md §4.2: there is no
/// `HashMap<String, serde_json::Value>` constructor exposed to callers, so a
/// caller physically cannot attach CSV row content to a log line.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SafeMeta {
    pub row_count: Option<i64>,
    pub duration_ms: Option<i64>,
    pub encoding: Option<String>,
    pub delimiter: Option<String>,
    pub error_code: Option<String>,
    pub rule_id: Option<String>,
    pub job_id: Option<String>,
    pub progress: Option<i16>,
    pub attempt: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationLog {
    pub id: Uuid,
    pub validation_run_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub source: String,
    pub message: String,
    pub metadata: SafeMeta,
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Claimed,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Claimed => "claimed",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "claimed" => Ok(JobStatus::Claimed),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(anyhow::anyhow!("invalid job status: {other}")),
        }
    }
}

/// One row of the durable job queue backing a validation run. `dedup_key` is
/// `uuid_v5(validation_run_id)` so re-enqueuing the same run is a no-op
/// (spec.md §8 property 7) rather than a second row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub dedup_key: Uuid,
    pub validation_run_id: Uuid,
    pub status: JobStatus,
    pub attempts: i32,
    pub max_attempts: i32,
    pub next_attempt_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub claimed_by: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// AuditLog
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLog {
    pub id: Uuid,
    pub user_id: Uuid,
    pub email: String,
    pub endpoint: String,
    pub run_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
    pub record_count: i64,
}
