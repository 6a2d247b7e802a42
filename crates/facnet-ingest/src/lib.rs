//! CSV ingestor (C4).
//!
//! Turns an uploaded RAMQ billing export into [`BillingRecord`] rows.
//! Three failure classes are deliberately distinguished (spec.md §7):
//! a file whose encoding/delimiter/headers cannot be determined at all is
//! an [`IngestError::Fatal`] — the run aborts and is never retried, since
//! retrying won't fix a malformed file. A row that fails to parse once the
//! file itself is readable is collected into [`IngestOutcome::rejected`]
//! and ingestion continues — this is the ingestion-partial path.

mod delimiter;
mod encoding;
mod headers;
mod parse;

pub use delimiter::detect_delimiter;
pub use encoding::{decode_bytes, DetectedEncoding};
pub use headers::HeaderMap;
pub use parse::{parse_amount, parse_date, price_is_sane};

use facnet_schemas::BillingRecord;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("ingestion fatal: {0}")]
    Fatal(String),
}

#[derive(Debug, Clone)]
pub struct RejectedRow {
    pub line: usize,
    pub reason: String,
}

#[derive(Debug)]
pub struct IngestOutcome {
    pub records: Vec<BillingRecord>,
    pub rejected: Vec<RejectedRow>,
    pub encoding_used: &'static str,
    pub delimiter_used: char,
}

/// Parse a raw uploaded file into billing records for `run_id`.
///
/// `progress` is called with a value in `[0, 50]` as rows are consumed —
/// ingestion is the first half of a run's progress budget, the rule engine
/// owns `[50, 90]`, and persistence/finalization the remainder (spec.md §4).
pub fn ingest_csv(
    bytes: &[u8],
    run_id: Uuid,
    mut progress: impl FnMut(u8),
) -> Result<IngestOutcome, IngestError> {
    let decoded = decode_bytes(bytes).map_err(IngestError::Fatal)?;
    let delimiter = detect_delimiter(&decoded.text);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter as u8)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(decoded.text.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| IngestError::Fatal(format!("failed to read header row: {e}")))?
        .clone();
    let header_map = HeaderMap::from_headers(&headers).map_err(IngestError::Fatal)?;

    // Row count estimate for progress reporting; a strict line count would
    // require a second pass, so this is approximate (counts raw newlines).
    let approx_total_rows = decoded.text.matches('\n').count().max(1);

    let mut records = Vec::new();
    let mut rejected = Vec::new();

    for (i, result) in reader.records().enumerate() {
        let line = i + 2; // +1 for 0-index, +1 for the header row itself
        match result {
            Ok(raw) => match parse::parse_row(&header_map, &raw, run_id) {
                Ok(record) => records.push(record),
                Err(reason) => rejected.push(RejectedRow { line, reason }),
            },
            Err(e) => rejected.push(RejectedRow {
                line,
                reason: format!("malformed CSV row: {e}"),
            }),
        }

        if i % 500 == 0 {
            let pct = ((i * 50) / approx_total_rows).min(50) as u8;
            progress(pct);
        }
    }

    progress(50);

    Ok(IngestOutcome {
        records,
        rejected,
        encoding_used: decoded.label,
        delimiter_used: delimiter,
    })
}
