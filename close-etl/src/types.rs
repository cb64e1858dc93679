//! Core value types shared across the pipeline.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// Calendar date format used for explicit window bounds and API filters.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Untyped row as returned by the API.
pub type RawRow = Value;

/// Row conforming to an entity's schema tree, ready for staging.
pub type TransformedRow = Value;

/// Half-open time window `[start, end)` fetched by an incremental run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl FetchWindow {
    /// Renders the window as the API's search filter expression.
    ///
    /// Bounds are formatted as calendar dates; an increment value exactly at
    /// the lower bound can therefore be re-fetched on every run, which is
    /// harmless because compaction makes redundant re-staging idempotent.
    pub fn filter_expression(&self, increment_key: &str) -> String {
        format!(
            "{increment_key} > {} {increment_key} < {}",
            self.start.format(DATE_FORMAT),
            self.end.format(DATE_FORMAT)
        )
    }
}

/// Outcome of one pipeline run, returned to the caller.
///
/// `start`/`end` are present only for incremental entities; `output_rows`
/// is the number of rows this run durably appended to staging, present only
/// when the fetch produced at least one row (a zero-row fetch skips load
/// and compaction entirely).
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RunResult {
    pub table: String,
    pub num_processed: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_rows: Option<u64>,
}
