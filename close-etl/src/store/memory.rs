use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::info;

use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;
use crate::schema::TableSchema;
use crate::store::TableStore;
use crate::types::TransformedRow;

#[derive(Debug, Default)]
struct Inner {
    tables: HashMap<String, Vec<TransformedRow>>,
}

/// In-memory table store for testing and development purposes.
///
/// Tables are plain row vectors held behind a mutex. Compaction rebuilds the
/// canonical vector in one critical section, so readers never observe a
/// half-replaced table. All data is lost when the process terminates.
#[derive(Debug, Clone, Default)]
pub struct MemoryTableStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryTableStore {
    /// Creates a new empty memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a single row into `table`, creating the table if needed.
    ///
    /// Seeding helper for tests that need pre-existing canonical rows.
    pub async fn insert_row(&self, table: &str, row: TransformedRow) {
        let mut inner = self.inner.lock().await;
        inner.tables.entry(table.to_owned()).or_default().push(row);
    }

    /// Returns a copy of the rows currently stored in `table`.
    pub async fn table_rows(&self, table: &str) -> Vec<TransformedRow> {
        let inner = self.inner.lock().await;
        inner.tables.get(table).cloned().unwrap_or_default()
    }

    /// Drops all tables and their rows.
    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        inner.tables.clear();
    }
}

/// Compares two increment values, parsing them as RFC 3339 timestamps when
/// possible and falling back to string order otherwise.
fn increment_cmp(left: &serde_json::Value, right: &serde_json::Value) -> std::cmp::Ordering {
    let parse = |value: &serde_json::Value| {
        value
            .as_str()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|parsed| parsed.with_timezone(&Utc))
    };

    match (parse(left), parse(right)) {
        (Some(left), Some(right)) => left.cmp(&right),
        _ => left.to_string().cmp(&right.to_string()),
    }
}

fn primary_key_of(row: &TransformedRow, primary_key: &[&str]) -> EtlResult<Vec<String>> {
    primary_key
        .iter()
        .map(|column| {
            row.get(*column)
                .filter(|value| !value.is_null())
                .map(|value| value.to_string())
                .ok_or_else(|| {
                    etl_error!(
                        ErrorKind::CompactFailed,
                        "Row missing primary key column",
                        format!("column `{column}`")
                    )
                })
        })
        .collect()
}

impl TableStore for MemoryTableStore {
    async fn append_rows(
        &self,
        table: &str,
        _schema: &TableSchema,
        rows: Vec<TransformedRow>,
    ) -> EtlResult<u64> {
        let mut inner = self.inner.lock().await;

        info!(table, num_rows = rows.len(), "appending rows to memory table");

        let num_rows = rows.len() as u64;
        inner.tables.entry(table.to_owned()).or_default().extend(rows);

        Ok(num_rows)
    }

    async fn max_increment(&self, table: &str, column: &str) -> EtlResult<Option<DateTime<Utc>>> {
        let inner = self.inner.lock().await;

        let Some(rows) = inner.tables.get(table) else {
            return Ok(None);
        };

        let max = rows
            .iter()
            .filter_map(|row| row.get(column).and_then(|value| value.as_str()))
            .filter_map(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|parsed| parsed.with_timezone(&Utc))
            .max();

        Ok(max)
    }

    async fn replace_with_latest(
        &self,
        canonical: &str,
        staging: &str,
        primary_key: &[&str],
        increment_key: &str,
    ) -> EtlResult<u64> {
        let mut inner = self.inner.lock().await;

        let staged = inner.tables.get(staging).cloned().unwrap_or_default();

        // One row per primary key tuple. Later staged rows win ties, which
        // matches descending ordering over staging insertion order.
        let mut order: Vec<Vec<String>> = Vec::new();
        let mut latest: HashMap<Vec<String>, TransformedRow> = HashMap::new();
        for row in staged {
            let key = primary_key_of(&row, primary_key)?;
            match latest.get(&key) {
                Some(current) => {
                    let null = serde_json::Value::Null;
                    let incoming = row.get(increment_key).unwrap_or(&null);
                    let existing = current.get(increment_key).unwrap_or(&null);
                    if increment_cmp(incoming, existing).is_ge() {
                        latest.insert(key, row);
                    }
                }
                None => {
                    order.push(key.clone());
                    latest.insert(key, row);
                }
            }
        }

        let compacted: Vec<TransformedRow> = order
            .iter()
            .filter_map(|key| latest.remove(key))
            .collect();
        let num_rows = compacted.len() as u64;

        info!(
            canonical,
            staging, num_rows, "replacing memory table with compacted rows"
        );

        inner.tables.insert(canonical.to_owned(), compacted);

        Ok(num_rows)
    }
}
