//! Destination table stores.
//!
//! A [`TableStore`] is the seam between the pipeline and the warehouse that
//! holds staged and canonical tables. [`memory::MemoryTableStore`] backs
//! tests and local development; the BigQuery store behind the `bigquery`
//! feature backs production runs.

#[cfg(feature = "bigquery")]
pub mod bigquery;
pub mod memory;

use std::future::Future;

use chrono::{DateTime, Utc};

use crate::error::EtlResult;
use crate::schema::TableSchema;
use crate::types::TransformedRow;

/// Storage backend for staged and canonical entity tables.
///
/// Implementations must make [`TableStore::append_rows`] append-only and
/// [`TableStore::replace_with_latest`] atomic from the reader's point of
/// view: readers of the canonical table observe either the previous
/// contents or the fully compacted result, never a partial state.
pub trait TableStore {
    /// Appends `rows` to `table`, creating the table from `schema` if it
    /// does not exist yet. Returns the number of rows appended.
    fn append_rows(
        &self,
        table: &str,
        schema: &TableSchema,
        rows: Vec<TransformedRow>,
    ) -> impl Future<Output = EtlResult<u64>> + Send;

    /// Returns the maximum value of the timestamp `column` in `table`, or
    /// `None` when the table is missing or empty.
    fn max_increment(
        &self,
        table: &str,
        column: &str,
    ) -> impl Future<Output = EtlResult<Option<DateTime<Utc>>>> + Send;

    /// Replaces `canonical` with the rows of `staging` deduplicated to one
    /// row per `primary_key` tuple, keeping the row with the greatest
    /// `increment_key`. Returns the row count of the rebuilt table.
    fn replace_with_latest(
        &self,
        canonical: &str,
        staging: &str,
        primary_key: &[&str],
        increment_key: &str,
    ) -> impl Future<Output = EtlResult<u64>> + Send;
}
