//! Incremental extraction of Close CRM records into versioned analytical tables.
//!
//! The crate is organized around one pipeline per entity kind: a fetcher pulls
//! raw rows from the paginated REST API (either a sequential full scan or a
//! count-then-fan-out windowed fetch), a pure transform normalizes them into a
//! fixed nested schema, the batch is appended to an append-only staging table,
//! and a compaction pass rewrites the canonical table as the deduplicated,
//! latest-version projection of staging. Repeated or overlapping runs are
//! idempotent by construction: staging accumulates duplicates and compaction
//! keeps, per primary key, the row with the maximum increment-key value.

pub mod entity;
pub mod error;
pub mod fetch;
mod macros;
pub mod pipeline;
pub mod schema;
pub mod source;
pub mod store;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;
pub mod watermark;
