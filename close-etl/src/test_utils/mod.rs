//! Testing utilities for driving pipelines without a live API.
//!
//! The [`source`] module provides a scripted [`ApiSource`](crate::source::ApiSource)
//! that serves canned datasets and records every page request it receives,
//! so tests can assert on both the data a run produced and the requests it
//! issued. Pair it with the in-memory
//! [`MemoryTableStore`](crate::store::memory::MemoryTableStore) for fully
//! deterministic end to end runs.

pub mod source;

pub use source::{RecordedRequest, StubApiSource};
