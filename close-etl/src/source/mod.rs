//! The paginated API source seam.
//!
//! Fetchers talk to the source through [`ApiSource`], which maps one-to-one
//! onto the API's pagination convention: a page of rows plus a cursor
//! flag (`has_more`) for sequential scans and a total count
//! (`total_results`) for windowed fan-out. The production implementation
//! is [`close::CloseApiClient`]; tests substitute a recording stub.

use std::future::Future;

use serde::Deserialize;

use crate::error::EtlResult;
use crate::types::{FetchWindow, RawRow};

pub mod close;

/// One page of an API listing response.
///
/// The three fields are the only parts of the wire format the pipeline
/// depends on; everything else in the response is ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct PageResponse {
    /// Rows of this page, in server order.
    pub data: Vec<RawRow>,
    /// Whether another page follows; only meaningful for sequential scans.
    #[serde(default)]
    pub has_more: Option<bool>,
    /// Total rows matching the filter; only present on filtered listings.
    #[serde(default)]
    pub total_results: Option<u64>,
}

/// Filter applied to a page request.
#[derive(Debug, Clone, Copy)]
pub struct PageFilter<'a> {
    /// Time window constraining the listing.
    pub window: &'a FetchWindow,
    /// Column the window applies to.
    pub increment_key: &'a str,
}

/// Trait for paginated row sources.
///
/// Implementations must be cheap to call concurrently: the windowed fetcher
/// issues many page requests against one shared source.
pub trait ApiSource {
    /// Fetches one page of `limit` rows starting at offset `skip`.
    fn fetch_page(
        &self,
        endpoint: &str,
        filter: Option<PageFilter<'_>>,
        limit: u64,
        skip: u64,
    ) -> impl Future<Output = EtlResult<PageResponse>> + Send;
}
