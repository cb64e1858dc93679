use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;
use crate::source::{ApiSource, PageFilter, PageResponse};
use crate::types::RawRow;

/// One page request observed by a [`StubApiSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub endpoint: String,
    pub filter: Option<String>,
    pub limit: u64,
    pub skip: u64,
}

#[derive(Debug, Default)]
struct Inner {
    datasets: HashMap<String, Vec<RawRow>>,
    requests: Vec<RecordedRequest>,
    failing_pages: HashSet<(String, u64)>,
}

/// Scripted [`ApiSource`] serving canned rows from memory.
///
/// Each endpoint maps to a fixed dataset; page requests slice it by
/// `skip`/`limit` and report the dataset length as the total, so both fetch
/// strategies work against it. Every request is recorded for later
/// assertions, and individual pages can be scripted to fail.
#[derive(Debug, Clone, Default)]
pub struct StubApiSource {
    inner: Arc<Mutex<Inner>>,
}

impl StubApiSource {
    /// Creates a stub with no datasets.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the rows served by `endpoint`, replacing any previous dataset.
    pub async fn set_dataset(&self, endpoint: &str, rows: Vec<RawRow>) {
        let mut inner = self.inner.lock().await;
        inner.datasets.insert(endpoint.to_owned(), rows);
    }

    /// Scripts the page at `skip` on `endpoint` to fail with
    /// [`ErrorKind::FetchFailed`].
    pub async fn fail_page(&self, endpoint: &str, skip: u64) {
        let mut inner = self.inner.lock().await;
        inner.failing_pages.insert((endpoint.to_owned(), skip));
    }

    /// Returns every page request observed so far, in arrival order.
    pub async fn requests(&self) -> Vec<RecordedRequest> {
        let inner = self.inner.lock().await;
        inner.requests.clone()
    }
}

impl ApiSource for StubApiSource {
    async fn fetch_page(
        &self,
        endpoint: &str,
        filter: Option<PageFilter<'_>>,
        limit: u64,
        skip: u64,
    ) -> EtlResult<PageResponse> {
        let mut inner = self.inner.lock().await;

        inner.requests.push(RecordedRequest {
            endpoint: endpoint.to_owned(),
            filter: filter.map(|filter| filter.window.filter_expression(filter.increment_key)),
            limit,
            skip,
        });

        if inner.failing_pages.contains(&(endpoint.to_owned(), skip)) {
            return Err(etl_error!(
                ErrorKind::FetchFailed,
                "Scripted page failure",
                format!("endpoint `{endpoint}` at offset {skip}")
            ));
        }

        let rows = inner.datasets.get(endpoint).ok_or_else(|| {
            etl_error!(
                ErrorKind::FetchFailed,
                "Unknown endpoint",
                format!("no dataset registered for `{endpoint}`")
            )
        })?;

        let total = rows.len() as u64;
        let from = skip.min(total) as usize;
        let to = (skip + limit).min(total) as usize;

        Ok(PageResponse {
            data: rows[from..to].to_vec(),
            has_more: Some((to as u64) < total),
            total_results: Some(total),
        })
    }
}
