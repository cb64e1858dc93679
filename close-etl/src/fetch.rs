//! Fetch strategies for paginated extraction.
//!
//! Two strategies cover every entity:
//!
//! - [`fetch_full`]: sequential cursor full scan, for entities without a
//!   time filter. Pages are requested one after another until the server
//!   signals no more remain.
//! - [`fetch_window`]: count-then-fan-out, for time-windowed entities. One
//!   probe request reads the total row count matching the window, then one
//!   request per page offset runs concurrently and the results are joined.
//!
//! Both strategies are all-or-nothing: any failed page fails the whole
//! fetch, partially fetched pages are discarded and never ingested.

use std::sync::Arc;

use futures::future;
use tokio::sync::Semaphore;
use tracing::{debug, info};

use crate::entity::EntityDescriptor;
use crate::error::{ErrorKind, EtlError, EtlResult};
use crate::etl_error;
use crate::source::{ApiSource, PageFilter};
use crate::types::{FetchWindow, RawRow};

/// Fetches every row of a non-incremental entity.
///
/// Cursor-based full scan: requests `page_size` rows starting at offset 0,
/// advancing by the page size while the server reports more pages. Server
/// order is preserved; pages are simply concatenated.
pub async fn fetch_full<S>(
    source: &S,
    descriptor: &EntityDescriptor,
    page_size: u64,
) -> EtlResult<Vec<RawRow>>
where
    S: ApiSource,
{
    let mut rows = Vec::new();
    let mut skip = 0;

    loop {
        let page = source
            .fetch_page(descriptor.endpoint, None, page_size, skip)
            .await?;

        let has_more = page.has_more.unwrap_or(false);
        rows.extend(page.data);

        if !has_more {
            break;
        }
        skip += page_size;
    }

    info!(
        table = descriptor.table,
        num_rows = rows.len(),
        "full scan completed"
    );

    Ok(rows)
}

/// Fetches the rows of an incremental entity within a time window.
///
/// Issues one single-row probe request to learn `total_results`, then fans
/// out one concurrent request per page offset. `max_concurrent_pages` caps
/// how many pages are in flight at once; `None` launches all of them
/// simultaneously.
///
/// If the probe fails, the fetch aborts before fanning out. If any page
/// request fails, the whole fetch fails with the page errors aggregated;
/// completed sibling pages are discarded, not cancelled, since they carry
/// no side effects.
pub async fn fetch_window<S>(
    source: &S,
    descriptor: &EntityDescriptor,
    window: &FetchWindow,
    page_size: u64,
    max_concurrent_pages: Option<usize>,
) -> EtlResult<Vec<RawRow>>
where
    S: ApiSource,
{
    let filter = PageFilter {
        window,
        increment_key: descriptor.increment_key,
    };

    let probe = source
        .fetch_page(descriptor.endpoint, Some(filter), 1, 0)
        .await?;
    let total_results = probe.total_results.ok_or_else(|| {
        etl_error!(
            ErrorKind::FetchFailed,
            "Probe response missing total count",
            format!("endpoint `{}`", descriptor.endpoint)
        )
    })?;

    let offsets = page_offsets(total_results, page_size);
    debug!(
        table = descriptor.table,
        total_results,
        num_pages = offsets.len(),
        "fanning out page requests"
    );

    let limiter = max_concurrent_pages.map(|permits| Arc::new(Semaphore::new(permits)));
    let pages = offsets.into_iter().map(|skip| {
        let limiter = limiter.clone();
        async move {
            let _permit = match &limiter {
                Some(semaphore) => Some(
                    semaphore
                        .acquire()
                        .await
                        .expect("page limiter semaphore is never closed"),
                ),
                None => None,
            };

            source
                .fetch_page(descriptor.endpoint, Some(filter), page_size, skip)
                .await
        }
    });

    let mut rows = Vec::with_capacity(total_results as usize);
    let mut errors: Vec<EtlError> = Vec::new();
    for result in future::join_all(pages).await {
        match result {
            Ok(page) => rows.extend(page.data),
            Err(err) => errors.push(err),
        }
    }

    if !errors.is_empty() {
        return Err(errors.into());
    }

    info!(
        table = descriptor.table,
        num_rows = rows.len(),
        "windowed fetch completed"
    );

    Ok(rows)
}

/// Computes the page offsets covering `[0, total_results)`.
fn page_offsets(total_results: u64, page_size: u64) -> Vec<u64> {
    (0..total_results).step_by(page_size as usize).collect()
}
