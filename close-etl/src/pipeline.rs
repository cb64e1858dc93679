//! Pipeline orchestration.
//!
//! A [`Pipeline`] binds an [`ApiSource`] and a [`TableStore`] and drives one
//! entity through fetch, transform, staging load and compaction. Runs for
//! different entities may overlap freely; runs for the same entity serialize
//! their compaction step behind a per-entity lock so concurrent runs cannot
//! interleave a table replacement.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use close_etl_config::shared::PipelineConfig;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::bail;
use crate::entity::EntityKind;
use crate::error::{ErrorKind, EtlResult};
use crate::fetch::{fetch_full, fetch_window};
use crate::source::ApiSource;
use crate::store::TableStore;
use crate::types::RunResult;
use crate::watermark::resolve_window;

/// Orchestrates incremental extraction runs against a source and a store.
#[derive(Debug)]
pub struct Pipeline<S, T> {
    config: PipelineConfig,
    source: S,
    store: T,
    compaction_locks: HashMap<EntityKind, Mutex<()>>,
}

impl<S, T> Pipeline<S, T>
where
    S: ApiSource + Sync,
    T: TableStore + Sync,
{
    /// Creates a new pipeline over the given source and store.
    pub fn new(config: PipelineConfig, source: S, store: T) -> Self {
        let compaction_locks = EntityKind::ALL
            .iter()
            .map(|kind| (*kind, Mutex::new(())))
            .collect();

        Self {
            config,
            source,
            store,
            compaction_locks,
        }
    }

    /// Returns the store this pipeline loads into.
    pub fn store(&self) -> &T {
        &self.store
    }

    /// Runs one extraction for `kind`, stamping the run with the current
    /// time as the upper bound for derived windows.
    ///
    /// `start`/`end` are optional explicit `%Y-%m-%d` window bounds; they
    /// only apply to incremental entities and must be given together.
    pub async fn run(
        &self,
        kind: EntityKind,
        start: Option<&str>,
        end: Option<&str>,
    ) -> EtlResult<RunResult> {
        self.run_at(kind, start, end, Utc::now()).await
    }

    /// Runs one extraction for `kind` with an explicit run timestamp.
    ///
    /// The timestamp caps derived fetch windows, which keeps a run's window
    /// stable no matter how long the run itself takes.
    pub async fn run_at(
        &self,
        kind: EntityKind,
        start: Option<&str>,
        end: Option<&str>,
        run_started: DateTime<Utc>,
    ) -> EtlResult<RunResult> {
        if self.config.page_size == 0 {
            bail!(
                ErrorKind::ConfigError,
                "Invalid page size",
                "`pipeline.page_size` must be at least 1"
            );
        }

        let descriptor = kind.descriptor();

        info!(table = descriptor.table, "starting pipeline run");

        let (rows, window) = if descriptor.is_incremental {
            let window =
                resolve_window(descriptor, &self.store, start, end, run_started).await?;

            info!(
                table = descriptor.table,
                start = %window.start,
                end = %window.end,
                "resolved fetch window"
            );

            let rows = fetch_window(
                &self.source,
                descriptor,
                &window,
                self.config.page_size,
                self.config.max_concurrent_pages,
            )
            .await?;

            (rows, Some(window))
        } else {
            if start.is_some() || end.is_some() {
                warn!(
                    table = descriptor.table,
                    "ignoring explicit window bounds for a full scan entity"
                );
            }

            let rows = fetch_full(&self.source, descriptor, self.config.page_size).await?;

            (rows, None)
        };

        if rows.is_empty() {
            info!(
                table = descriptor.table,
                "no rows fetched, skipping load and compaction"
            );

            return Ok(RunResult {
                table: descriptor.table.to_owned(),
                num_processed: 0,
                start: window.map(|window| window.start),
                end: window.map(|window| window.end),
                output_rows: None,
            });
        }

        let transformed = kind.transform(rows)?;
        let num_processed = transformed.len() as u64;

        let staging_table = descriptor.staging_table();
        let output_rows = self
            .store
            .append_rows(&staging_table, &descriptor.schema, transformed)
            .await?;

        info!(
            table = descriptor.table,
            output_rows, "staged rows, compacting"
        );

        let _compaction_guard = self.compaction_locks[&kind].lock().await;
        let compacted_rows = self
            .store
            .replace_with_latest(
                descriptor.table,
                &staging_table,
                descriptor.primary_key,
                descriptor.increment_key,
            )
            .await?;

        info!(
            table = descriptor.table,
            num_processed, output_rows, compacted_rows, "pipeline run completed"
        );

        Ok(RunResult {
            table: descriptor.table.to_owned(),
            num_processed,
            start: window.map(|window| window.start),
            end: window.map(|window| window.end),
            output_rows: Some(output_rows),
        })
    }
}
