//! BigQuery-backed [`TableStore`].
//!
//! Staged rows stream into a run-scoped scratch table and move to staging in
//! a single `INSERT INTO ... SELECT`, so a batch lands fully or not at all.
//! The watermark and compaction run as SQL jobs. Compaction uses a single
//! `CREATE OR REPLACE TABLE ... AS SELECT` statement so the canonical table
//! swaps atomically.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use gcp_bigquery_client::Client;
use gcp_bigquery_client::client_builder::ClientBuilder;
use gcp_bigquery_client::error::BQError;
use gcp_bigquery_client::model::query_request::QueryRequest;
use gcp_bigquery_client::model::query_response::ResultSet;
use gcp_bigquery_client::model::table_data_insert_all_request::TableDataInsertAllRequest;
use gcp_bigquery_client::yup_oauth2::parse_service_account_key;
use tracing::info;

use crate::error::{ErrorKind, EtlError, EtlResult};
use crate::etl_error;
use crate::schema::{FieldMode, FieldSchema, FieldType, TableSchema};
use crate::store::TableStore;
use crate::types::TransformedRow;

/// Maximum number of rows per `insertAll` request.
const INSERT_BATCH_SIZE: usize = 500;

/// Table store backed by a Google BigQuery dataset.
#[derive(Clone)]
pub struct BigQueryTableStore {
    project_id: String,
    dataset_id: String,
    client: Client,
}

impl BigQueryTableStore {
    /// Creates a new [`BigQueryTableStore`] from a service account key JSON
    /// string.
    pub async fn new_with_key(
        project_id: String,
        dataset_id: String,
        sa_key: &str,
    ) -> EtlResult<Self> {
        let sa_key = parse_service_account_key(sa_key)
            .map_err(BQError::from)
            .map_err(bq_error_to_etl_error)?;
        let client = ClientBuilder::new()
            .build_from_service_account_key(sa_key, false)
            .await
            .map_err(bq_error_to_etl_error)?;

        Ok(Self {
            project_id,
            dataset_id,
            client,
        })
    }

    /// Returns the fully qualified, backtick quoted table name.
    fn full_table_name(&self, table: &str) -> EtlResult<String> {
        let project_id = sanitize_identifier(&self.project_id, "BigQuery project id")?;
        let dataset_id = sanitize_identifier(&self.dataset_id, "BigQuery dataset id")?;
        let table = sanitize_identifier(table, "BigQuery table name")?;

        Ok(format!("`{project_id}.{dataset_id}.{table}`"))
    }

    async fn query(&self, request: QueryRequest) -> EtlResult<ResultSet> {
        let query_response = self
            .client
            .job()
            .query(&self.project_id, request)
            .await
            .map_err(bq_error_to_etl_error)?;

        Ok(ResultSet::new_from_query_response(query_response))
    }

    /// Checks whether a table exists in the dataset.
    async fn table_exists(&self, table: &str) -> EtlResult<bool> {
        let result = self
            .client
            .table()
            .get(&self.project_id, &self.dataset_id, table, None)
            .await;

        let exists =
            !matches!(result, Err(BQError::ResponseError { error }) if error.error.code == 404);

        Ok(exists)
    }

    /// Creates `table` from `schema` if it does not exist yet.
    async fn ensure_table(&self, table: &str, schema: &TableSchema) -> EtlResult<()> {
        if self.table_exists(table).await? {
            return Ok(());
        }

        let full_table_name = self.full_table_name(table)?;
        let columns_spec = columns_spec(schema)?;

        info!(%full_table_name, "creating table in bigquery");

        let query = format!("create table if not exists {full_table_name} ({columns_spec})");
        let _ = self.query(QueryRequest::new(query)).await?;

        Ok(())
    }

    /// Streams `rows` into `table` in [`INSERT_BATCH_SIZE`] chunks.
    async fn insert_chunks(&self, table: &str, rows: &[TransformedRow]) -> EtlResult<()> {
        for batch in rows.chunks(INSERT_BATCH_SIZE) {
            let mut request = TableDataInsertAllRequest::new();
            for row in batch {
                request
                    .add_row(None, row)
                    .map_err(bq_error_to_etl_error)?;
            }

            let response = self
                .client
                .tabledata()
                .insert_all(&self.project_id, &self.dataset_id, table, request)
                .await
                .map_err(bq_error_to_etl_error)?;

            if let Some(insert_errors) = response.insert_errors
                && !insert_errors.is_empty()
            {
                return Err(etl_error!(
                    ErrorKind::LoadFailed,
                    "BigQuery rejected staged rows",
                    format!("table `{table}`: {insert_errors:?}")
                ));
            }
        }

        Ok(())
    }
}

impl TableStore for BigQueryTableStore {
    async fn append_rows(
        &self,
        table: &str,
        schema: &TableSchema,
        rows: Vec<TransformedRow>,
    ) -> EtlResult<u64> {
        self.ensure_table(table, schema).await?;

        let num_rows = rows.len() as u64;
        if rows.is_empty() {
            return Ok(0);
        }

        // Chunked streaming inserts can fail partway through a batch, so rows
        // land in a run-scoped scratch table first and move to staging in a
        // single statement.
        let scratch = scratch_table_name(table);
        self.ensure_table(&scratch, schema).await?;

        let staging_name = self.full_table_name(table)?;
        let scratch_name = self.full_table_name(&scratch)?;

        let mut outcome = self.insert_chunks(&scratch, &rows).await;
        if outcome.is_ok() {
            outcome = self
                .query(QueryRequest::new(format!(
                    "insert into {staging_name} select * from {scratch_name}"
                )))
                .await
                .map(|_| ());
        }

        // Best effort, an orphaned scratch table never corrupts staging.
        let _ = self
            .query(QueryRequest::new(format!(
                "drop table if exists {scratch_name}"
            )))
            .await;

        outcome?;

        info!(table, num_rows, "appended rows to bigquery table");

        Ok(num_rows)
    }

    async fn max_increment(&self, table: &str, column: &str) -> EtlResult<Option<DateTime<Utc>>> {
        let full_table_name = self.full_table_name(table)?;
        let column = sanitize_identifier(column, "BigQuery column name")?;

        let query = format!("select max(`{column}`) from {full_table_name}");
        let result = self
            .client
            .job()
            .query(&self.project_id, QueryRequest::new(query))
            .await;

        let query_response = match result {
            Ok(query_response) => query_response,
            // A missing table means no watermark, not a failure.
            Err(BQError::ResponseError { error }) if error.error.code == 404 => return Ok(None),
            Err(err) => return Err(bq_error_to_etl_error(err)),
        };

        let mut result_set = ResultSet::new_from_query_response(query_response);
        if !result_set.next_row() {
            return Ok(None);
        }

        let raw = result_set.get_string(0).map_err(bq_error_to_etl_error)?;
        match raw {
            Some(raw) => Ok(Some(parse_timestamp(&raw)?)),
            None => Ok(None),
        }
    }

    async fn replace_with_latest(
        &self,
        canonical: &str,
        staging: &str,
        primary_key: &[&str],
        increment_key: &str,
    ) -> EtlResult<u64> {
        let canonical_name = self.full_table_name(canonical)?;
        let staging_name = self.full_table_name(staging)?;
        let increment_key = sanitize_identifier(increment_key, "BigQuery column name")?;

        let partition_columns = primary_key
            .iter()
            .map(|column| {
                sanitize_identifier(column, "BigQuery primary key column")
                    .map(|column| format!("`{column}`"))
            })
            .collect::<EtlResult<Vec<_>>>()?
            .join(", ");

        info!(
            canonical = canonical_name,
            staging = staging_name,
            "replacing table with compacted staged rows"
        );

        let query = format!(
            "create or replace table {canonical_name} as \
             select * except (_row_number) from ( \
               select *, row_number() over ( \
                 partition by {partition_columns} order by `{increment_key}` desc \
               ) as _row_number from {staging_name} \
             ) where _row_number = 1"
        );
        self.client
            .job()
            .query(&self.project_id, QueryRequest::new(query))
            .await
            .map_err(compact_failed)?;

        let mut result_set = self
            .query(QueryRequest::new(format!(
                "select count(*) from {canonical_name}"
            )))
            .await
            .map_err(compact_failed)?;
        let output_rows = if result_set.next_row() {
            result_set
                .get_i64(0)
                .map_err(compact_failed)?
                .unwrap_or(0) as u64
        } else {
            0
        };

        Ok(output_rows)
    }
}

/// Parses a timestamp cell from a BigQuery REST result.
///
/// The REST API returns TIMESTAMP columns as epoch seconds in scientific
/// notation, for example `1.7105472E9`. RFC 3339 is accepted as well.
fn parse_timestamp(raw: &str) -> EtlResult<DateTime<Utc>> {
    if let Ok(epoch_seconds) = raw.parse::<f64>() {
        let seconds = epoch_seconds.trunc() as i64;
        let nanos = ((epoch_seconds - epoch_seconds.trunc()) * 1e9).round() as u32;
        if let Some(parsed) = DateTime::from_timestamp(seconds, nanos) {
            return Ok(parsed);
        }
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }

    Err(etl_error!(
        ErrorKind::StoreQueryFailed,
        "Unparsable watermark value",
        format!("`{raw}` is neither epoch seconds nor RFC 3339")
    ))
}

/// Sanitizes a BigQuery identifier for safe backtick quoting.
fn sanitize_identifier(identifier: &str, context: &str) -> EtlResult<String> {
    if identifier.is_empty() {
        return Err(etl_error!(
            ErrorKind::StoreQueryFailed,
            "Invalid BigQuery identifier",
            format!("{context} cannot be empty")
        ));
    }

    if identifier.chars().any(char::is_control) {
        return Err(etl_error!(
            ErrorKind::StoreQueryFailed,
            "Invalid BigQuery identifier",
            format!("{context} contains control characters")
        ));
    }

    let mut escaped = String::with_capacity(identifier.len());
    for ch in identifier.chars() {
        match ch {
            '`' => escaped.push_str("\\`"),
            '\\' => escaped.push_str("\\\\"),
            _ => escaped.push(ch),
        }
    }

    Ok(escaped)
}

fn bigquery_type(field: &FieldSchema) -> EtlResult<String> {
    let scalar = match field.typ {
        FieldType::String => "string",
        FieldType::Timestamp => "timestamp",
        FieldType::Float => "float64",
        FieldType::Record => {
            let members = field
                .fields
                .iter()
                .map(column_spec)
                .collect::<EtlResult<Vec<_>>>()?
                .join(", ");
            return Ok(format!("array<struct<{members}>>"));
        }
    };

    Ok(scalar.to_string())
}

/// Generates the SQL column specification for a single field.
fn column_spec(field: &FieldSchema) -> EtlResult<String> {
    let name = sanitize_identifier(field.name, "BigQuery column name")?;
    let mut spec = format!("`{name}` {}", bigquery_type(field)?);

    if field.mode == FieldMode::Required {
        spec.push_str(" not null");
    }

    Ok(spec)
}

/// Builds the complete column list for CREATE TABLE statements.
fn columns_spec(schema: &TableSchema) -> EtlResult<String> {
    Ok(schema
        .fields
        .iter()
        .map(column_spec)
        .collect::<EtlResult<Vec<_>>>()?
        .join(", "))
}

/// Returns a unique scratch table name for a single load into `table`.
fn scratch_table_name(table: &str) -> String {
    static LOAD_SEQUENCE: AtomicU64 = AtomicU64::new(0);

    let sequence = LOAD_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("{table}_load_{}_{sequence}", Utc::now().timestamp_millis())
}

/// Wraps an error raised while rewriting the canonical table as a compaction
/// failure.
fn compact_failed(err: impl std::fmt::Display) -> EtlError {
    etl_error!(
        ErrorKind::CompactFailed,
        "BigQuery compaction failed",
        err.to_string()
    )
}

/// Converts BigQuery errors to ETL errors with appropriate classification.
fn bq_error_to_etl_error(err: BQError) -> EtlError {
    let (kind, description) = match &err {
        BQError::InvalidServiceAccountKey(_)
        | BQError::InvalidServiceAccountAuthenticator(_)
        | BQError::AuthError(_)
        | BQError::YupAuthError(_)
        | BQError::NoToken => (
            ErrorKind::ConfigError,
            "BigQuery authentication failed",
        ),
        BQError::RequestError(_) => (ErrorKind::IoError, "BigQuery request failed"),
        BQError::ResponseError { .. } => {
            (ErrorKind::StoreQueryFailed, "BigQuery response error")
        }
        BQError::SerializationError(_) => (
            ErrorKind::SerializationError,
            "BigQuery serialization error",
        ),
        _ => (ErrorKind::Unknown, "BigQuery operation failed"),
    };

    etl_error!(kind, description, err.to_string())
}
