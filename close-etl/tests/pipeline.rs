#![cfg(feature = "test-utils")]

use chrono::{TimeZone, Utc};
use close_etl::entity::EntityKind;
use close_etl::error::ErrorKind;
use close_etl::pipeline::Pipeline;
use close_etl::store::memory::MemoryTableStore;
use close_etl::test_utils::StubApiSource;
use close_etl_config::shared::PipelineConfig;
use close_etl_telemetry::tracing::init_test_tracing;
use serde_json::json;

fn pipeline_config() -> PipelineConfig {
    PipelineConfig {
        page_size: 100,
        max_concurrent_pages: None,
    }
}

fn raw_lead(id: &str, date_updated: &str) -> serde_json::Value {
    json!({
        "id": id,
        "date_updated": date_updated,
        "display_name": format!("lead {id}"),
        "contacts": [],
    })
}

fn raw_user(id: &str, email: &str) -> serde_json::Value {
    json!({
        "id": id,
        "email": email,
        "date_updated": "2024-01-01T00:00:00+00:00",
    })
}

#[tokio::test]
async fn windowed_run_fans_out_one_request_per_page() {
    init_test_tracing();

    let source = StubApiSource::new();
    let rows = (0..250)
        .map(|n| raw_lead(&format!("lead_{n}"), "2024-01-10T00:00:00+00:00"))
        .collect();
    source.set_dataset("lead", rows).await;

    let pipeline = Pipeline::new(pipeline_config(), source.clone(), MemoryTableStore::new());
    let result = pipeline
        .run(EntityKind::Lead, Some("2024-01-01"), Some("2024-02-01"))
        .await
        .unwrap();

    assert_eq!(result.num_processed, 250);
    assert_eq!(result.output_rows, Some(250));

    // One single-row probe plus one request per page of 100 over 250 rows.
    let requests = source.requests().await;
    assert_eq!(requests.len(), 4);
    assert_eq!(requests[0].skip, 0);
    assert_eq!(requests[0].limit, 1);
    let mut fan_out_offsets: Vec<u64> = requests[1..].iter().map(|request| request.skip).collect();
    fan_out_offsets.sort_unstable();
    assert_eq!(fan_out_offsets, vec![0, 100, 200]);

    for request in &requests {
        assert_eq!(
            request.filter.as_deref(),
            Some("date_updated > 2024-01-01 date_updated < 2024-02-01")
        );
    }
    assert!(requests[1..].iter().all(|request| request.limit == 100));
}

#[tokio::test]
async fn windowed_run_caps_in_flight_pages_when_configured() {
    init_test_tracing();

    let source = StubApiSource::new();
    let rows = (0..250)
        .map(|n| raw_lead(&format!("lead_{n}"), "2024-01-10T00:00:00+00:00"))
        .collect();
    source.set_dataset("lead", rows).await;

    let config = PipelineConfig {
        page_size: 100,
        max_concurrent_pages: Some(1),
    };
    let pipeline = Pipeline::new(config, source.clone(), MemoryTableStore::new());
    let result = pipeline
        .run(EntityKind::Lead, Some("2024-01-01"), Some("2024-02-01"))
        .await
        .unwrap();

    // The cap throttles the fan-out without changing what gets fetched.
    assert_eq!(result.num_processed, 250);
    assert_eq!(source.requests().await.len(), 4);
}

#[tokio::test]
async fn staged_update_replaces_the_canonical_row() {
    init_test_tracing();

    let source = StubApiSource::new();
    let store = MemoryTableStore::new();
    let pipeline = Pipeline::new(pipeline_config(), source.clone(), store.clone());

    source
        .set_dataset("lead", vec![raw_lead("a", "2024-01-05T00:00:00+00:00")])
        .await;
    pipeline
        .run(EntityKind::Lead, Some("2024-01-01"), Some("2024-02-01"))
        .await
        .unwrap();

    // The same lead comes back updated in a later window.
    source
        .set_dataset("lead", vec![raw_lead("a", "2024-02-05T00:00:00+00:00")])
        .await;
    let result = pipeline
        .run(EntityKind::Lead, Some("2024-02-01"), Some("2024-03-01"))
        .await
        .unwrap();

    assert_eq!(result.output_rows, Some(1));

    let canonical = store.table_rows("Lead").await;
    assert_eq!(canonical.len(), 1);
    assert_eq!(canonical[0]["date_updated"], json!("2024-02-05T00:00:00+00:00"));

    // Both versions remain in staging, append-only.
    assert_eq!(store.table_rows("_stage_Lead").await.len(), 2);
}

#[tokio::test]
async fn output_rows_counts_this_runs_staged_batch_only() {
    init_test_tracing();

    let source = StubApiSource::new();
    let store = MemoryTableStore::new();
    let pipeline = Pipeline::new(pipeline_config(), source.clone(), store.clone());

    source
        .set_dataset(
            "lead",
            vec![
                raw_lead("a", "2024-01-05T00:00:00+00:00"),
                raw_lead("b", "2024-01-06T00:00:00+00:00"),
            ],
        )
        .await;
    pipeline
        .run(EntityKind::Lead, Some("2024-01-01"), Some("2024-02-01"))
        .await
        .unwrap();

    // Only one new lead in the next window, even though compaction leaves
    // three rows in the canonical table.
    source
        .set_dataset("lead", vec![raw_lead("c", "2024-02-05T00:00:00+00:00")])
        .await;
    let result = pipeline
        .run(EntityKind::Lead, Some("2024-02-01"), Some("2024-03-01"))
        .await
        .unwrap();

    assert_eq!(result.num_processed, 1);
    assert_eq!(result.output_rows, Some(1));
    assert_eq!(store.table_rows("Lead").await.len(), 3);
}

#[tokio::test]
async fn zero_page_size_is_rejected() {
    init_test_tracing();

    let source = StubApiSource::new();
    source
        .set_dataset("lead", vec![raw_lead("a", "2024-01-05T00:00:00+00:00")])
        .await;

    let config = PipelineConfig {
        page_size: 0,
        max_concurrent_pages: None,
    };
    let pipeline = Pipeline::new(config, source.clone(), MemoryTableStore::new());
    let err = pipeline
        .run(EntityKind::Lead, Some("2024-01-01"), Some("2024-02-01"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ConfigError);
    assert!(source.requests().await.is_empty());
}

#[tokio::test]
async fn rerunning_the_same_window_leaves_the_canonical_table_unchanged() {
    init_test_tracing();

    let source = StubApiSource::new();
    let store = MemoryTableStore::new();
    let pipeline = Pipeline::new(pipeline_config(), source.clone(), store.clone());

    source
        .set_dataset(
            "lead",
            vec![
                raw_lead("a", "2024-01-05T00:00:00+00:00"),
                raw_lead("b", "2024-01-06T00:00:00+00:00"),
            ],
        )
        .await;

    pipeline
        .run(EntityKind::Lead, Some("2024-01-01"), Some("2024-02-01"))
        .await
        .unwrap();
    let first = store.table_rows("Lead").await;

    pipeline
        .run(EntityKind::Lead, Some("2024-01-01"), Some("2024-02-01"))
        .await
        .unwrap();
    let second = store.table_rows("Lead").await;

    assert_eq!(first, second);
    assert_eq!(store.table_rows("_stage_Lead").await.len(), 4);
}

#[tokio::test]
async fn empty_fetch_skips_load_and_compaction() {
    init_test_tracing();

    let source = StubApiSource::new();
    let store = MemoryTableStore::new();
    source.set_dataset("lead", Vec::new()).await;

    let pipeline = Pipeline::new(pipeline_config(), source.clone(), store.clone());
    let result = pipeline
        .run(EntityKind::Lead, Some("2024-01-01"), Some("2024-02-01"))
        .await
        .unwrap();

    assert_eq!(result.num_processed, 0);
    assert_eq!(result.output_rows, None);
    assert!(result.start.is_some());
    assert!(store.table_rows("_stage_Lead").await.is_empty());
    assert!(store.table_rows("Lead").await.is_empty());

    // Only the probe went out, there was nothing to fan out over.
    assert_eq!(source.requests().await.len(), 1);
}

#[tokio::test]
async fn derived_window_runs_from_the_stored_watermark() {
    init_test_tracing();

    let source = StubApiSource::new();
    let store = MemoryTableStore::new();
    store
        .insert_row(
            "Lead",
            json!({"id": "a", "date_updated": "2024-03-10T00:00:00Z"}),
        )
        .await;
    source
        .set_dataset("lead", vec![raw_lead("b", "2024-03-15T00:00:00+00:00")])
        .await;

    let pipeline = Pipeline::new(pipeline_config(), source.clone(), store.clone());
    let run_started = Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap();
    let result = pipeline
        .run_at(EntityKind::Lead, None, None, run_started)
        .await
        .unwrap();

    assert_eq!(
        result.start,
        Some(Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap())
    );
    assert_eq!(result.end, Some(run_started));

    let requests = source.requests().await;
    assert_eq!(
        requests[0].filter.as_deref(),
        Some("date_updated > 2024-03-10 date_updated < 2024-04-01")
    );
}

#[tokio::test]
async fn derived_window_without_watermark_fails() {
    init_test_tracing();

    let source = StubApiSource::new();
    source.set_dataset("lead", Vec::new()).await;

    let pipeline = Pipeline::new(pipeline_config(), source.clone(), MemoryTableStore::new());
    let err = pipeline.run(EntityKind::Lead, None, None).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NoWatermark);
    assert!(source.requests().await.is_empty());
}

#[tokio::test]
async fn failed_page_aborts_the_run_without_staging_anything() {
    init_test_tracing();

    let source = StubApiSource::new();
    let store = MemoryTableStore::new();
    let rows = (0..250)
        .map(|n| raw_lead(&format!("lead_{n}"), "2024-01-10T00:00:00+00:00"))
        .collect();
    source.set_dataset("lead", rows).await;
    source.fail_page("lead", 100).await;

    let pipeline = Pipeline::new(pipeline_config(), source.clone(), store.clone());
    let err = pipeline
        .run(EntityKind::Lead, Some("2024-01-01"), Some("2024-02-01"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::FetchFailed);
    assert!(store.table_rows("_stage_Lead").await.is_empty());
    assert!(store.table_rows("Lead").await.is_empty());
}

#[tokio::test]
async fn full_scan_entity_pages_sequentially() {
    init_test_tracing();

    let source = StubApiSource::new();
    let store = MemoryTableStore::new();
    let rows = (0..250)
        .map(|n| raw_user(&format!("user_{n}"), &format!("user_{n}@acme.test")))
        .collect();
    source.set_dataset("user", rows).await;

    let pipeline = Pipeline::new(pipeline_config(), source.clone(), store.clone());
    let result = pipeline.run(EntityKind::User, None, None).await.unwrap();

    assert_eq!(result.num_processed, 250);
    assert_eq!(result.output_rows, Some(250));
    assert_eq!(result.start, None);
    assert_eq!(result.end, None);

    // Sequential cursor, no filter, offsets strictly increasing.
    let requests = source.requests().await;
    let offsets: Vec<u64> = requests.iter().map(|request| request.skip).collect();
    assert_eq!(offsets, vec![0, 100, 200]);
    assert!(requests.iter().all(|request| request.filter.is_none()));
}

#[tokio::test]
async fn full_scan_entity_ignores_explicit_bounds() {
    init_test_tracing();

    let source = StubApiSource::new();
    source
        .set_dataset("user", vec![raw_user("user_1", "one@acme.test")])
        .await;

    let pipeline = Pipeline::new(pipeline_config(), source.clone(), MemoryTableStore::new());
    let result = pipeline
        .run(EntityKind::User, Some("2024-01-01"), Some("2024-02-01"))
        .await
        .unwrap();

    assert_eq!(result.num_processed, 1);
    assert_eq!(result.start, None);
    assert!(source.requests().await[0].filter.is_none());
}

#[tokio::test]
async fn full_scan_rerun_deduplicates_by_primary_key() {
    init_test_tracing();

    let source = StubApiSource::new();
    let store = MemoryTableStore::new();
    source
        .set_dataset(
            "user",
            vec![
                raw_user("user_1", "one@acme.test"),
                raw_user("user_2", "two@acme.test"),
            ],
        )
        .await;

    let pipeline = Pipeline::new(pipeline_config(), source.clone(), store.clone());
    pipeline.run(EntityKind::User, None, None).await.unwrap();

    source
        .set_dataset(
            "user",
            vec![
                raw_user("user_1", "renamed@acme.test"),
                raw_user("user_2", "two@acme.test"),
            ],
        )
        .await;
    let result = pipeline.run(EntityKind::User, None, None).await.unwrap();

    assert_eq!(result.output_rows, Some(2));

    let canonical = store.table_rows("User").await;
    let user_1 = canonical
        .iter()
        .find(|row| row["id"] == json!("user_1"))
        .unwrap();
    assert_eq!(user_1["email"], json!("renamed@acme.test"));
}

#[tokio::test]
async fn malformed_row_fails_the_run_before_staging() {
    init_test_tracing();

    let source = StubApiSource::new();
    let store = MemoryTableStore::new();
    source
        .set_dataset(
            "lead",
            vec![
                raw_lead("a", "2024-01-05T00:00:00+00:00"),
                json!({"display_name": "missing id and date_updated"}),
            ],
        )
        .await;

    let pipeline = Pipeline::new(pipeline_config(), source.clone(), store.clone());
    let err = pipeline
        .run(EntityKind::Lead, Some("2024-01-01"), Some("2024-02-01"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::SchemaViolation);
    assert!(store.table_rows("_stage_Lead").await.is_empty());
}

#[tokio::test]
async fn partial_explicit_bounds_are_rejected_for_incremental_entities() {
    init_test_tracing();

    let source = StubApiSource::new();
    source.set_dataset("lead", Vec::new()).await;

    let pipeline = Pipeline::new(pipeline_config(), source.clone(), MemoryTableStore::new());
    let err = pipeline
        .run(EntityKind::Lead, Some("2024-01-01"), None)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidWindow);
}
