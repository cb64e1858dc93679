//! Fetch window resolution for incremental entities.
//!
//! A run either receives explicit `start`/`end` date bounds or derives the
//! window from the destination: the lower bound is the maximum value of the
//! entity's increment column already stored, the upper bound is the
//! timestamp captured when the run began.

use chrono::{DateTime, NaiveDate, Utc};

use crate::bail;
use crate::entity::EntityDescriptor;
use crate::error::{ErrorKind, EtlResult};
use crate::store::TableStore;
use crate::types::{DATE_FORMAT, FetchWindow};

/// Resolves the fetch window for an incremental entity.
///
/// When both `start` and `end` are given they are parsed as `%Y-%m-%d`
/// dates at UTC midnight. Otherwise the window is derived from the stored
/// watermark: `[MAX(increment_key), run_started)`. A derived window over an
/// empty or missing table fails with [`ErrorKind::NoWatermark`] rather than
/// silently turning into a full backfill.
pub async fn resolve_window<T>(
    descriptor: &EntityDescriptor,
    store: &T,
    start: Option<&str>,
    end: Option<&str>,
    run_started: DateTime<Utc>,
) -> EtlResult<FetchWindow>
where
    T: TableStore,
{
    let window = match (start, end) {
        (Some(start), Some(end)) => FetchWindow {
            start: parse_bound(start)?,
            end: parse_bound(end)?,
        },
        (None, None) => {
            let watermark = store
                .max_increment(descriptor.table, descriptor.increment_key)
                .await?;
            match watermark {
                Some(watermark) => FetchWindow {
                    start: watermark,
                    end: run_started,
                },
                None => bail!(
                    ErrorKind::NoWatermark,
                    "No watermark available",
                    format!(
                        "table `{}` has no rows to derive a lower bound from, pass explicit bounds",
                        descriptor.table
                    )
                ),
            }
        }
        _ => bail!(
            ErrorKind::InvalidWindow,
            "Partial window bounds",
            "either both `start` and `end` must be supplied or neither"
        ),
    };

    if window.start >= window.end {
        bail!(
            ErrorKind::InvalidWindow,
            "Empty fetch window",
            format!(
                "window start {} is not before end {}",
                window.start, window.end
            )
        );
    }

    Ok(window)
}

fn parse_bound(raw: &str) -> EtlResult<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(raw, DATE_FORMAT)?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| crate::etl_error!(ErrorKind::InvalidWindow, "Invalid window bound"))?;
    Ok(midnight.and_utc())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::entity::EntityKind;
    use crate::store::memory::MemoryTableStore;

    fn run_started() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 30, 0).unwrap()
    }

    #[tokio::test]
    async fn explicit_bounds_parse_to_utc_midnight() {
        let store = MemoryTableStore::new();
        let descriptor = EntityKind::Lead.descriptor();

        let window = resolve_window(
            descriptor,
            &store,
            Some("2024-01-01"),
            Some("2024-02-01"),
            run_started(),
        )
        .await
        .unwrap();

        assert_eq!(window.start, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(window.end, Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn unparsable_bound_is_an_invalid_window() {
        let store = MemoryTableStore::new();
        let descriptor = EntityKind::Lead.descriptor();

        let err = resolve_window(
            descriptor,
            &store,
            Some("01/02/2024"),
            Some("2024-02-01"),
            run_started(),
        )
        .await
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidWindow);
    }

    #[tokio::test]
    async fn inverted_bounds_are_rejected() {
        let store = MemoryTableStore::new();
        let descriptor = EntityKind::Lead.descriptor();

        let err = resolve_window(
            descriptor,
            &store,
            Some("2024-02-01"),
            Some("2024-01-01"),
            run_started(),
        )
        .await
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidWindow);

        let err = resolve_window(
            descriptor,
            &store,
            Some("2024-01-01"),
            Some("2024-01-01"),
            run_started(),
        )
        .await
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidWindow);
    }

    #[tokio::test]
    async fn partial_bounds_are_rejected() {
        let store = MemoryTableStore::new();
        let descriptor = EntityKind::Lead.descriptor();

        let err = resolve_window(descriptor, &store, Some("2024-01-01"), None, run_started())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidWindow);
    }

    #[tokio::test]
    async fn derived_window_runs_from_watermark_to_run_start() {
        let store = MemoryTableStore::new();
        let descriptor = EntityKind::Lead.descriptor();
        store
            .insert_row(
                descriptor.table,
                serde_json::json!({"id": "lead_1", "date_updated": "2024-03-15T08:00:00Z"}),
            )
            .await;
        store
            .insert_row(
                descriptor.table,
                serde_json::json!({"id": "lead_2", "date_updated": "2024-03-20T08:00:00Z"}),
            )
            .await;

        let window = resolve_window(descriptor, &store, None, None, run_started())
            .await
            .unwrap();

        assert_eq!(
            window.start,
            Utc.with_ymd_and_hms(2024, 3, 20, 8, 0, 0).unwrap()
        );
        assert_eq!(window.end, run_started());
    }

    #[tokio::test]
    async fn missing_watermark_is_a_hard_error() {
        let store = MemoryTableStore::new();
        let descriptor = EntityKind::Lead.descriptor();

        let err = resolve_window(descriptor, &store, None, None, run_started())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NoWatermark);
    }
}
