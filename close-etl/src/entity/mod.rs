//! Extractable entities and their normalization rules.
//!
//! Every resource the pipeline can extract is a variant of [`EntityKind`];
//! the orchestrator matches on it exhaustively, so adding an entity is a
//! compile-time checked change rather than a string-dispatch convention.
//! Each variant carries a static [`EntityDescriptor`] and a pure transform
//! from raw API rows to rows conforming to the declared schema tree.

use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value};

use crate::error::{ErrorKind, EtlError, EtlResult};
use crate::schema::TableSchema;
use crate::types::{RawRow, TransformedRow};
use crate::{bail, etl_error};

mod activity;
mod lead;
mod opportunity;
mod user;

/// Prefix identifying org-specific custom fields in raw API rows.
const CUSTOM_FIELD_PREFIX: &str = "custom.";

/// Static metadata for one extractable resource.
#[derive(Debug, Clone, Copy)]
pub struct EntityDescriptor {
    /// Resource path segment under the API base URL.
    pub endpoint: &'static str,
    /// Canonical output table identifier.
    pub table: &'static str,
    /// Columns whose combination must be unique in the canonical table.
    pub primary_key: &'static [&'static str],
    /// Monotonic column used for watermarking and dedup tie-breaking.
    pub increment_key: &'static str,
    /// Whether fetching is time-windowed or a full scan per run.
    pub is_incremental: bool,
    /// Output schema tree; the load-time contract for transformed rows.
    pub schema: TableSchema,
}

impl EntityDescriptor {
    /// Name of the append-only staging table backing this entity.
    pub fn staging_table(&self) -> String {
        format!("_stage_{}", self.table)
    }
}

/// The closed set of extractable entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Lead,
    Activity,
    Opportunity,
    User,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Lead,
        EntityKind::Activity,
        EntityKind::Opportunity,
        EntityKind::User,
    ];

    /// Returns the static descriptor for this entity.
    pub fn descriptor(&self) -> &'static EntityDescriptor {
        match self {
            EntityKind::Lead => &lead::DESCRIPTOR,
            EntityKind::Activity => &activity::DESCRIPTOR,
            EntityKind::Opportunity => &opportunity::DESCRIPTOR,
            EntityKind::User => &user::DESCRIPTOR,
        }
    }

    /// Transforms a batch of raw API rows into schema-conforming rows.
    ///
    /// Pure, no I/O. A missing required field in any row fails the whole
    /// batch with [`ErrorKind::SchemaViolation`]; an unkeyed row would
    /// corrupt deduplication, so it is never silently dropped.
    pub fn transform(&self, rows: Vec<RawRow>) -> EtlResult<Vec<TransformedRow>> {
        let transform = match self {
            EntityKind::Lead => lead::transform,
            EntityKind::Activity => activity::transform,
            EntityKind::Opportunity => opportunity::transform,
            EntityKind::User => user::transform,
        };

        rows.into_iter().map(transform).collect()
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.descriptor().table)
    }
}

impl FromStr for EntityKind {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Lead" => Ok(EntityKind::Lead),
            "Activity" => Ok(EntityKind::Activity),
            "Opportunity" => Ok(EntityKind::Opportunity),
            "User" => Ok(EntityKind::User),
            other => Err(etl_error!(
                ErrorKind::ConfigError,
                "Unknown entity table",
                format!("`{other}` is not an extractable entity")
            )),
        }
    }
}

/// Interprets a raw row as a JSON object.
fn as_object<'a>(row: &'a RawRow, table: &str) -> EtlResult<&'a Map<String, Value>> {
    match row.as_object() {
        Some(map) => Ok(map),
        None => bail!(
            ErrorKind::SchemaViolation,
            "Raw row is not a JSON object",
            format!("table `{table}`")
        ),
    }
}

/// Copies a required field, failing if it is absent or null.
fn required(raw: &Map<String, Value>, table: &str, key: &str) -> EtlResult<Value> {
    match raw.get(key) {
        Some(value) if !value.is_null() => Ok(value.clone()),
        _ => bail!(
            ErrorKind::SchemaViolation,
            "Missing required field",
            format!("field `{key}` in table `{table}`")
        ),
    }
}

/// Copies an optional field, mapping absence to null.
fn optional(raw: &Map<String, Value>, key: &str) -> Value {
    raw.get(key).cloned().unwrap_or(Value::Null)
}

/// Scans the raw row for custom fields and emits them as `{key, value}` pairs.
///
/// Values are re-encoded as canonical JSON text regardless of their original
/// type, which supports an evolving, org-specific field set without a schema
/// migration per field. Iteration order follows the raw object's key order,
/// so the output is deterministic for a given row.
fn custom_fields(raw: &Map<String, Value>) -> Vec<Value> {
    raw.iter()
        .filter_map(|(key, value)| {
            let name = key.strip_prefix(CUSTOM_FIELD_PREFIX)?;
            let encoded =
                serde_json::to_string(value).expect("JSON value always re-encodes as JSON");

            let mut pair = Map::new();
            pair.insert("key".to_owned(), Value::String(name.to_owned()));
            pair.insert("value".to_owned(), Value::String(encoded));
            Some(Value::Object(pair))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn entity_kind_parses_known_tables() {
        assert_eq!("Lead".parse::<EntityKind>().unwrap(), EntityKind::Lead);
        assert_eq!("User".parse::<EntityKind>().unwrap(), EntityKind::User);

        let err = "Contact".parse::<EntityKind>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigError);
    }

    #[test]
    fn descriptors_are_consistent() {
        for kind in EntityKind::ALL {
            let descriptor = kind.descriptor();

            // Every primary-key and increment-key column must exist in the
            // schema, otherwise compaction would reference a missing column.
            for key in descriptor.primary_key {
                assert!(
                    descriptor.schema.field(key).is_some(),
                    "{}: primary key `{key}` missing from schema",
                    descriptor.table
                );
            }
            assert!(
                descriptor
                    .schema
                    .field(descriptor.increment_key)
                    .is_some(),
                "{}: increment key missing from schema",
                descriptor.table
            );

            assert_eq!(
                descriptor.staging_table(),
                format!("_stage_{}", descriptor.table)
            );
        }
    }

    #[test]
    fn custom_fields_encode_values_as_json_text() {
        let raw = json!({
            "id": "oppo_1",
            "custom.acf_revenue": 1250.5,
            "custom.acf_setter": "user_9",
            "custom.acf_tags": ["a", "b"],
        });

        let fields = custom_fields(raw.as_object().unwrap());

        assert_eq!(
            fields,
            vec![
                json!({"key": "acf_revenue", "value": "1250.5"}),
                json!({"key": "acf_setter", "value": "\"user_9\""}),
                json!({"key": "acf_tags", "value": "[\"a\",\"b\"]"}),
            ]
        );
    }
}
