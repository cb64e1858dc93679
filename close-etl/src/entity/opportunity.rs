//! Opportunity entity: full-scan, fixed scalar head plus custom fields.

use serde_json::{Map, Value};

use crate::entity::{EntityDescriptor, as_object, custom_fields, optional, required};
use crate::error::EtlResult;
use crate::schema::{FieldSchema, FieldType, TableSchema};
use crate::types::{RawRow, TransformedRow};

const CUSTOM_FIELDS: &[FieldSchema] = &[
    FieldSchema::nullable("key", FieldType::String),
    FieldSchema::nullable("value", FieldType::String),
];

pub(super) static DESCRIPTOR: EntityDescriptor = EntityDescriptor {
    endpoint: "opportunity",
    table: "Opportunity",
    primary_key: &["id"],
    increment_key: "date_updated",
    is_incremental: false,
    schema: TableSchema {
        fields: &[
            FieldSchema::required("id", FieldType::String),
            FieldSchema::required("date_updated", FieldType::Timestamp),
            FieldSchema::nullable("lead_id", FieldType::String),
            FieldSchema::nullable("status_id", FieldType::String),
            FieldSchema::nullable("status_label", FieldType::String),
            FieldSchema::nullable("user_id", FieldType::String),
            FieldSchema::nullable("value", FieldType::Float),
            FieldSchema::nullable("value_currency", FieldType::String),
            FieldSchema::nullable("confidence", FieldType::Float),
            FieldSchema::nullable("date_won", FieldType::Timestamp),
            FieldSchema::nullable("date_created", FieldType::Timestamp),
            FieldSchema::repeated_record("custom", CUSTOM_FIELDS),
        ],
    },
};

pub(super) fn transform(row: RawRow) -> EtlResult<TransformedRow> {
    let raw = as_object(&row, DESCRIPTOR.table)?;

    let mut out = Map::new();
    out.insert("id".to_owned(), required(raw, DESCRIPTOR.table, "id")?);
    out.insert(
        "date_updated".to_owned(),
        required(raw, DESCRIPTOR.table, "date_updated")?,
    );
    for key in [
        "lead_id",
        "status_id",
        "status_label",
        "user_id",
        "value",
        "value_currency",
        "confidence",
        "date_won",
        "date_created",
    ] {
        out.insert(key.to_owned(), optional(raw, key));
    }
    out.insert("custom".to_owned(), Value::Array(custom_fields(raw)));

    Ok(Value::Object(out))
}
