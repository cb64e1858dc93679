//! Custom activity entity: full-scan, org-specific custom fields.

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
    endpoint: "activity/custom",
    table: "Activity",
    primary_key: &["lead_id"],
    increment_key: "date_updated",
    is_incremental: false,
    schema: TableSchema {
        fields: &[
            FieldSchema::required("lead_id", FieldType::String),
            FieldSchema::required("date_updated", FieldType::Timestamp),
            FieldSchema::nullable("id", FieldType::String),
            FieldSchema::nullable("activity_type_id", FieldType::String),
            FieldSchema::nullable("user_id", FieldType::String),
            FieldSchema::nullable("date_created", FieldType::Timestamp),
            FieldSchema::repeated_record("custom", CUSTOM_FIELDS),
        ],
    },
};

pub(super) fn transform(row: RawRow) -> EtlResult<TransformedRow> {
    let raw = as_object(&row, DESCRIPTOR.table)?;

    let mut out = Map::new();
    out.insert(
        "lead_id".to_owned(),
        required(raw, DESCRIPTOR.table, "lead_id")?,
    );
    out.insert(
        "date_updated".to_owned(),
        required(raw, DESCRIPTOR.table, "date_updated")?,
    );
    for key in ["id", "activity_type_id", "user_id", "date_created"] {
        out.insert(key.to_owned(), optional(raw, key));
    }
    out.insert("custom".to_owned(), Value::Array(custom_fields(raw)));

    Ok(Value::Object(out))
}
