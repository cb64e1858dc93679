//! User entity: full-scan, flat scalar projection.

use serde_json::{Map, Value};

use crate::entity::{EntityDescriptor, as_object, optional, required};
use crate::error::EtlResult;
use crate::schema::{FieldSchema, FieldType, TableSchema};
use crate::types::{RawRow, TransformedRow};

pub(super) static DESCRIPTOR: EntityDescriptor = EntityDescriptor {
    endpoint: "user",
    table: "User",
    primary_key: &["id"],
    increment_key: "date_updated",
    is_incremental: false,
    schema: TableSchema {
        fields: &[
            FieldSchema::required("id", FieldType::String),
            FieldSchema::required("date_updated", FieldType::Timestamp),
            FieldSchema::nullable("email", FieldType::String),
            FieldSchema::nullable("first_name", FieldType::String),
            FieldSchema::nullable("last_name", FieldType::String),
            FieldSchema::nullable("last_used_timezone", FieldType::String),
            FieldSchema::nullable("email_verified_at", FieldType::Timestamp),
            FieldSchema::nullable("date_created", FieldType::Timestamp),
            FieldSchema::nullable("image", FieldType::String),
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
        "email",
        "first_name",
        "last_name",
        "last_used_timezone",
        "email_verified_at",
        "date_created",
        "image",
    ] {
        out.insert(key.to_owned(), optional(raw, key));
    }

    Ok(Value::Object(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn transform_is_a_fixed_projection() {
        let row = json!({
            "id": "user_1",
            "date_updated": "2021-08-05T10:00:00+00:00",
            "email": "jo@acme.test",
            "group_ids": ["dropped"],
        });

        let out = transform(row).unwrap();

        assert_eq!(out["email"], "jo@acme.test");
        assert_eq!(out["first_name"], Value::Null);
        assert!(out.get("group_ids").is_none());
    }
}
