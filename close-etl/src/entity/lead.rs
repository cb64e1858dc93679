//! Lead entity: incremental, with nested contact records.

use serde_json::{Map, Value};

use crate::entity::{EntityDescriptor, as_object, optional, required};
use crate::error::EtlResult;
use crate::schema::{FieldSchema, FieldType, TableSchema};
use crate::types::{RawRow, TransformedRow};

const PHONE_FIELDS: &[FieldSchema] = &[
    FieldSchema::nullable("phone_formatted", FieldType::String),
    FieldSchema::nullable("phone", FieldType::String),
    FieldSchema::nullable("type", FieldType::String),
    FieldSchema::nullable("country", FieldType::String),
];

const EMAIL_FIELDS: &[FieldSchema] = &[
    FieldSchema::nullable("type", FieldType::String),
    FieldSchema::nullable("email", FieldType::String),
];

const CONTACT_FIELDS: &[FieldSchema] = &[
    FieldSchema::repeated_record("phones", PHONE_FIELDS),
    FieldSchema::nullable("name", FieldType::String),
    FieldSchema::nullable("updated_by", FieldType::String),
    FieldSchema::repeated_record("emails", EMAIL_FIELDS),
    FieldSchema::nullable("date_updated", FieldType::Timestamp),
    FieldSchema::nullable("display_name", FieldType::String),
    FieldSchema::nullable("date_created", FieldType::Timestamp),
    FieldSchema::nullable("lead_id", FieldType::String),
    FieldSchema::nullable("created_by", FieldType::String),
    FieldSchema::nullable("title", FieldType::String),
    FieldSchema::nullable("id", FieldType::String),
];

pub(super) static DESCRIPTOR: EntityDescriptor = EntityDescriptor {
    endpoint: "lead",
    table: "Lead",
    primary_key: &["id"],
    increment_key: "date_updated",
    is_incremental: true,
    schema: TableSchema {
        fields: &[
            FieldSchema::required("id", FieldType::String),
            FieldSchema::required("date_updated", FieldType::Timestamp),
            FieldSchema::nullable("display_name", FieldType::String),
            FieldSchema::nullable("updated_by", FieldType::String),
            FieldSchema::nullable("status_id", FieldType::String),
            FieldSchema::nullable("created_by", FieldType::String),
            FieldSchema::nullable("custom_lead_owner", FieldType::String),
            FieldSchema::nullable("organization_id", FieldType::String),
            FieldSchema::nullable("date_created", FieldType::Timestamp),
            FieldSchema::repeated_record("contacts", CONTACT_FIELDS),
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
        "display_name",
        "updated_by",
        "status_id",
        "created_by",
        "custom_lead_owner",
        "organization_id",
        "date_created",
    ] {
        out.insert(key.to_owned(), optional(raw, key));
    }
    out.insert("contacts".to_owned(), Value::Array(contacts(raw)));

    Ok(Value::Object(out))
}

/// Projects the nested contact list, absent or empty input becoming `[]`.
fn contacts(raw: &Map<String, Value>) -> Vec<Value> {
    let Some(Value::Array(contacts)) = raw.get("contacts") else {
        return Vec::new();
    };

    contacts
        .iter()
        .filter_map(Value::as_object)
        .map(|contact| {
            let mut out = Map::new();
            out.insert("phones".to_owned(), phone_numbers(contact));
            out.insert("emails".to_owned(), email_addresses(contact));
            for key in [
                "name",
                "updated_by",
                "date_updated",
                "display_name",
                "date_created",
                "lead_id",
                "created_by",
                "title",
                "id",
            ] {
                out.insert(key.to_owned(), optional(contact, key));
            }
            Value::Object(out)
        })
        .collect()
}

fn phone_numbers(contact: &Map<String, Value>) -> Value {
    project_repeated(contact, "phones", &["phone_formatted", "phone", "type", "country"])
}

fn email_addresses(contact: &Map<String, Value>) -> Value {
    project_repeated(contact, "emails", &["type", "email"])
}

/// Projects a repeated record field to the given keys, absence becoming `[]`.
fn project_repeated(parent: &Map<String, Value>, field: &str, keys: &[&str]) -> Value {
    let Some(Value::Array(elements)) = parent.get(field) else {
        return Value::Array(Vec::new());
    };

    let projected = elements
        .iter()
        .filter_map(Value::as_object)
        .map(|element| {
            let mut out = Map::new();
            for key in keys {
                out.insert((*key).to_owned(), optional(element, key));
            }
            Value::Object(out)
        })
        .collect();

    Value::Array(projected)
}
