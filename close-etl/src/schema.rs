//! Output schema trees for the analytical tables.
//!
//! Every entity declares a static [`TableSchema`]: a tree of field
//! descriptors with a scalar or record type and a repetition mode, records
//! nesting recursively. The tree is the load-time contract for transformed
//! rows, and the table store derives column definitions from it when it has
//! to auto-create a staging table.

/// Scalar or record type of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Timestamp,
    Float,
    /// Nested record; the field carries its own child fields.
    Record,
}

/// Repetition mode of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldMode {
    /// Singular, may be null or absent.
    Nullable,
    /// Singular, must be present and non-null. Only primary-key and
    /// increment-key columns are required.
    Required,
    /// Ordered sequence; never null, possibly empty.
    Repeated,
}

/// One field in a schema tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSchema {
    pub name: &'static str,
    pub typ: FieldType,
    pub mode: FieldMode,
    /// Child fields, non-empty only for [`FieldType::Record`].
    pub fields: &'static [FieldSchema],
}

/// Schema tree of one output table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSchema {
    pub fields: &'static [FieldSchema],
}

impl FieldSchema {
    /// Shorthand for a nullable scalar field.
    pub const fn nullable(name: &'static str, typ: FieldType) -> Self {
        Self {
            name,
            typ,
            mode: FieldMode::Nullable,
            fields: &[],
        }
    }

    /// Shorthand for a required scalar field.
    pub const fn required(name: &'static str, typ: FieldType) -> Self {
        Self {
            name,
            typ,
            mode: FieldMode::Required,
            fields: &[],
        }
    }

    /// Shorthand for a repeated record field.
    pub const fn repeated_record(name: &'static str, fields: &'static [FieldSchema]) -> Self {
        Self {
            name,
            typ: FieldType::Record,
            mode: FieldMode::Repeated,
            fields,
        }
    }
}

impl TableSchema {
    /// Looks up a top-level field by name.
    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|field| field.name == name)
    }
}
