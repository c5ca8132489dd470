//! Table and column definitions the engine reasons about.
//!
//! A [`TableSchema`] is ephemeral: it is inferred fresh for every batch and
//! compared against the live catalog, never persisted.

use serde::Serialize;

pub mod ddl;
pub mod inference;
pub mod value;
pub mod write;

pub use ddl::{build_add_column, build_create_table, quote_ident, qualified_table, DdlStatement};
pub use inference::{infer_schema, InferenceOptions};
pub use value::{FieldValue, Record};
pub use write::{build_write_statement, WriteStatement};

/// Length applied to bounded text columns declared without one.
pub const DEFAULT_VARCHAR_LENGTH: u32 = 255;

/// Name of the column prepended when a schema has no primary key.
pub const SYNTHETIC_KEY_COLUMN: &str = "id";

const MAX_IDENTIFIER_LEN: usize = 63;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Boolean,
    BigInt,
    Real,
    Decimal,
    Timestamp,
    /// Bounded text; the bound lives in [`ColumnDefinition::max_length`].
    Varchar,
    Text,
    Uuid,
}

impl ColumnType {
    pub fn sql_name(&self) -> &'static str {
        match self {
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::BigInt => "BIGINT",
            ColumnType::Real => "REAL",
            ColumnType::Decimal => "NUMERIC",
            ColumnType::Timestamp => "TIMESTAMP",
            ColumnType::Varchar => "VARCHAR",
            ColumnType::Text => "TEXT",
            ColumnType::Uuid => "UUID",
        }
    }
}

/// Column default. Literals are quoted in DDL, expressions are emitted verbatim.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultValue {
    Literal(String),
    Expression(String),
    Integer(i64),
    Boolean(bool),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnDefinition {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
    pub primary_key: bool,
    pub default: Option<DefaultValue>,
    pub max_length: Option<u32>,
}

impl ColumnDefinition {
    /// Creates a nullable, non-key column. The name is normalized and bounded
    /// text gets the default length.
    pub fn new(name: &str, column_type: ColumnType) -> Self {
        let max_length = match column_type {
            ColumnType::Varchar => Some(DEFAULT_VARCHAR_LENGTH),
            _ => None,
        };
        Self {
            name: normalize_identifier(name),
            column_type,
            nullable: true,
            primary_key: false,
            default: None,
            max_length,
        }
    }

    pub fn primary(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn with_default(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_max_length(mut self, len: u32) -> Self {
        self.max_length = Some(len);
        self
    }

    /// Generated identifier used when nothing else can serve as the key.
    pub fn synthetic_key(name: &str) -> Self {
        ColumnDefinition::new(name, ColumnType::Uuid)
            .primary()
            .with_default(DefaultValue::Expression("gen_random_uuid()".to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableSchema {
    pub name: String,
    pub tenant_id: String,
    pub columns: Vec<ColumnDefinition>,
}

impl TableSchema {
    /// Builds a schema, prepending a generated identifier column when no
    /// column is flagged primary. The result is never empty.
    pub fn new(tenant_id: &str, name: &str, mut columns: Vec<ColumnDefinition>) -> Self {
        if !columns.iter().any(|c| c.primary_key) {
            let key_name = if columns.iter().any(|c| c.name == SYNTHETIC_KEY_COLUMN) {
                "row_id"
            } else {
                SYNTHETIC_KEY_COLUMN
            };
            columns.insert(0, ColumnDefinition::synthetic_key(key_name));
        }
        Self {
            name: normalize_identifier(name),
            tenant_id: tenant_id.to_string(),
            columns,
        }
    }

    pub fn primary_key_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.as_str())
            .collect()
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Columns of an inferred schema that the live table lacks. Only ever adds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaDelta {
    pub missing: Vec<ColumnDefinition>,
}

impl SchemaDelta {
    pub fn between(inferred: &TableSchema, live_columns: &[String]) -> Self {
        let missing = inferred
            .columns
            .iter()
            .filter(|c| !live_columns.iter().any(|live| live == &c.name))
            .cloned()
            .collect();
        Self { missing }
    }

    pub fn is_empty(&self) -> bool {
        self.missing.is_empty()
    }
}

/// A column as reported by the live catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveColumn {
    pub name: String,
    /// `information_schema.columns.data_type`, e.g. `bigint`,
    /// `timestamp without time zone`.
    pub data_type: String,
    /// Underlying type as `(udt_schema, udt_name)`. Enums, domains, arrays
    /// and other types without a built-in cast are written through it.
    pub udt: Option<(String, String)>,
}

impl LiveColumn {
    pub fn new(name: &str, data_type: &str) -> Self {
        Self {
            name: name.to_string(),
            data_type: data_type.to_string(),
            udt: None,
        }
    }

    pub fn with_udt(mut self, udt_schema: &str, udt_name: &str) -> Self {
        self.udt = Some((udt_schema.to_string(), udt_name.to_string()));
        self
    }

    pub fn is_array(&self) -> bool {
        self.data_type.eq_ignore_ascii_case("ARRAY")
    }
}

/// Normalizes a raw field or table name into a Postgres identifier: trimmed,
/// lowercased, every non-alphanumeric character replaced by `_`, forced to
/// start with a letter and cut to the 63-byte identifier limit.
pub fn normalize_identifier(raw: &str) -> String {
    let mut out: String = raw
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();

    if !out.starts_with(|c: char| c.is_ascii_alphabetic()) {
        out.insert_str(0, "c_");
    }
    out.truncate(MAX_IDENTIFIER_LEN);
    out
}
