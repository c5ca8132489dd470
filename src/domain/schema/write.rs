//! Per-record INSERT / upsert statement synthesis over a batch's column set.

use crate::domain::schema::ddl::{qualified_table, quote_ident};
use crate::domain::schema::value::{parse_timestamp, FieldValue, Record};
use crate::domain::schema::{normalize_identifier, LiveColumn};
use chrono::NaiveDateTime;
use serde_json::Value as JsonValue;

/// A value ready to be bound to a placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Timestamp(NaiveDateTime),
    Text(String),
    Json(JsonValue),
}

#[derive(Debug, Clone, PartialEq)]
pub enum WriteMode {
    /// Append-only insert.
    Insert,
    /// Insert, replacing `update_columns` when `key` conflicts. An empty
    /// `update_columns` means `DO NOTHING`.
    Upsert {
        key: String,
        update_columns: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct WriteStatement {
    pub table: String,
    pub mode: WriteMode,
    pub columns: Vec<String>,
    pub values: Vec<BindValue>,
    pub sql: String,
}

/// Maps an `information_schema` data type to the cast applied to its placeholder.
pub fn placeholder_cast(data_type: &str) -> Option<&'static str> {
    match data_type.to_lowercase().as_str() {
        "boolean" => Some("bool"),
        "smallint" => Some("int2"),
        "integer" => Some("int4"),
        "bigint" => Some("int8"),
        "real" => Some("float4"),
        "double precision" => Some("float8"),
        "numeric" => Some("numeric"),
        "timestamp without time zone" => Some("timestamp"),
        "timestamp with time zone" => Some("timestamptz"),
        "date" => Some("date"),
        "time without time zone" => Some("time"),
        "character varying" => Some("varchar"),
        "text" => Some("text"),
        "json" => Some("json"),
        "jsonb" => Some("jsonb"),
        "uuid" => Some("uuid"),
        _ => None,
    }
}

/// How a placeholder reaches its column's type.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnCast {
    /// `$n::<cast>` with a natively bound value.
    Builtin(&'static str),
    /// `$n::text::<type>`: the value is bound as text and parsed by the
    /// type's input function. Covers enums, domains, `inet`, arrays and the rest.
    ViaText { type_name: String, array: bool },
}

impl ColumnCast {
    pub fn for_column(column: &LiveColumn) -> Option<Self> {
        if let Some(cast) = placeholder_cast(&column.data_type) {
            return Some(ColumnCast::Builtin(cast));
        }
        column
            .udt
            .as_ref()
            .map(|(udt_schema, udt_name)| ColumnCast::ViaText {
                type_name: qualified_table(udt_schema, udt_name),
                array: column.is_array(),
            })
    }

    fn placeholder(&self, idx: usize) -> String {
        match self {
            ColumnCast::Builtin(cast) => format!("${}::{}", idx, cast),
            ColumnCast::ViaText { type_name, .. } => format!("${}::text::{}", idx, type_name),
        }
    }
}

/// Chooses how a raw field is bound given the target column's cast.
pub fn bind_value(raw: &JsonValue, cast: Option<&ColumnCast>) -> BindValue {
    if raw.is_null() {
        return BindValue::Null;
    }
    match cast {
        Some(ColumnCast::Builtin("json")) | Some(ColumnCast::Builtin("jsonb")) => {
            return BindValue::Json(raw.clone())
        }
        Some(ColumnCast::Builtin("timestamp")) | Some(ColumnCast::Builtin("date")) => {
            if let Some(ts) = raw.as_str().and_then(parse_timestamp) {
                return BindValue::Timestamp(ts);
            }
        }
        Some(ColumnCast::ViaText { array, .. }) => {
            return match raw {
                JsonValue::String(s) => BindValue::Text(s.clone()),
                JsonValue::Array(_) if *array => BindValue::Text(pg_array_literal(raw)),
                other => BindValue::Text(FieldValue::classify(other).to_text().unwrap_or_default()),
            };
        }
        _ => {}
    }
    match FieldValue::classify(raw) {
        FieldValue::Null => BindValue::Null,
        FieldValue::Boolean(b) => BindValue::Bool(b),
        FieldValue::Integer(i) => BindValue::Int(i),
        FieldValue::Real(f) => BindValue::Float(f),
        // keep the caller's original spelling for anything string-shaped
        FieldValue::Timestamp(_) | FieldValue::Text(_) => {
            BindValue::Text(raw.as_str().unwrap_or_default().to_string())
        }
        complex @ FieldValue::Complex(_) => BindValue::Text(complex.to_text().unwrap_or_default()),
    }
}

/// Renders a JSON array as a Postgres array literal, e.g. `{1,"a b",NULL}`.
fn pg_array_literal(value: &JsonValue) -> String {
    match value {
        JsonValue::Array(items) => {
            let elements: Vec<String> = items.iter().map(pg_array_literal).collect();
            format!("{{{}}}", elements.join(","))
        }
        JsonValue::Null => "NULL".to_string(),
        JsonValue::String(s) => quote_array_element(s),
        JsonValue::Object(_) => quote_array_element(&value.to_string()),
        JsonValue::Bool(_) | JsonValue::Number(_) => value.to_string(),
    }
}

fn quote_array_element(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Record fields with normalized names. A later field whose name normalizes
/// onto an earlier one replaces its value.
pub fn normalized_fields(record: &Record) -> Vec<(String, &JsonValue)> {
    let mut fields: Vec<(String, &JsonValue)> = Vec::with_capacity(record.len());
    for (key, value) in record {
        let name = normalize_identifier(key);
        match fields.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => fields.push((name, value)),
        }
    }
    fields
}

/// Every normalized field name across a batch, in first-seen order. Each
/// statement of the batch writes this column set.
pub fn batch_columns(records: &[Record]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for record in records {
        for (name, _) in normalized_fields(record) {
            if !columns.contains(&name) {
                columns.push(name);
            }
        }
    }
    columns
}

static NULL: JsonValue = JsonValue::Null;

/// Builds the statement writing one record over the batch's `columns`.
///
/// Columns the record lacks are written as NULL, so an upsert replaces the
/// whole row. The key column is the exception: a record without it leaves
/// the key to the column default and is a plain insert.
pub fn build_write_statement(
    schema_name: &str,
    table: &str,
    primary_key: Option<&str>,
    live_columns: &[LiveColumn],
    columns: &[String],
    record: &Record,
) -> WriteStatement {
    let fields = normalized_fields(record);
    let target = qualified_table(schema_name, table);
    let has_key = primary_key.map_or(false, |pk| fields.iter().any(|(n, _)| n == pk));

    let columns: Vec<String> = columns
        .iter()
        .filter(|c| has_key || Some(c.as_str()) != primary_key)
        .cloned()
        .collect();
    let mut values = Vec::with_capacity(columns.len());
    let mut placeholders = Vec::with_capacity(columns.len());
    for (idx, name) in columns.iter().enumerate() {
        let raw = fields
            .iter()
            .find(|(n, _)| n == name)
            .map_or(&NULL, |(_, v)| *v);
        let cast = live_columns
            .iter()
            .find(|c| &c.name == name)
            .and_then(ColumnCast::for_column);
        values.push(bind_value(raw, cast.as_ref()));
        placeholders.push(match &cast {
            Some(cast) => cast.placeholder(idx + 1),
            None => format!("${}", idx + 1),
        });
    }

    let mode = match primary_key {
        Some(pk) if has_key => WriteMode::Upsert {
            key: pk.to_string(),
            update_columns: columns.iter().filter(|c| *c != pk).cloned().collect(),
        },
        _ => WriteMode::Insert,
    };

    let mut sql = if columns.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES", target)
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            target,
            columns.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", "),
            placeholders.join(", ")
        )
    };

    if let WriteMode::Upsert { key, update_columns } = &mode {
        if update_columns.is_empty() {
            sql.push_str(&format!(" ON CONFLICT ({}) DO NOTHING", quote_ident(key)));
        } else {
            let set_clause = update_columns
                .iter()
                .map(|c| format!("{0} = EXCLUDED.{0}", quote_ident(c)))
                .collect::<Vec<_>>()
                .join(", ");
            sql.push_str(&format!(
                " ON CONFLICT ({}) DO UPDATE SET {}",
                quote_ident(key),
                set_clause
            ));
        }
    }

    WriteStatement {
        table: table.to_string(),
        mode,
        columns,
        values,
        sql,
    }
}
