//! Schema inference from an incoming batch.
//!
//! Only the first record of a batch is sampled. A later record carrying a
//! field the sample lacks, or a wider type for an existing field, is not
//! reflected in the inferred schema.

use crate::domain::error::{SyncError, SyncResult};
use crate::domain::schema::value::{FieldValue, Record};
use crate::domain::schema::{normalize_identifier, ColumnDefinition, ColumnType, TableSchema};

#[derive(Debug, Clone, Default)]
pub struct InferenceOptions {
    /// When set, strings no longer than this become `VARCHAR(n)` instead of
    /// unbounded `TEXT`.
    pub label_max_length: Option<u32>,
}

impl ColumnType {
    /// Column type a classified value maps to.
    pub fn for_value(value: &FieldValue, opts: &InferenceOptions) -> Self {
        match value {
            FieldValue::Boolean(_) => ColumnType::Boolean,
            FieldValue::Integer(_) => ColumnType::BigInt,
            FieldValue::Real(_) => ColumnType::Real,
            FieldValue::Timestamp(_) => ColumnType::Timestamp,
            FieldValue::Text(s) => match opts.label_max_length {
                Some(max) if s.chars().count() <= max as usize => ColumnType::Varchar,
                _ => ColumnType::Text,
            },
            FieldValue::Null | FieldValue::Complex(_) => ColumnType::Text,
        }
    }
}

/// Infers a [`TableSchema`] from the first record of `records`.
///
/// A field named `id` (any case) becomes the primary key and is moved to the
/// front; otherwise the first field is the key.
pub fn infer_schema(
    tenant_id: &str,
    table_name: &str,
    records: &[Record],
    opts: &InferenceOptions,
) -> SyncResult<TableSchema> {
    let sample = records.first().ok_or_else(|| SyncError::EmptyInput {
        table: table_name.to_string(),
    })?;

    let has_id = sample.keys().any(|k| k.trim().eq_ignore_ascii_case("id"));

    let mut columns: Vec<ColumnDefinition> = Vec::with_capacity(sample.len());
    for (key, raw) in sample {
        let name = normalize_identifier(key);
        if columns.iter().any(|c| c.name == name) {
            continue;
        }

        let column_type = ColumnType::for_value(&FieldValue::classify(raw), opts);
        let mut column = ColumnDefinition::new(&name, column_type);
        if column_type == ColumnType::Varchar {
            if let Some(max) = opts.label_max_length {
                column = column.with_max_length(max);
            }
        }

        let is_key = if has_id {
            key.trim().eq_ignore_ascii_case("id")
        } else {
            columns.is_empty()
        };
        if is_key {
            column = column.primary();
        }
        columns.push(column);
    }

    if let Some(pos) = columns.iter().position(|c| c.primary_key) {
        let key = columns.remove(pos);
        columns.insert(0, key);
    }

    Ok(TableSchema::new(tenant_id, table_name, columns))
}
