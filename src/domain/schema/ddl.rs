//! CREATE / ALTER statement synthesis. Strictly additive: nothing here emits
//! a DROP or a type change.

use crate::domain::schema::{ColumnDefinition, ColumnType, DefaultValue, TableSchema};

/// A DDL statement together with the structure it was rendered from.
#[derive(Debug, Clone, PartialEq)]
pub struct DdlStatement {
    pub kind: DdlKind,
    pub sql: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DdlKind {
    CreateTable { schema: TableSchema },
    AddColumn { table: String, column: ColumnDefinition },
}

impl DdlStatement {
    /// Table the statement targets.
    pub fn table(&self) -> &str {
        match &self.kind {
            DdlKind::CreateTable { schema } => &schema.name,
            DdlKind::AddColumn { table, .. } => table,
        }
    }
}

pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

pub fn qualified_table(schema_name: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema_name), quote_ident(table))
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn render_default(default: &DefaultValue) -> String {
    match default {
        DefaultValue::Literal(s) => quote_literal(s),
        DefaultValue::Expression(expr) => expr.clone(),
        DefaultValue::Integer(i) => i.to_string(),
        DefaultValue::Boolean(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
    }
}

fn column_sql(col: &ColumnDefinition, enforce_not_null: bool) -> String {
    let mut sql = format!("{} {}", quote_ident(&col.name), col.column_type.sql_name());
    if col.column_type == ColumnType::Varchar {
        if let Some(len) = col.max_length {
            sql.push_str(&format!("({})", len));
        }
    }
    if !col.nullable && enforce_not_null {
        sql.push_str(" NOT NULL");
    }
    if let Some(default) = &col.default {
        sql.push_str(" DEFAULT ");
        sql.push_str(&render_default(default));
    }
    sql
}

/// `CREATE TABLE IF NOT EXISTS` with every primary-flagged column listed in a
/// single composite key constraint.
pub fn build_create_table(schema_name: &str, schema: &TableSchema) -> DdlStatement {
    let mut parts: Vec<String> = schema.columns.iter().map(|c| column_sql(c, true)).collect();

    let keys = schema.primary_key_columns();
    if !keys.is_empty() {
        let cols = keys
            .iter()
            .map(|k| quote_ident(k))
            .collect::<Vec<_>>()
            .join(", ");
        parts.push(format!("PRIMARY KEY ({})", cols));
    }

    let sql = format!(
        "CREATE TABLE IF NOT EXISTS {} (\n  {}\n)",
        qualified_table(schema_name, &schema.name),
        parts.join(",\n  ")
    );
    DdlStatement {
        kind: DdlKind::CreateTable {
            schema: schema.clone(),
        },
        sql,
    }
}

/// `ALTER TABLE .. ADD COLUMN IF NOT EXISTS` for one missing column.
///
/// The column is added without key membership, and NOT NULL is kept only when
/// a default can fill the rows already present.
pub fn build_add_column(schema_name: &str, table: &str, column: &ColumnDefinition) -> DdlStatement {
    let sql = format!(
        "ALTER TABLE {} ADD COLUMN IF NOT EXISTS {}",
        qualified_table(schema_name, table),
        column_sql(column, column.default.is_some())
    );
    DdlStatement {
        kind: DdlKind::AddColumn {
            table: table.to_string(),
            column: column.clone(),
        },
        sql,
    }
}
