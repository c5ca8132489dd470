//! Catalog introspection queries.

use crate::domain::schema::LiveColumn;
use sqlx::{PgConnection, Row};

pub async fn table_exists(
    conn: &mut PgConnection,
    schema: &str,
    table: &str,
) -> Result<bool, sqlx::Error> {
    let row = sqlx::query(
        "SELECT EXISTS (SELECT 1 FROM pg_tables WHERE schemaname = $1 AND tablename = $2) AS present",
    )
    .bind(schema)
    .bind(table)
    .fetch_one(&mut *conn)
    .await?;
    row.try_get("present")
}

pub async fn live_columns(
    conn: &mut PgConnection,
    schema: &str,
    table: &str,
) -> Result<Vec<LiveColumn>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT column_name::text AS column_name, data_type::text AS data_type,
                udt_schema::text AS udt_schema, udt_name::text AS udt_name
         FROM information_schema.columns
         WHERE table_schema = $1 AND table_name = $2
         ORDER BY ordinal_position",
    )
    .bind(schema)
    .bind(table)
    .fetch_all(&mut *conn)
    .await?;

    let mut columns = Vec::with_capacity(rows.len());
    for row in rows {
        let name: String = row.try_get("column_name")?;
        let data_type: String = row.try_get("data_type")?;
        let udt_schema: Option<String> = row.try_get("udt_schema")?;
        let udt_name: Option<String> = row.try_get("udt_name")?;
        let column = LiveColumn::new(&name, &data_type);
        columns.push(match (udt_schema, udt_name) {
            (Some(schema), Some(udt)) => column.with_udt(&schema, &udt),
            _ => column,
        });
    }
    Ok(columns)
}

/// First column of the table's primary-key constraint.
pub async fn primary_key_column(
    conn: &mut PgConnection,
    schema: &str,
    table: &str,
) -> Result<Option<String>, sqlx::Error> {
    let row = sqlx::query(
        "SELECT kcu.column_name::text AS column_name
         FROM information_schema.table_constraints tc
         JOIN information_schema.key_column_usage kcu
           ON tc.constraint_name = kcu.constraint_name
          AND tc.table_schema = kcu.table_schema
          AND tc.table_name = kcu.table_name
         WHERE tc.constraint_type = 'PRIMARY KEY'
           AND tc.table_schema = $1
           AND tc.table_name = $2
         ORDER BY kcu.ordinal_position
         LIMIT 1",
    )
    .bind(schema)
    .bind(table)
    .fetch_optional(&mut *conn)
    .await?;

    match row {
        Some(row) => Ok(Some(row.try_get("column_name")?)),
        None => Ok(None),
    }
}

/// Base tables of a schema, sorted by name.
pub async fn list_tables(conn: &mut PgConnection, schema: &str) -> Result<Vec<String>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT tablename::text AS tablename FROM pg_tables WHERE schemaname = $1 ORDER BY tablename",
    )
    .bind(schema)
    .fetch_all(&mut *conn)
    .await?;
    rows.iter().map(|r| r.try_get("tablename")).collect()
}
