use crate::domain::error::{SyncError, SyncResult};
use crate::domain::schema::write::BindValue;
use crate::domain::schema::{DdlStatement, LiveColumn, WriteStatement};
use crate::storage::{catalog, executor, TenantSession};
use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::{Connection, Postgres};

/// A pooled connection bound to one tenant. Dropping it returns the
/// connection to the tenant's pool.
pub struct PgTenantSession {
    tenant_id: String,
    schema: String,
    conn: PoolConnection<Postgres>,
}

impl PgTenantSession {
    pub fn new(tenant_id: &str, schema: &str, conn: PoolConnection<Postgres>) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            schema: schema.to_string(),
            conn,
        }
    }

    /// Runs an arbitrary statement through the executor.
    pub async fn execute(&mut self, sql: &str) -> Result<executor::ExecOutcome, sqlx::Error> {
        executor::execute(&mut self.conn, &self.tenant_id, sql).await
    }

    pub async fn list_tables(&mut self) -> Result<Vec<String>, sqlx::Error> {
        catalog::list_tables(&mut self.conn, &self.schema).await
    }
}

fn bind_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &'q BindValue,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        BindValue::Null => query.bind(Option::<String>::None),
        BindValue::Bool(b) => query.bind(*b),
        BindValue::Int(i) => query.bind(*i),
        BindValue::Float(f) => query.bind(*f),
        BindValue::Timestamp(ts) => query.bind(*ts),
        BindValue::Text(s) => query.bind(s.as_str()),
        BindValue::Json(v) => query.bind(sqlx::types::Json(v)),
    }
}

#[async_trait]
impl TenantSession for PgTenantSession {
    fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    fn schema_name(&self) -> &str {
        &self.schema
    }

    async fn table_exists(&mut self, table: &str) -> SyncResult<bool> {
        catalog::table_exists(&mut self.conn, &self.schema, table)
            .await
            .map_err(|e| SyncError::catalog(&self.tenant_id, table, e))
    }

    async fn live_columns(&mut self, table: &str) -> SyncResult<Vec<LiveColumn>> {
        catalog::live_columns(&mut self.conn, &self.schema, table)
            .await
            .map_err(|e| SyncError::catalog(&self.tenant_id, table, e))
    }

    async fn primary_key_column(&mut self, table: &str) -> SyncResult<Option<String>> {
        catalog::primary_key_column(&mut self.conn, &self.schema, table)
            .await
            .map_err(|e| SyncError::catalog(&self.tenant_id, table, e))
    }

    async fn apply_ddl(&mut self, statement: &DdlStatement) -> SyncResult<()> {
        executor::execute(&mut self.conn, &self.tenant_id, &statement.sql)
            .await
            .map(|_| ())
            .map_err(|e| SyncError::Ddl {
                tenant: self.tenant_id.clone(),
                table: statement.table().to_string(),
                statement: statement.sql.clone(),
                message: e.to_string(),
            })
    }

    async fn write(&mut self, table: &str, statements: &[WriteStatement]) -> SyncResult<u64> {
        let tenant = self.tenant_id.clone();
        let mut tx = self
            .conn
            .begin()
            .await
            .map_err(|e| SyncError::upsert(&tenant, table, e))?;

        let mut affected = 0u64;
        for statement in statements {
            let mut query = sqlx::query(&statement.sql);
            for value in &statement.values {
                query = bind_value(query, value);
            }
            let result = query
                .execute(&mut *tx)
                .await
                .map_err(|e| SyncError::upsert(&tenant, table, e))?;
            affected += result.rows_affected();
        }

        tx.commit()
            .await
            .map_err(|e| SyncError::upsert(&tenant, table, e))?;
        Ok(affected)
    }
}
