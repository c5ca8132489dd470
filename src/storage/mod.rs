//! Tenant-scoped database access.
//!
//! The orchestration layer only talks to the two traits below. The Postgres
//! implementations live in [`session`] and [`tenant_pool`].

use crate::domain::error::SyncResult;
use crate::domain::schema::{DdlStatement, LiveColumn, WriteStatement};
use async_trait::async_trait;

pub mod catalog;
pub mod connection_url;
pub mod executor;
pub mod session;
pub mod tenant_pool;

pub use executor::StatementKind;
pub use session::PgTenantSession;
pub use tenant_pool::{TenantConnectionRegistry, TenantPool};

/// One acquired connection to a tenant's database, held for a whole upsert
/// workflow and released when dropped.
#[async_trait]
pub trait TenantSession: Send {
    fn tenant_id(&self) -> &str;

    /// Schema the tenant's tables are created in.
    fn schema_name(&self) -> &str;

    async fn table_exists(&mut self, table: &str) -> SyncResult<bool>;

    /// Live columns in ordinal order. Empty when the table does not exist.
    async fn live_columns(&mut self, table: &str) -> SyncResult<Vec<LiveColumn>>;

    /// The table's primary-key column, `None` when it has no key constraint.
    async fn primary_key_column(&mut self, table: &str) -> SyncResult<Option<String>>;

    /// Runs a create/alter statement and signals the metadata reload.
    async fn apply_ddl(&mut self, statement: &DdlStatement) -> SyncResult<()>;

    /// Runs every statement of one table in a single transaction and returns
    /// the affected-row total.
    async fn write(&mut self, table: &str, statements: &[WriteStatement]) -> SyncResult<u64>;
}

/// Hands out tenant sessions and can drop a tenant's cached connections.
#[async_trait]
pub trait SessionSource: Send + Sync {
    async fn open(&self, tenant_id: &str) -> SyncResult<Box<dyn TenantSession>>;

    /// Forces the next `open` for this tenant onto fresh connections.
    async fn invalidate(&self, tenant_id: &str);
}
