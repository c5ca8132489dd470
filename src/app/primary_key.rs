use crate::domain::error::SyncResult;
use crate::storage::TenantSession;
use tracing::debug;

/// Reads the live table's primary-key column. The catalog is authoritative:
/// whatever the inferred schema guessed is ignored here.
pub async fn resolve_primary_key(
    session: &mut dyn TenantSession,
    table: &str,
) -> SyncResult<Option<String>> {
    let key = session.primary_key_column(table).await?;
    match &key {
        Some(column) => debug!(tenant = session.tenant_id(), table, column = %column, "primary key resolved"),
        None => debug!(tenant = session.tenant_id(), table, "no primary key; writing append-only"),
    }
    Ok(key)
}
