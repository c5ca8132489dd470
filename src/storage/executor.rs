//! Statement execution against a tenant connection.

use sqlx::PgConnection;
use tracing::{debug, warn};

/// Sent after every DDL so the REST gateway reloads its schema cache.
pub const RELOAD_NOTIFY_SQL: &str = "NOTIFY pgrst, 'reload schema'";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Ddl,
    Data,
}

impl StatementKind {
    /// DDL is anything whose first keyword is CREATE, ALTER or DROP.
    pub fn classify(sql: &str) -> Self {
        let first = sql
            .trim_start()
            .split(|c: char| c.is_whitespace() || c == '(')
            .next()
            .unwrap_or_default();
        if ["CREATE", "ALTER", "DROP"]
            .iter()
            .any(|kw| first.eq_ignore_ascii_case(kw))
        {
            StatementKind::Ddl
        } else {
            StatementKind::Data
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecOutcome {
    pub kind: StatementKind,
    pub rows_affected: u64,
}

/// Runs one unparameterised statement. DDL is followed by a reload
/// notification whose failure is logged, not returned.
pub async fn execute(
    conn: &mut PgConnection,
    tenant_id: &str,
    sql: &str,
) -> Result<ExecOutcome, sqlx::Error> {
    let kind = StatementKind::classify(sql);
    let result = sqlx::query(sql).execute(&mut *conn).await?;
    debug!(tenant = tenant_id, ?kind, rows = result.rows_affected(), "statement executed");

    if kind == StatementKind::Ddl {
        notify_reload(conn, tenant_id).await;
    }

    Ok(ExecOutcome {
        kind,
        rows_affected: result.rows_affected(),
    })
}

pub async fn notify_reload(conn: &mut PgConnection, tenant_id: &str) {
    if let Err(e) = sqlx::query(RELOAD_NOTIFY_SQL).execute(&mut *conn).await {
        warn!(tenant = tenant_id, error = %e, "schema reload notification failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_by_leading_keyword() {
        assert_eq!(
            StatementKind::classify("  create table if not exists t (id int)"),
            StatementKind::Ddl
        );
        assert_eq!(
            StatementKind::classify("ALTER TABLE \"t\" ADD COLUMN IF NOT EXISTS \"x\" TEXT"),
            StatementKind::Ddl
        );
        assert_eq!(StatementKind::classify("drop table t"), StatementKind::Ddl);
        assert_eq!(
            StatementKind::classify("INSERT INTO t (created_at) VALUES (now())"),
            StatementKind::Data
        );
        assert_eq!(StatementKind::classify("SELECT 1"), StatementKind::Data);
        assert_eq!(StatementKind::classify("createdb"), StatementKind::Data);
        assert_eq!(StatementKind::classify(""), StatementKind::Data);
    }
}
