//! Brings a live table in line with an inferred schema.
//!
//! A missing table is created and then waited on: some gateways cache table
//! metadata and only see a new table after a reload signal and a fresh
//! connection. Existing tables only ever gain columns.

use crate::domain::error::{SyncError, SyncResult};
use crate::domain::schema::{build_add_column, build_create_table, SchemaDelta, TableSchema};
use crate::infra::config::SettleSettings;
use crate::storage::{SessionSource, TenantSession};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How long and how often to re-check a freshly created table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlePolicy {
    /// Re-check cycles, at least one.
    pub attempts: u32,
    pub initial_delay: Duration,
    /// Cap for the doubled delay of later cycles.
    pub max_delay: Duration,
}

impl Default for SettlePolicy {
    fn default() -> Self {
        Self {
            attempts: 1,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl SettlePolicy {
    pub fn from_settings(settings: &SettleSettings) -> Self {
        Self {
            attempts: settings.attempts.max(1),
            initial_delay: settings.delay,
            max_delay: settings.max_delay,
        }
    }

    /// Delay before re-check `attempt` (1-based): the initial delay doubled
    /// per earlier attempt, capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self.initial_delay.saturating_mul(1u32 << exponent);
        delay.min(self.max_delay.max(self.initial_delay))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Created,
    Extended { added: Vec<String> },
    Unchanged,
}

pub struct SchemaReconciler {
    sessions: Arc<dyn SessionSource>,
    settle: SettlePolicy,
}

impl SchemaReconciler {
    pub fn new(sessions: Arc<dyn SessionSource>, settle: SettlePolicy) -> Self {
        Self { sessions, settle }
    }

    /// Creates or extends the table described by `schema`.
    ///
    /// The session is consumed because table creation replaces it with one
    /// opened on fresh connections; the session to continue with is returned.
    pub async fn reconcile(
        &self,
        mut session: Box<dyn TenantSession>,
        schema: &TableSchema,
    ) -> SyncResult<(Box<dyn TenantSession>, ReconcileOutcome)> {
        let table = schema.name.as_str();

        if !session.table_exists(table).await? {
            let statement = build_create_table(session.schema_name(), schema);
            info!(tenant = session.tenant_id(), table, "creating table");
            debug!(sql = %statement.sql);
            session.apply_ddl(&statement).await?;
            let session = self.settle(session, table).await?;
            return Ok((session, ReconcileOutcome::Created));
        }

        let live: Vec<String> = session
            .live_columns(table)
            .await?
            .into_iter()
            .map(|c| c.name)
            .collect();
        let delta = SchemaDelta::between(schema, &live);
        if delta.is_empty() {
            return Ok((session, ReconcileOutcome::Unchanged));
        }

        let mut added = Vec::with_capacity(delta.missing.len());
        for column in &delta.missing {
            let statement = build_add_column(session.schema_name(), table, column);
            info!(
                tenant = session.tenant_id(),
                table,
                column = %column.name,
                "adding column"
            );
            session.apply_ddl(&statement).await?;
            added.push(column.name.clone());
        }
        Ok((session, ReconcileOutcome::Extended { added }))
    }

    /// Waits for a created table to become visible, recycling the tenant's
    /// connections before every re-check. Bounded by the policy's attempts.
    async fn settle(
        &self,
        session: Box<dyn TenantSession>,
        table: &str,
    ) -> SyncResult<Box<dyn TenantSession>> {
        let tenant_id = session.tenant_id().to_string();
        // hand the connection back before its pool is closed
        drop(session);

        let attempts = self.settle.attempts.max(1);
        for attempt in 1..=attempts {
            self.sessions.invalidate(&tenant_id).await;
            tokio::time::sleep(self.settle.delay_for(attempt)).await;

            let mut session = self.sessions.open(&tenant_id).await?;
            if session.table_exists(table).await? {
                debug!(tenant = %tenant_id, table, attempt, "created table is visible");
                return Ok(session);
            }
            warn!(tenant = %tenant_id, table, attempt, "created table not visible yet");
        }

        Err(SyncError::ExistenceCheckFailed {
            tenant: tenant_id,
            table: table.to_string(),
            attempts,
        })
    }
}
