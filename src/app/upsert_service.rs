//! Entry point of the engine: infer, reconcile, resolve the key, write.

use crate::app::primary_key::resolve_primary_key;
use crate::app::reconciler::{ReconcileOutcome, SchemaReconciler, SettlePolicy};
use crate::domain::error::{SyncError, SyncErrorKind, SyncResult};
use crate::domain::schema::write::{batch_columns, normalized_fields};
use crate::domain::schema::{
    build_write_statement, infer_schema, normalize_identifier, InferenceOptions, LiveColumn,
    Record, WriteStatement,
};
use crate::storage::SessionSource;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;

/// Outcome of writing one table's batch.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UpsertResult {
    pub success: bool,
    pub message: String,
    /// Rows the database reported as affected.
    pub rows_written: u64,
    pub table_name: String,
    pub tenant_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<SyncErrorKind>,
}

impl UpsertResult {
    fn written(tenant_id: &str, table_name: &str, rows_written: u64, message: String) -> Self {
        Self {
            success: true,
            message,
            rows_written,
            table_name: table_name.to_string(),
            tenant_id: tenant_id.to_string(),
            error_kind: None,
        }
    }

    pub fn failed(tenant_id: &str, table_name: &str, err: &SyncError) -> Self {
        Self {
            success: false,
            message: err.to_string(),
            rows_written: 0,
            table_name: table_name.to_string(),
            tenant_id: tenant_id.to_string(),
            error_kind: Some(err.kind()),
        }
    }
}

/// Results of a multi-table batch, in processing order. When `success` is
/// false the last entry is the table that failed and later tables were not
/// attempted.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BatchResult {
    pub success: bool,
    pub tables: Vec<UpsertResult>,
}

impl BatchResult {
    pub fn failure(&self) -> Option<&UpsertResult> {
        self.tables.iter().find(|r| !r.success)
    }

    pub fn rows_written(&self) -> u64 {
        self.tables.iter().map(|r| r.rows_written).sum()
    }
}

pub struct UpsertService {
    sessions: Arc<dyn SessionSource>,
    reconciler: SchemaReconciler,
    inference: InferenceOptions,
}

impl UpsertService {
    pub fn new(
        sessions: Arc<dyn SessionSource>,
        settle: SettlePolicy,
        inference: InferenceOptions,
    ) -> Self {
        Self {
            reconciler: SchemaReconciler::new(sessions.clone(), settle),
            sessions,
            inference,
        }
    }

    /// Writes `records` into `table_name`, folding any failure into the result.
    /// The result always carries the normalized table name.
    pub async fn upsert(&self, tenant_id: &str, table_name: &str, records: &[Record]) -> UpsertResult {
        match self.try_upsert(tenant_id, table_name, records).await {
            Ok(result) => result,
            Err(err) => {
                error!(tenant = tenant_id, table = table_name, error = %err, "upsert failed");
                UpsertResult::failed(tenant_id, &normalize_identifier(table_name), &err)
            }
        }
    }

    /// Writes `records` into `table_name`, returning the first failure.
    ///
    /// One session is held from reconciliation through the write. An empty
    /// batch returns immediately without touching the database.
    #[instrument(skip(self, records), fields(records = records.len()))]
    pub async fn try_upsert(
        &self,
        tenant_id: &str,
        table_name: &str,
        records: &[Record],
    ) -> SyncResult<UpsertResult> {
        if records.is_empty() {
            return Ok(UpsertResult::written(
                tenant_id,
                &normalize_identifier(table_name),
                0,
                "no records to write".to_string(),
            ));
        }

        let session = self.sessions.open(tenant_id).await?;
        let schema = infer_schema(tenant_id, table_name, records, &self.inference)?;
        let (mut session, outcome) = self.reconciler.reconcile(session, &schema).await?;
        let table = schema.name.as_str();

        let primary_key = resolve_primary_key(session.as_mut(), table).await?;
        let live = session.live_columns(table).await?;
        warn_on_unknown_fields(tenant_id, table, &live, records);

        let columns = batch_columns(records);
        let statements: Vec<WriteStatement> = records
            .iter()
            .map(|record| {
                build_write_statement(
                    session.schema_name(),
                    table,
                    primary_key.as_deref(),
                    &live,
                    &columns,
                    record,
                )
            })
            .collect();
        let rows = session.write(table, &statements).await?;

        let mode = if primary_key.is_some() { "upserted" } else { "inserted" };
        let detail = match outcome {
            ReconcileOutcome::Created => " (table created)".to_string(),
            ReconcileOutcome::Extended { added } => format!(" (added columns: {})", added.join(", ")),
            ReconcileOutcome::Unchanged => String::new(),
        };
        info!(tenant = tenant_id, table, rows, requested = records.len(), "batch written");

        Ok(UpsertResult::written(
            tenant_id,
            table,
            rows,
            format!("{} {} of {} record(s) into '{}'{}", mode, rows, records.len(), table, detail),
        ))
    }

    /// Writes each table in order and stops at the first failure.
    pub async fn upsert_tables(&self, tenant_id: &str, tables: &[(String, Vec<Record>)]) -> BatchResult {
        let mut results = Vec::with_capacity(tables.len());
        for (table_name, records) in tables {
            let result = self.upsert(tenant_id, table_name, records).await;
            let failed = !result.success;
            results.push(result);
            if failed {
                warn!(
                    tenant = tenant_id,
                    table = %table_name,
                    skipped = tables.len() - results.len(),
                    "batch aborted"
                );
                return BatchResult {
                    success: false,
                    tables: results,
                };
            }
        }
        BatchResult {
            success: true,
            tables: results,
        }
    }
}

/// Only the first record shapes the schema; fields that appear later and have
/// no live column are reported, and the write will reject them.
fn warn_on_unknown_fields(tenant_id: &str, table: &str, live: &[LiveColumn], records: &[Record]) {
    let unknown: BTreeSet<String> = records
        .iter()
        .skip(1)
        .flat_map(normalized_fields)
        .map(|(name, _)| name)
        .filter(|name| !live.iter().any(|c| &c.name == name))
        .collect();
    if !unknown.is_empty() {
        warn!(
            tenant = tenant_id,
            table,
            fields = ?unknown,
            "fields missing from the sampled record are not added to the table"
        );
    }
}
