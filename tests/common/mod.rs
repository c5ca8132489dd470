//! In-memory stand-in for tenant databases.
//!
//! Applies the structured DDL and write statements the engine produces, logs
//! every statement it receives, and can hide freshly created tables from the
//! catalog for a number of existence checks to mimic a lagging metadata cache.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tenant_sync::domain::schema::ddl::DdlKind;
use tenant_sync::domain::schema::write::{BindValue, WriteMode};
use tenant_sync::domain::schema::{ColumnType, DdlStatement, LiveColumn, WriteStatement};
use tenant_sync::{
    InferenceOptions, Record, SessionSource, SettlePolicy, SyncError, SyncResult, TenantSession,
    UpsertService,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Logged {
    Ddl(String),
    Notify,
    Write(String),
}

#[derive(Debug, Clone, Default)]
pub struct FakeTable {
    pub columns: Vec<LiveColumn>,
    pub primary_key: Option<String>,
    pub rows: Vec<HashMap<String, JsonValue>>,
    /// Existence checks that still report the table as absent.
    hidden_checks: u32,
}

#[derive(Default)]
struct FakeState {
    tenants: HashSet<String>,
    tables: HashMap<(String, String), FakeTable>,
    log: Vec<(String, Logged)>,
    invalidations: HashMap<String, u32>,
    opens: u32,
    /// Applied to every table created from now on.
    creation_lag: u32,
    fail_writes_to: HashSet<String>,
}

#[derive(Clone, Default)]
pub struct FakeDatabase {
    state: Arc<Mutex<FakeState>>,
}

pub fn data_type(ty: ColumnType) -> &'static str {
    match ty {
        ColumnType::Boolean => "boolean",
        ColumnType::BigInt => "bigint",
        ColumnType::Real => "real",
        ColumnType::Decimal => "numeric",
        ColumnType::Timestamp => "timestamp without time zone",
        ColumnType::Varchar => "character varying",
        ColumnType::Text => "text",
        ColumnType::Uuid => "uuid",
    }
}

fn to_json(value: &BindValue) -> JsonValue {
    match value {
        BindValue::Null => JsonValue::Null,
        BindValue::Bool(b) => JsonValue::Bool(*b),
        BindValue::Int(i) => JsonValue::from(*i),
        BindValue::Float(f) => JsonValue::from(*f),
        BindValue::Timestamp(ts) => JsonValue::String(ts.format("%Y-%m-%d %H:%M:%S").to_string()),
        BindValue::Text(s) => JsonValue::String(s.clone()),
        BindValue::Json(v) => v.clone(),
    }
}

impl FakeDatabase {
    pub fn new(tenants: &[&str]) -> Self {
        let db = Self::default();
        {
            let mut state = db.state.lock().unwrap();
            state.tenants = tenants.iter().map(|t| t.to_string()).collect();
        }
        db
    }

    pub fn with_table(
        self,
        tenant: &str,
        table: &str,
        columns: &[(&str, &str)],
        primary_key: Option<&str>,
    ) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.tables.insert(
                (tenant.to_string(), table.to_string()),
                FakeTable {
                    columns: columns
                        .iter()
                        .map(|(n, t)| LiveColumn::new(n, t))
                        .collect(),
                    primary_key: primary_key.map(str::to_string),
                    ..FakeTable::default()
                },
            );
        }
        self
    }

    /// Newly created tables stay invisible for `checks` existence checks.
    pub fn with_creation_lag(self, checks: u32) -> Self {
        self.state.lock().unwrap().creation_lag = checks;
        self
    }

    pub fn failing_writes_to(self, table: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .fail_writes_to
            .insert(table.to_string());
        self
    }

    pub fn table(&self, tenant: &str, table: &str) -> Option<FakeTable> {
        self.state
            .lock()
            .unwrap()
            .tables
            .get(&(tenant.to_string(), table.to_string()))
            .cloned()
    }

    pub fn rows(&self, tenant: &str, table: &str) -> Vec<HashMap<String, JsonValue>> {
        self.table(tenant, table).map(|t| t.rows).unwrap_or_default()
    }

    pub fn log(&self) -> Vec<(String, Logged)> {
        self.state.lock().unwrap().log.clone()
    }

    pub fn ddl_log(&self) -> Vec<String> {
        self.log()
            .into_iter()
            .filter_map(|(_, entry)| match entry {
                Logged::Ddl(sql) => Some(sql),
                _ => None,
            })
            .collect()
    }

    pub fn write_log(&self) -> Vec<String> {
        self.log()
            .into_iter()
            .filter_map(|(_, entry)| match entry {
                Logged::Write(sql) => Some(sql),
                _ => None,
            })
            .collect()
    }

    pub fn invalidations(&self, tenant: &str) -> u32 {
        self.state
            .lock()
            .unwrap()
            .invalidations
            .get(tenant)
            .copied()
            .unwrap_or(0)
    }

    pub fn opens(&self) -> u32 {
        self.state.lock().unwrap().opens
    }
}

pub struct FakeSession {
    tenant: String,
    state: Arc<Mutex<FakeState>>,
}

impl FakeSession {
    fn key(&self, table: &str) -> (String, String) {
        (self.tenant.clone(), table.to_string())
    }
}

#[async_trait]
impl TenantSession for FakeSession {
    fn tenant_id(&self) -> &str {
        &self.tenant
    }

    fn schema_name(&self) -> &str {
        "public"
    }

    async fn table_exists(&mut self, table: &str) -> SyncResult<bool> {
        let key = self.key(table);
        let mut state = self.state.lock().unwrap();
        match state.tables.get_mut(&key) {
            Some(t) if t.hidden_checks > 0 => {
                t.hidden_checks -= 1;
                Ok(false)
            }
            Some(_) => Ok(true),
            None => Ok(false),
        }
    }

    async fn live_columns(&mut self, table: &str) -> SyncResult<Vec<LiveColumn>> {
        let key = self.key(table);
        let state = self.state.lock().unwrap();
        Ok(state
            .tables
            .get(&key)
            .map(|t| t.columns.clone())
            .unwrap_or_default())
    }

    async fn primary_key_column(&mut self, table: &str) -> SyncResult<Option<String>> {
        let key = self.key(table);
        let state = self.state.lock().unwrap();
        Ok(state.tables.get(&key).and_then(|t| t.primary_key.clone()))
    }

    async fn apply_ddl(&mut self, statement: &DdlStatement) -> SyncResult<()> {
        let tenant = self.tenant.clone();
        let mut state = self.state.lock().unwrap();
        state.log.push((tenant.clone(), Logged::Ddl(statement.sql.clone())));

        match &statement.kind {
            DdlKind::CreateTable { schema } => {
                let lag = state.creation_lag;
                state
                    .tables
                    .entry((tenant.clone(), schema.name.clone()))
                    .or_insert_with(|| FakeTable {
                        columns: schema
                            .columns
                            .iter()
                            .map(|c| LiveColumn::new(&c.name, data_type(c.column_type)))
                            .collect(),
                        primary_key: schema.primary_key_columns().first().map(|k| k.to_string()),
                        rows: Vec::new(),
                        hidden_checks: lag,
                    });
            }
            DdlKind::AddColumn { table, column } => {
                let existing = state
                    .tables
                    .get_mut(&(tenant.clone(), table.clone()))
                    .ok_or_else(|| SyncError::Ddl {
                        tenant: tenant.clone(),
                        table: table.clone(),
                        statement: statement.sql.clone(),
                        message: format!("relation \"{}\" does not exist", table),
                    })?;
                if !existing.columns.iter().any(|c| c.name == column.name) {
                    existing
                        .columns
                        .push(LiveColumn::new(&column.name, data_type(column.column_type)));
                }
            }
        }
        state.log.push((tenant, Logged::Notify));
        Ok(())
    }

    async fn write(&mut self, table: &str, statements: &[WriteStatement]) -> SyncResult<u64> {
        let key = self.key(table);
        let mut state = self.state.lock().unwrap();
        for statement in statements {
            state
                .log
                .push((self.tenant.clone(), Logged::Write(statement.sql.clone())));
        }
        if state.fail_writes_to.contains(table) {
            return Err(SyncError::upsert(&self.tenant, table, "simulated write failure"));
        }

        let target = state
            .tables
            .get(&key)
            .cloned()
            .ok_or_else(|| SyncError::upsert(&self.tenant, table, "relation does not exist"))?;
        // work on a copy so a failing statement leaves the table untouched
        let mut staged = target.clone();
        let mut affected = 0u64;
        for statement in statements {
            for column in &statement.columns {
                if !staged.columns.iter().any(|c| &c.name == column) {
                    return Err(SyncError::upsert(
                        &self.tenant,
                        table,
                        format!("column \"{}\" does not exist", column),
                    ));
                }
            }
            let row: HashMap<String, JsonValue> = statement
                .columns
                .iter()
                .cloned()
                .zip(statement.values.iter().map(to_json))
                .collect();

            match &statement.mode {
                WriteMode::Insert => {
                    staged.rows.push(row);
                    affected += 1;
                }
                WriteMode::Upsert { key, update_columns } => {
                    let position = staged.rows.iter().position(|r| r.get(key) == row.get(key));
                    match position {
                        // ON CONFLICT DO NOTHING
                        Some(_) if update_columns.is_empty() => {}
                        Some(idx) => {
                            for column in update_columns {
                                staged.rows[idx].insert(
                                    column.clone(),
                                    row.get(column).cloned().unwrap_or(JsonValue::Null),
                                );
                            }
                            affected += 1;
                        }
                        None => {
                            staged.rows.push(row);
                            affected += 1;
                        }
                    }
                }
            }
        }
        state.tables.insert(key, staged);
        Ok(affected)
    }
}

#[async_trait]
impl SessionSource for FakeDatabase {
    async fn open(&self, tenant_id: &str) -> SyncResult<Box<dyn TenantSession>> {
        let mut state = self.state.lock().unwrap();
        if !state.tenants.contains(tenant_id) {
            return Err(SyncError::config_not_found(tenant_id, "tenant is not configured"));
        }
        state.opens += 1;
        Ok(Box::new(FakeSession {
            tenant: tenant_id.to_string(),
            state: self.state.clone(),
        }))
    }

    async fn invalidate(&self, tenant_id: &str) {
        let mut state = self.state.lock().unwrap();
        *state.invalidations.entry(tenant_id.to_string()).or_default() += 1;
    }
}

pub fn fast_settle(attempts: u32) -> SettlePolicy {
    SettlePolicy {
        attempts,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(4),
    }
}

pub fn service(db: &FakeDatabase) -> UpsertService {
    UpsertService::new(Arc::new(db.clone()), fast_settle(1), InferenceOptions::default())
}

/// Builds records from a JSON array of objects.
pub fn records(value: JsonValue) -> Vec<Record> {
    serde_json::from_value(value).unwrap()
}
