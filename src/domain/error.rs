//! Error taxonomy for the schema synchronization and upsert engine.

use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

/// Failure raised while synchronizing a table for a tenant.
///
/// Every variant names the tenant (and the table, when one is involved) so
/// callers can log a failure without extra context.
#[derive(Error, Debug, Clone)]
pub enum SyncError {
    #[error("configuration not found for tenant '{tenant}': {reason}")]
    ConfigNotFound { tenant: String, reason: String },

    #[error("could not connect to the database of tenant '{tenant}': {message}")]
    ConnectFailed { tenant: String, message: String },

    #[error("DDL failed for table '{table}' of tenant '{tenant}': {message}")]
    Ddl {
        tenant: String,
        table: String,
        statement: String,
        message: String,
    },

    #[error(
        "table '{table}' of tenant '{tenant}' is still missing after {attempts} settle cycle(s)"
    )]
    ExistenceCheckFailed {
        tenant: String,
        table: String,
        attempts: u32,
    },

    #[error("catalog lookup failed for table '{table}' of tenant '{tenant}': {message}")]
    Catalog {
        tenant: String,
        table: String,
        message: String,
    },

    #[error("write to table '{table}' of tenant '{tenant}' failed: {message}")]
    Upsert {
        tenant: String,
        table: String,
        message: String,
    },

    #[error("no records supplied for table '{table}'")]
    EmptyInput { table: String },
}

/// Copyable discriminant of [`SyncError`], exposed in results and HTTP bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SyncErrorKind {
    ConfigNotFound,
    ConnectFailed,
    Ddl,
    ExistenceCheckFailed,
    Catalog,
    Upsert,
    EmptyInput,
}

impl SyncError {
    pub fn kind(&self) -> SyncErrorKind {
        match self {
            SyncError::ConfigNotFound { .. } => SyncErrorKind::ConfigNotFound,
            SyncError::ConnectFailed { .. } => SyncErrorKind::ConnectFailed,
            SyncError::Ddl { .. } => SyncErrorKind::Ddl,
            SyncError::ExistenceCheckFailed { .. } => SyncErrorKind::ExistenceCheckFailed,
            SyncError::Catalog { .. } => SyncErrorKind::Catalog,
            SyncError::Upsert { .. } => SyncErrorKind::Upsert,
            SyncError::EmptyInput { .. } => SyncErrorKind::EmptyInput,
        }
    }

    pub fn config_not_found(tenant: &str, reason: impl Into<String>) -> Self {
        SyncError::ConfigNotFound {
            tenant: tenant.to_string(),
            reason: reason.into(),
        }
    }

    pub fn connect_failed(tenant: &str, err: impl std::fmt::Display) -> Self {
        SyncError::ConnectFailed {
            tenant: tenant.to_string(),
            message: err.to_string(),
        }
    }

    pub fn catalog(tenant: &str, table: &str, err: impl std::fmt::Display) -> Self {
        SyncError::Catalog {
            tenant: tenant.to_string(),
            table: table.to_string(),
            message: err.to_string(),
        }
    }

    pub fn upsert(tenant: &str, table: &str, err: impl std::fmt::Display) -> Self {
        SyncError::Upsert {
            tenant: tenant.to_string(),
            table: table.to_string(),
            message: err.to_string(),
        }
    }
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;
