//! Per-tenant connection pools.

use crate::domain::error::{SyncError, SyncResult};
use crate::infra::config::Settings;
use crate::infra::tenant_config::TenantConfigProvider;
use crate::storage::connection_url::{redact, resolve_target};
use crate::storage::{PgTenantSession, SessionSource, TenantSession};
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::OnceCell;
use tracing::{info, instrument, warn};

/// A tenant's pool and the schema its tables live in.
#[derive(Clone, Debug)]
pub struct TenantPool {
    pub pool: PgPool,
    pub schema: String,
}

/// Name a tenant's connections report in `pg_stat_activity`.
pub fn application_name(tenant_id: &str) -> String {
    format!("tenant-sync:{}", tenant_id)
}

/// Resolves tenant ids to lazily created connection pools.
///
/// Each tenant owns one slot; concurrent first use of a tenant waits on the
/// same slot, so exactly one pool is created per tenant.
pub struct TenantConnectionRegistry {
    settings: Settings,
    provider: Arc<dyn TenantConfigProvider>,
    pools: Mutex<HashMap<String, Arc<OnceCell<TenantPool>>>>,
}

impl TenantConnectionRegistry {
    pub fn new(settings: Settings, provider: Arc<dyn TenantConfigProvider>) -> Self {
        Self {
            settings,
            provider,
            pools: Mutex::new(HashMap::new()),
        }
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<String, Arc<OnceCell<TenantPool>>>> {
        match self.pools.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn slot(&self, tenant_id: &str) -> Arc<OnceCell<TenantPool>> {
        self.slots()
            .entry(tenant_id.to_string())
            .or_default()
            .clone()
    }

    /// Returns the tenant's pool, creating it on first use.
    #[instrument(skip(self))]
    pub async fn get(&self, tenant_id: &str) -> SyncResult<TenantPool> {
        let slot = self.slot(tenant_id);
        let pool = slot.get_or_try_init(|| self.create_pool(tenant_id)).await?;
        Ok(pool.clone())
    }

    async fn create_pool(&self, tenant_id: &str) -> SyncResult<TenantPool> {
        let config = self.provider.get_config(tenant_id).await?;
        let target = resolve_target(tenant_id, config.as_ref(), &self.settings)?;

        let pool_settings = &self.settings.pool;
        let max_connections = target
            .max_connections
            .unwrap_or(pool_settings.max_connections);
        info!(
            tenant = tenant_id,
            url = %redact(&target.url),
            schema = %target.schema,
            max_connections,
            "creating tenant pool"
        );

        let connect_options = PgConnectOptions::from_str(&target.url)
            .map_err(|e| SyncError::connect_failed(tenant_id, e))?
            // transaction poolers cannot hold prepared statements across checkouts
            .statement_cache_capacity(0)
            .application_name(&application_name(tenant_id))
            .options([(
                "statement_timeout",
                pool_settings.statement_timeout.as_millis().to_string(),
            )]);

        let pool = PgPoolOptions::new()
            .min_connections(1)
            .max_connections(max_connections)
            .acquire_timeout(pool_settings.acquire_timeout)
            .connect_with(connect_options)
            .await
            .map_err(|e| {
                warn!(tenant = tenant_id, error = %e, "tenant pool creation failed");
                SyncError::connect_failed(tenant_id, e)
            })?;

        Ok(TenantPool {
            pool,
            schema: target.schema,
        })
    }

    /// Drops the tenant's pool so the next `get` builds a new one. The old
    /// pool finishes closing in the background once borrowed connections
    /// come back.
    pub fn invalidate(&self, tenant_id: &str) {
        let removed = self.slots().remove(tenant_id);
        if let Some(pool) = removed.and_then(|slot| slot.get().map(|p| p.pool.clone())) {
            info!(tenant = tenant_id, "invalidating tenant pool");
            tokio::spawn(async move {
                pool.close().await;
            });
        }
    }

    /// Closes every pool. Used at shutdown.
    pub async fn close_all(&self) {
        let drained: Vec<(String, Arc<OnceCell<TenantPool>>)> = self.slots().drain().collect();
        for (tenant_id, slot) in drained {
            if let Some(tenant_pool) = slot.get() {
                tenant_pool.pool.close().await;
                info!(tenant = %tenant_id, "tenant pool closed");
            }
        }
    }

    /// Tenants with a live pool.
    pub fn active_tenants(&self) -> Vec<String> {
        let mut tenants: Vec<String> = self
            .slots()
            .iter()
            .filter(|(_, slot)| slot.initialized())
            .map(|(tenant, _)| tenant.clone())
            .collect();
        tenants.sort();
        tenants
    }

    /// Opens a session with the concrete Postgres type, for callers that need
    /// more than the [`TenantSession`] surface.
    pub async fn open_pg(&self, tenant_id: &str) -> SyncResult<PgTenantSession> {
        let tenant_pool = self.get(tenant_id).await?;
        let conn = tenant_pool
            .pool
            .acquire()
            .await
            .map_err(|e| SyncError::connect_failed(tenant_id, e))?;
        Ok(PgTenantSession::new(tenant_id, &tenant_pool.schema, conn))
    }
}

#[async_trait]
impl SessionSource for TenantConnectionRegistry {
    async fn open(&self, tenant_id: &str) -> SyncResult<Box<dyn TenantSession>> {
        Ok(Box::new(self.open_pg(tenant_id).await?))
    }

    async fn invalidate(&self, tenant_id: &str) {
        TenantConnectionRegistry::invalidate(self, tenant_id);
    }
}
