//! Per-tenant configuration lookup.
//!
//! Each tenant is described by a flat key/value map. The engine reads the
//! database location (`DB_URL`), the database credential (`DB_TOKEN`), the
//! target schema (`DB_SCHEMA`) and an optional pool size
//! (`DB_MAX_CONNECTIONS`).

use crate::domain::error::{SyncError, SyncResult};
use anyhow::Context;
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub const KEY_DB_URL: &str = "DB_URL";
pub const KEY_DB_TOKEN: &str = "DB_TOKEN";
pub const KEY_DB_SCHEMA: &str = "DB_SCHEMA";
pub const KEY_DB_MAX_CONNECTIONS: &str = "DB_MAX_CONNECTIONS";

pub const DEFAULT_SCHEMA: &str = "public";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TenantConfig {
    values: HashMap<String, String>,
}

impl TenantConfig {
    pub fn new(values: HashMap<String, String>) -> Self {
        Self { values }
    }

    /// Blank values count as absent.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn location(&self) -> Option<&str> {
        self.get(KEY_DB_URL)
    }

    pub fn credential(&self) -> Option<&str> {
        self.get(KEY_DB_TOKEN)
    }

    pub fn schema_name(&self) -> &str {
        self.get(KEY_DB_SCHEMA).unwrap_or(DEFAULT_SCHEMA)
    }

    /// Pool size override; unparsable values are ignored.
    pub fn max_connections(&self) -> Option<u32> {
        self.get(KEY_DB_MAX_CONNECTIONS)
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|n| *n > 0)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for TenantConfig {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Source of tenant configuration. `Ok(None)` means the tenant is unknown.
#[async_trait]
pub trait TenantConfigProvider: Send + Sync {
    async fn get_config(&self, tenant_id: &str) -> SyncResult<Option<TenantConfig>>;
}

/// Reads configuration rows from the `tenant_config` table of the main database.
#[derive(Clone)]
pub struct PgTenantConfigProvider {
    pool: PgPool,
}

impl PgTenantConfigProvider {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Builds a provider over a lazily connected pool; nothing is dialed until
    /// the first lookup.
    pub fn connect_lazy(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect_lazy(database_url)
            .context("invalid TENANT_CONFIG_DATABASE_URL")?;
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl TenantConfigProvider for PgTenantConfigProvider {
    async fn get_config(&self, tenant_id: &str) -> SyncResult<Option<TenantConfig>> {
        let rows = sqlx::query(
            "SELECT config_key, config_value FROM tenant_config WHERE tenant_id = $1",
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SyncError::config_not_found(tenant_id, format!("config lookup failed: {}", e)))?;

        if rows.is_empty() {
            return Ok(None);
        }

        let mut values = HashMap::with_capacity(rows.len());
        for row in rows {
            let key: String = row
                .try_get("config_key")
                .map_err(|e| SyncError::config_not_found(tenant_id, e.to_string()))?;
            let value: Option<String> = row
                .try_get("config_value")
                .map_err(|e| SyncError::config_not_found(tenant_id, e.to_string()))?;
            if let Some(value) = value {
                values.insert(key, value);
            }
        }
        Ok(Some(TenantConfig::new(values)))
    }
}

/// Fixed in-memory configuration, typically loaded from a JSON file of the
/// form `{"tenant": {"DB_URL": "...", "DB_TOKEN": "..."}}`.
#[derive(Debug, Clone, Default)]
pub struct StaticTenantConfigProvider {
    tenants: HashMap<String, TenantConfig>,
}

impl StaticTenantConfigProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tenant(mut self, tenant_id: &str, config: TenantConfig) -> Self {
        self.tenants.insert(tenant_id.to_string(), config);
        self
    }

    pub fn from_json_str(raw: &str) -> anyhow::Result<Self> {
        let parsed: HashMap<String, HashMap<String, String>> =
            serde_json::from_str(raw).context("tenant config must map tenant ids to string maps")?;
        Ok(Self {
            tenants: parsed
                .into_iter()
                .map(|(tenant, values)| (tenant, TenantConfig::new(values)))
                .collect(),
        })
    }

    pub fn from_json_file(path: &str) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read tenant config file {}", path))?;
        Self::from_json_str(&raw)
    }
}

#[async_trait]
impl TenantConfigProvider for StaticTenantConfigProvider {
    async fn get_config(&self, tenant_id: &str) -> SyncResult<Option<TenantConfig>> {
        Ok(self.tenants.get(tenant_id).cloned())
    }
}

struct CacheEntry {
    loaded_at: Instant,
    config: TenantConfig,
}

/// Per-tenant TTL cache in front of another provider. Unknown tenants and
/// lookup failures are not cached.
pub struct CachedTenantConfigProvider {
    inner: Arc<dyn TenantConfigProvider>,
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl CachedTenantConfigProvider {
    pub fn new(inner: Arc<dyn TenantConfigProvider>, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn cached(&self, tenant_id: &str) -> Option<TenantConfig> {
        let mut entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match entries.get(tenant_id) {
            Some(entry) if entry.loaded_at.elapsed() < self.ttl => Some(entry.config.clone()),
            Some(_) => {
                entries.remove(tenant_id);
                None
            }
            None => None,
        }
    }

    pub fn evict(&self, tenant_id: &str) {
        let mut entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.remove(tenant_id);
    }
}

#[async_trait]
impl TenantConfigProvider for CachedTenantConfigProvider {
    async fn get_config(&self, tenant_id: &str) -> SyncResult<Option<TenantConfig>> {
        if let Some(config) = self.cached(tenant_id) {
            debug!(tenant = tenant_id, "tenant config served from cache");
            return Ok(Some(config));
        }

        let loaded = self.inner.get_config(tenant_id).await?;
        match &loaded {
            Some(config) => {
                let mut entries = match self.entries.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                entries.insert(
                    tenant_id.to_string(),
                    CacheEntry {
                        loaded_at: Instant::now(),
                        config: config.clone(),
                    },
                );
            }
            None => warn!(tenant = tenant_id, "no configuration found for tenant"),
        }
        Ok(loaded)
    }
}

/// Picks the provider chain for the process: the config database when one is
/// configured, otherwise a JSON file, otherwise an empty map. Either store is
/// wrapped in the TTL cache.
pub fn provider_from_settings(
    settings: &crate::infra::config::Settings,
) -> anyhow::Result<Arc<dyn TenantConfigProvider>> {
    let inner: Arc<dyn TenantConfigProvider> =
        if let Some(url) = &settings.tenant_config_database_url {
            Arc::new(PgTenantConfigProvider::connect_lazy(url)?)
        } else if let Some(path) = &settings.tenant_config_file {
            Arc::new(StaticTenantConfigProvider::from_json_file(path)?)
        } else {
            Arc::new(StaticTenantConfigProvider::new())
        };
    Ok(Arc::new(CachedTenantConfigProvider::new(
        inner,
        settings.tenant_config_ttl,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TenantConfigProvider for CountingProvider {
        async fn get_config(&self, tenant_id: &str) -> SyncResult<Option<TenantConfig>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if tenant_id == "ghost" {
                return Ok(None);
            }
            Ok(Some(TenantConfig::from_iter([(KEY_DB_URL, "https://p.supabase.co")])))
        }
    }

    #[test]
    fn accessors_apply_defaults() {
        let config = TenantConfig::from_iter([
            (KEY_DB_URL, " https://abc.supabase.co "),
            (KEY_DB_TOKEN, ""),
            (KEY_DB_MAX_CONNECTIONS, "zero"),
        ]);
        assert_eq!(config.location(), Some("https://abc.supabase.co"));
        assert_eq!(config.credential(), None);
        assert_eq!(config.schema_name(), "public");
        assert_eq!(config.max_connections(), None);
    }

    #[test]
    fn static_provider_parses_json() {
        let provider = StaticTenantConfigProvider::from_json_str(
            r#"{"acme": {"DB_URL": "https://acme.supabase.co", "DB_SCHEMA": "sales"}}"#,
        )
        .unwrap();
        let config = provider.tenants.get("acme").unwrap();
        assert_eq!(config.schema_name(), "sales");
        assert!(StaticTenantConfigProvider::from_json_str("[1, 2]").is_err());
    }

    #[tokio::test]
    async fn cache_serves_until_ttl_or_eviction() {
        let inner = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
        });
        let cached = CachedTenantConfigProvider::new(inner.clone(), Duration::from_secs(60));

        assert!(cached.get_config("acme").await.unwrap().is_some());
        assert!(cached.get_config("acme").await.unwrap().is_some());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);

        cached.evict("acme");
        cached.get_config("acme").await.unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);

        // unknown tenants are looked up every time
        assert!(cached.get_config("ghost").await.unwrap().is_none());
        assert!(cached.get_config("ghost").await.unwrap().is_none());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn expired_entries_are_reloaded() {
        let inner = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
        });
        let cached = CachedTenantConfigProvider::new(inner.clone(), Duration::ZERO);
        cached.get_config("acme").await.unwrap();
        cached.get_config("acme").await.unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }
}
