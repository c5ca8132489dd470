//! Centralized configuration (environment variables + defaults).

use anyhow::Context;
use std::str::FromStr;
use std::time::Duration;

/// Process-wide settings loaded from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Global direct Postgres URL used for every tenant when set.
    pub database_url: Option<String>,
    /// Global database password, used when a tenant has no `DB_TOKEN`.
    pub database_secret: Option<String>,
    /// Main database holding the `tenant_config` table.
    pub tenant_config_database_url: Option<String>,
    /// JSON file with tenant configuration, used without a config database.
    pub tenant_config_file: Option<String>,
    pub tenant_config_ttl: Duration,
    /// Host suffix of the hosted service whose URLs are rewritten to direct
    /// database hosts.
    pub hosted_db_domain: String,
    pub pool: PoolSettings,
    pub settle: SettleSettings,
    pub label_max_length: Option<u32>,
    pub http_host: String,
    pub http_port: u16,
}

#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    pub statement_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct SettleSettings {
    pub attempts: u32,
    pub delay: Duration,
    pub max_delay: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 10,
            acquire_timeout: Duration::from_secs(30),
            statement_timeout: Duration::from_secs(30),
        }
    }
}

impl Default for SettleSettings {
    fn default() -> Self {
        Self {
            attempts: 1,
            delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(8000),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: None,
            database_secret: None,
            tenant_config_database_url: None,
            tenant_config_file: None,
            tenant_config_ttl: Duration::from_secs(15 * 60),
            hosted_db_domain: "supabase.co".to_string(),
            pool: PoolSettings::default(),
            settle: SettleSettings::default(),
            label_max_length: None,
            http_host: "0.0.0.0".to_string(),
            http_port: 8000,
        }
    }
}

fn var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parsed<T>(name: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(name) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("{} must be a valid number (got '{}')", name, raw)),
        None => Ok(None),
    }
}

impl Settings {
    /// Reads settings from the environment, loading `.env` first.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();
        let defaults = Settings::default();

        let pool = PoolSettings {
            max_connections: parsed::<u32>("POOL_MAX_CONNECTIONS")?
                .unwrap_or(defaults.pool.max_connections)
                .max(1),
            acquire_timeout: parsed::<u64>("POOL_ACQUIRE_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.pool.acquire_timeout),
            statement_timeout: parsed::<u64>("STATEMENT_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.pool.statement_timeout),
        };

        let settle = SettleSettings {
            attempts: parsed::<u32>("SCHEMA_SETTLE_ATTEMPTS")?
                .unwrap_or(defaults.settle.attempts)
                .max(1),
            delay: parsed::<u64>("SCHEMA_SETTLE_DELAY_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.settle.delay),
            max_delay: parsed::<u64>("SCHEMA_SETTLE_MAX_DELAY_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.settle.max_delay),
        };

        Ok(Self {
            database_url: var("DATABASE_URL"),
            database_secret: var("DATABASE_SECRET"),
            tenant_config_database_url: var("TENANT_CONFIG_DATABASE_URL"),
            tenant_config_file: var("TENANT_CONFIG_FILE"),
            tenant_config_ttl: parsed::<u64>("TENANT_CONFIG_TTL_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.tenant_config_ttl),
            hosted_db_domain: var("HOSTED_DB_DOMAIN").unwrap_or(defaults.hosted_db_domain),
            pool,
            settle,
            label_max_length: parsed::<u32>("INFER_LABEL_MAX_LENGTH")?,
            http_host: var("HTTP_HOST").unwrap_or(defaults.http_host),
            http_port: parsed::<u16>("HTTP_PORT")?.unwrap_or(defaults.http_port),
        })
    }
}
