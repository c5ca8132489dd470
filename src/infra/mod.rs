pub mod config;
pub mod logging;
pub mod tenant_config;

pub use config::Settings;
pub use tenant_config::{
    CachedTenantConfigProvider, PgTenantConfigProvider, StaticTenantConfigProvider, TenantConfig,
    TenantConfigProvider,
};
