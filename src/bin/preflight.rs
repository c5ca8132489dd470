use std::sync::Arc;
use tenant_sync::infra::{logging, tenant_config};
use tenant_sync::storage::connection_url::redact;
use tenant_sync::{Settings, TenantConnectionRegistry};

fn usage_and_exit() -> ! {
    eprintln!(
        "Usage: cargo run --bin preflight -- <tenant_id> [<tenant_id>...]\n\
         \n\
         Reads tenant configuration from one of:\n\
           DATABASE_URL (shared database for every tenant)\n\
           TENANT_CONFIG_DATABASE_URL (tenant_config table)\n\
           TENANT_CONFIG_FILE (JSON file)\n"
    );
    std::process::exit(2);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::from_env()?;
    logging::init_tracing();

    let tenants: Vec<String> = std::env::args().skip(1).collect();
    if tenants.is_empty() || tenants.iter().any(|a| a == "-h" || a == "--help") {
        usage_and_exit();
    }

    println!("> Preflight:");
    match &settings.database_url {
        Some(url) => println!("  DATABASE_URL={}", redact(url)),
        None => println!("  DATABASE_URL not set; using per-tenant configuration"),
    }
    println!("  HOSTED_DB_DOMAIN={}", settings.hosted_db_domain);

    let provider = tenant_config::provider_from_settings(&settings)?;
    let registry = Arc::new(TenantConnectionRegistry::new(settings.clone(), provider));

    let mut outcome = Ok(());
    for tenant_id in &tenants {
        println!("> Tenant {}:", tenant_id);
        if let Err(e) = check_tenant(&registry, tenant_id).await {
            eprintln!("  FAILED: {}", e);
            outcome = Err(anyhow::anyhow!("preflight failed for tenant '{}': {}", tenant_id, e));
            break;
        }
    }

    registry.close_all().await;
    outcome?;
    println!("> Preflight OK.");
    Ok(())
}

async fn check_tenant(registry: &TenantConnectionRegistry, tenant_id: &str) -> anyhow::Result<()> {
    let mut session = registry.open_pg(tenant_id).await?;
    println!("  Connected.");

    session.execute("SELECT 1").await?;
    println!("  SELECT 1 ok.");

    let tables = session.list_tables().await?;
    if tables.is_empty() {
        println!("  No tables yet.");
    } else {
        println!("  Tables ({}): {}", tables.len(), tables.join(", "));
    }
    Ok(())
}
