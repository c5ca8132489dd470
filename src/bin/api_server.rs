// src/bin/api_server.rs

use std::sync::Arc;
use tenant_sync::infra::{logging, tenant_config};
use tenant_sync::transport;
use tenant_sync::{InferenceOptions, Settings, SettlePolicy, TenantConnectionRegistry, UpsertService};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::from_env()?;
    logging::init_tracing();

    // --- Tenant configuration ---
    let provider = tenant_config::provider_from_settings(&settings)?;
    if settings.database_url.is_some() {
        info!("DATABASE_URL is set; every tenant shares that database");
    } else if settings.tenant_config_database_url.is_none() && settings.tenant_config_file.is_none() {
        info!("no tenant config source configured; only DATABASE_URL tenants can connect");
    }

    // --- Engine ---
    let registry = Arc::new(TenantConnectionRegistry::new(settings.clone(), provider));
    let upsert_service = UpsertService::new(
        registry.clone(),
        SettlePolicy::from_settings(&settings.settle),
        InferenceOptions {
            label_max_length: settings.label_max_length,
        },
    );
    let app_state = transport::http::AppState {
        upsert_service: Arc::new(upsert_service),
    };

    // --- API Server Initialization ---
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);
    let app = transport::http::create_router(app_state)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", transport::http::ApiDoc::openapi()))
        .layer(cors);

    let addr = format!("{}:{}", settings.http_host, settings.http_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("API server listening on http://{}", addr);
    info!("Swagger UI available at http://{}/swagger-ui", addr);

    tokio::select! {
        result = axum::serve(listener, app) => {
            if let Err(e) = &result {
                error!(error = %e, "server stopped");
            }
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received, closing tenant pools");
        }
    }

    registry.close_all().await;
    info!("graceful shutdown complete");
    Ok(())
}
