use crate::app::{BatchResult, UpsertResult};
use crate::domain::error::SyncErrorKind;
use crate::transport::http::handlers::{data, health, webhook};
use crate::transport::http::types::{ApiResponse, AppState, DataRequest, WebhookRequest};
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        health::healthcheck_handler,
        data::ingest_data_handler,
        webhook::webhook_handler
    ),
    components(schemas(
        ApiResponse,
        DataRequest,
        WebhookRequest,
        UpsertResult,
        BatchResult,
        SyncErrorKind
    ))
)]
pub struct ApiDoc;

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::healthcheck_handler))
        .route("/api/data/:tenant_id", post(data::ingest_data_handler))
        .route("/webhook/data", post(webhook::webhook_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}
