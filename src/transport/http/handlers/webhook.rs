use crate::transport::http::handlers::common::{envelope, status_for, validate_table, validate_tenant};
use crate::transport::http::types::{json_422, ApiResponse, AppState, WebhookRequest};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

/// Multi-table ingestion. Tables run in payload order and the first failing
/// table ends the batch.
#[utoipa::path(
    post,
    path = "/webhook/data",
    request_body = WebhookRequest,
    responses(
        (status = 200, description = "Every table written", body = ApiResponse),
        (status = 400, description = "Bad request (unrecognised payload shape)", body = ApiResponse),
        (status = 404, description = "Tenant not configured", body = ApiResponse),
        (status = 422, description = "Unprocessable entity (invalid JSON body)", body = ApiResponse),
        (status = 500, description = "A table failed; later tables were skipped", body = ApiResponse),
        (status = 503, description = "Tenant database unreachable", body = ApiResponse)
    )
)]
pub async fn webhook_handler(
    State(state): State<AppState>,
    request: Result<Json<WebhookRequest>, JsonRejection>,
) -> impl IntoResponse {
    let Json(request) = match request {
        Ok(v) => v,
        Err(e) => {
            return json_422(
                e,
                "{\"tenant_id\": \"...\", \"data\": {\"table\": [{...}]}} or \
                 {\"tenant_id\": \"...\", \"table\": \"...\", \"records\": [{...}]}",
            )
            .into_response();
        }
    };
    let tenant_id = match validate_tenant(&request.tenant_id) {
        Ok(t) => t,
        Err(resp) => return resp.into_response(),
    };
    let tables = match request.into_payload() {
        Ok(payload) => payload.into_tables(),
        Err(message) => {
            return (StatusCode::BAD_REQUEST, Json(ApiResponse::error(message))).into_response();
        }
    };
    for (table, _) in &tables {
        if let Err(resp) = validate_table(table) {
            return resp.into_response();
        }
    }

    let batch = state.upsert_service.upsert_tables(&tenant_id, &tables).await;

    match batch.failure().and_then(|f| f.error_kind.map(|k| (k, f.message.clone()))) {
        None => envelope(StatusCode::OK, true, &batch, None).into_response(),
        Some((kind, message)) => {
            envelope(status_for(kind), false, &batch, Some(message)).into_response()
        }
    }
}
