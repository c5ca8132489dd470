use crate::transport::http::handlers::common::{envelope, status_for, validate_table, validate_tenant};
use crate::transport::http::types::{json_422, AppState, DataRequest};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

#[utoipa::path(
    post,
    path = "/api/data/{tenant_id}",
    params(
        ("tenant_id" = String, Path, description = "Tenant whose database receives the records")
    ),
    request_body = DataRequest,
    responses(
        (status = 200, description = "Records written", body = ApiResponse),
        (status = 400, description = "Bad request", body = ApiResponse),
        (status = 404, description = "Tenant not configured", body = ApiResponse),
        (status = 422, description = "Unprocessable entity (invalid JSON body)", body = ApiResponse),
        (status = 500, description = "Schema sync or write failed", body = ApiResponse),
        (status = 503, description = "Tenant database unreachable", body = ApiResponse)
    )
)]
pub async fn ingest_data_handler(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    request: Result<Json<DataRequest>, JsonRejection>,
) -> impl IntoResponse {
    let tenant_id = match validate_tenant(&tenant_id) {
        Ok(t) => t,
        Err(resp) => return resp.into_response(),
    };
    let Json(request) = match request {
        Ok(v) => v,
        Err(e) => {
            return json_422(e, "{\"table_name\": \"...\", \"data\": [{...}]}").into_response();
        }
    };
    if let Err(resp) = validate_table(&request.table_name) {
        return resp.into_response();
    }

    let result = state
        .upsert_service
        .upsert(&tenant_id, &request.table_name, &request.data)
        .await;

    match result.error_kind {
        None => envelope(StatusCode::OK, true, &result, None).into_response(),
        Some(kind) => {
            let message = result.message.clone();
            envelope(status_for(kind), false, &result, Some(message)).into_response()
        }
    }
}
