use crate::domain::error::SyncErrorKind;
use crate::transport::http::types::ApiResponse;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

/// Status code a failed table maps to.
pub fn status_for(kind: SyncErrorKind) -> StatusCode {
    match kind {
        SyncErrorKind::ConfigNotFound => StatusCode::NOT_FOUND,
        SyncErrorKind::ConnectFailed => StatusCode::SERVICE_UNAVAILABLE,
        SyncErrorKind::EmptyInput => StatusCode::BAD_REQUEST,
        SyncErrorKind::Ddl
        | SyncErrorKind::ExistenceCheckFailed
        | SyncErrorKind::Catalog
        | SyncErrorKind::Upsert => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn validate_tenant(tenant_id: &str) -> Result<String, (StatusCode, Json<ApiResponse>)> {
    let tenant_id = tenant_id.trim();
    if tenant_id.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("tenant_id must not be empty")),
        ));
    }
    Ok(tenant_id.to_string())
}

pub fn validate_table(table_name: &str) -> Result<(), (StatusCode, Json<ApiResponse>)> {
    if table_name.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("table name must not be empty")),
        ));
    }
    Ok(())
}

/// Wraps a result body in the response envelope.
pub fn envelope<T: Serialize>(
    status: StatusCode,
    success: bool,
    body: &T,
    error: Option<String>,
) -> (StatusCode, Json<ApiResponse>) {
    match serde_json::to_value(body) {
        Ok(data) => (
            status,
            Json(ApiResponse {
                success,
                data: Some(data),
                error,
            }),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error(format!("failed to encode response: {}", e))),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(status_for(SyncErrorKind::ConfigNotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_for(SyncErrorKind::ConnectFailed), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status_for(SyncErrorKind::EmptyInput), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_for(SyncErrorKind::ExistenceCheckFailed),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn blank_identifiers_rejected() {
        assert!(validate_tenant("  ").is_err());
        assert_eq!(validate_tenant(" acme ").unwrap(), "acme");
        assert!(validate_table("").is_err());
    }
}
