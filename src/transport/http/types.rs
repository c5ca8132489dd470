use crate::app::UpsertService;
use crate::domain::schema::Record;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;
use utoipa::ToSchema;

#[derive(Clone)]
pub struct AppState {
    pub upsert_service: Arc<UpsertService>,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct ApiResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Object)]
    pub data: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ApiResponse {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Body of `POST /api/data/{tenant_id}`.
#[derive(Deserialize, Debug, ToSchema)]
pub struct DataRequest {
    pub table_name: String,
    /// Flat records; the first one shapes the table.
    #[schema(value_type = Vec<Object>)]
    pub data: Vec<Record>,
}

/// Body of `POST /webhook/data`. Carries either `data` (table name to
/// records) or `table` plus `records`.
#[derive(Deserialize, Debug, ToSchema)]
pub struct WebhookRequest {
    pub tenant_id: String,
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub data: Option<Map<String, JsonValue>>,
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    #[schema(value_type = Option<Vec<Object>>)]
    pub records: Option<Vec<Record>>,
}

/// A webhook body resolved to one of its two accepted shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestPayload {
    /// Tables in the order they appeared in the body.
    MultiTable(Vec<(String, Vec<Record>)>),
    SingleTable { table: String, records: Vec<Record> },
}

impl IngestPayload {
    pub fn into_tables(self) -> Vec<(String, Vec<Record>)> {
        match self {
            IngestPayload::MultiTable(tables) => tables,
            IngestPayload::SingleTable { table, records } => vec![(table, records)],
        }
    }
}

impl WebhookRequest {
    pub fn into_payload(self) -> Result<IngestPayload, String> {
        match (self.data, self.table) {
            (Some(_), Some(_)) => {
                Err("send either `data` or `table` with `records`, not both".to_string())
            }
            (Some(data), None) => {
                if data.is_empty() {
                    return Err("`data` names no tables".to_string());
                }
                let mut tables = Vec::with_capacity(data.len());
                for (table, value) in data {
                    let records: Vec<Record> = serde_json::from_value(value).map_err(|e| {
                        format!("`data.{}` must be a list of objects: {}", table, e)
                    })?;
                    tables.push((table, records));
                }
                Ok(IngestPayload::MultiTable(tables))
            }
            (None, Some(table)) => Ok(IngestPayload::SingleTable {
                table,
                records: self.records.unwrap_or_default(),
            }),
            (None, None) => Err("missing `data` or `table`".to_string()),
        }
    }
}

pub fn json_422(err: JsonRejection, expected: &str) -> (StatusCode, Json<ApiResponse>) {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(ApiResponse::error(format!(
            "Invalid JSON body: {} (expected: {})",
            err, expected
        ))),
    )
}
