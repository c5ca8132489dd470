pub mod primary_key;
pub mod reconciler;
pub mod upsert_service;

pub use reconciler::{ReconcileOutcome, SchemaReconciler, SettlePolicy};
pub use upsert_service::{BatchResult, UpsertResult, UpsertService};
