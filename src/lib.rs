pub mod app;
pub mod domain;
pub mod infra;
pub mod storage;
pub mod transport;

// Convenience re-exports (keeps call-sites clean)
pub use app::{BatchResult, SettlePolicy, UpsertResult, UpsertService};
pub use domain::schema::{InferenceOptions, Record};
pub use domain::{SyncError, SyncErrorKind, SyncResult};
pub use infra::Settings;
pub use storage::{SessionSource, TenantConnectionRegistry, TenantSession};
