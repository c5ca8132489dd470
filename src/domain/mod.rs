pub mod error;
pub mod schema;

pub use error::{SyncError, SyncErrorKind, SyncResult};
