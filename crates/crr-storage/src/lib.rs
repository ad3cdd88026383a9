//! # crr-storage
//!
//! SQLite-backed persistence for replicated relations: replica handle,
//! bookkeeping migrations, schema descriptors, the tracked-write capture
//! session, and the query modules over the shadow clock tables.

pub mod capture;
pub mod migrations;
pub mod queries;
pub mod replica;
pub mod schema;
pub mod value;

pub use capture::TrackedWrite;
pub use replica::Replica;
pub use schema::TableSchema;

use crr_core::errors::{CrrError, StorageError};

/// Map a rusqlite failure into the storage arm of the error taxonomy.
pub fn to_storage_err(message: impl Into<String>) -> CrrError {
    CrrError::Storage(StorageError::SqliteError {
        message: message.into(),
    })
}
