//! The version clock: persisted `db_version` counter and stable site id.

use rusqlite::Connection;

use crr_core::errors::{CrrResult, StorageError};
use crr_core::SiteId;

use crate::to_storage_err;

/// The replica's stable site identifier.
pub fn site_id(conn: &Connection) -> CrrResult<SiteId> {
    let raw: String = conn
        .query_row("SELECT site_id FROM crr_meta WHERE id = 1", [], |row| {
            row.get(0)
        })
        .map_err(|e| to_storage_err(format!("site_id: {e}")))?;
    SiteId::parse(&raw).map_err(|e| {
        StorageError::MetaCorrupt {
            details: format!("site_id {raw}: {e}"),
        }
        .into()
    })
}

/// Current `db_version` without advancing it.
pub fn current_db_version(conn: &Connection) -> CrrResult<u64> {
    let version: i64 = conn
        .query_row("SELECT db_version FROM crr_meta WHERE id = 1", [], |row| {
            row.get(0)
        })
        .map_err(|e| to_storage_err(format!("current_db_version: {e}")))?;
    Ok(version as u64)
}

/// Advance the clock and return the new tick.
///
/// Runs inside the caller's ambient transaction, so the tick is persisted
/// atomically with the write that consumed it and is never reused after a
/// crash. Called at most once per local write transaction.
pub fn next_db_version(conn: &Connection) -> CrrResult<u64> {
    conn.execute(
        "UPDATE crr_meta SET db_version = db_version + 1 WHERE id = 1",
        [],
    )
    .map_err(|e| to_storage_err(format!("next_db_version: {e}")))?;
    current_db_version(conn)
}
