//! Bookkeeping tables: replica metadata, tracked-table registry, peer
//! watermarks. Shadow clock tables are created per table at activation.

use rusqlite::Connection;
use uuid::Uuid;

use crr_core::errors::CrrResult;

use crate::to_storage_err;

pub fn run_migrations(conn: &Connection) -> CrrResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS crr_meta (
            id          INTEGER PRIMARY KEY CHECK (id = 1),
            site_id     TEXT NOT NULL,
            db_version  INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS crr_tracked (
            table_name   TEXT PRIMARY KEY,
            schema_json  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS crr_peers (
            site_id     TEXT PRIMARY KEY,
            db_version  INTEGER NOT NULL DEFAULT 0
        );
        ",
    )
    .map_err(|e| to_storage_err(format!("migrations: {e}")))?;

    // Assign the site id exactly once per database. INSERT OR IGNORE keeps
    // reopen idempotent; the id is never regenerated afterwards.
    conn.execute(
        "INSERT OR IGNORE INTO crr_meta (id, site_id, db_version) VALUES (1, ?1, 0)",
        [Uuid::new_v4().to_string()],
    )
    .map_err(|e| to_storage_err(format!("migrations seed: {e}")))?;

    Ok(())
}
