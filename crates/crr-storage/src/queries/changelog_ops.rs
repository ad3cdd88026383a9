//! Shadow clock tables: one per tracked table, keyed by `(pk, col_name)`.
//!
//! Site ids are stored as lowercase hyphenated UUID text. Lexicographic
//! comparison of that form equals big-endian comparison of the UUID bytes
//! (fixed-position hyphens, hex digits in ASCII order), so SQL `<` on the
//! column agrees with [`CellVersion`]'s tie-break.

use rusqlite::{params, Connection, OptionalExtension};

use crr_core::constants::{CLOCK_TABLE_SUFFIX, TOMBSTONE_COLUMN};
use crr_core::errors::{CrrResult, StorageError};
use crr_core::SiteId;
use crr_crdt::CellVersion;

use crate::to_storage_err;
use crate::value::quote_ident;

/// Stored version tuple of one clock slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StoredSlot {
    pub version: CellVersion,
    pub db_version: u64,
    pub seq: u64,
}

/// One raw clock row, as read by the changes reader.
#[derive(Debug, Clone)]
pub struct ClockRow {
    pub pk_encoded: String,
    pub column: String,
    pub col_version: u64,
    pub db_version: u64,
    pub site_id: SiteId,
    pub seq: u64,
}

pub fn clock_table_name(table: &str) -> String {
    format!("{table}{CLOCK_TABLE_SUFFIX}")
}

pub fn create_clock_table(conn: &Connection, table: &str) -> CrrResult<()> {
    let clock = quote_ident(&clock_table_name(table));
    let index = quote_ident(&format!("{}_version_idx", clock_table_name(table)));
    conn.execute_batch(&format!(
        "
        CREATE TABLE IF NOT EXISTS {clock} (
            pk          TEXT NOT NULL,
            col_name    TEXT NOT NULL,
            col_version INTEGER NOT NULL,
            db_version  INTEGER NOT NULL,
            site_id     TEXT NOT NULL,
            seq         INTEGER NOT NULL,
            PRIMARY KEY (pk, col_name)
        );
        CREATE INDEX IF NOT EXISTS {index} ON {clock} (db_version, seq);
        "
    ))
    .map_err(|e| to_storage_err(format!("create clock table for {table}: {e}")))
}

pub fn drop_clock_table(conn: &Connection, table: &str) -> CrrResult<()> {
    let clock = quote_ident(&clock_table_name(table));
    conn.execute_batch(&format!("DROP TABLE IF EXISTS {clock};"))
        .map_err(|e| to_storage_err(format!("drop clock table for {table}: {e}")))
}

fn parse_site(raw: &str) -> CrrResult<SiteId> {
    SiteId::parse(raw).map_err(|e| {
        StorageError::MetaCorrupt {
            details: format!("clock site_id {raw}: {e}"),
        }
        .into()
    })
}

/// Read the stored slot for one cell (or the tombstone slot).
pub fn get_slot(
    conn: &Connection,
    table: &str,
    pk_encoded: &str,
    column: &str,
) -> CrrResult<Option<StoredSlot>> {
    let clock = quote_ident(&clock_table_name(table));
    let row = conn
        .query_row(
            &format!(
                "SELECT col_version, db_version, site_id, seq FROM {clock}
                 WHERE pk = ?1 AND col_name = ?2"
            ),
            params![pk_encoded, column],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            },
        )
        .optional()
        .map_err(|e| to_storage_err(format!("get_slot {table}.{column}: {e}")))?;

    match row {
        None => Ok(None),
        Some((col_version, db_version, site, seq)) => Ok(Some(StoredSlot {
            version: CellVersion::new(col_version as u64, parse_site(&site)?),
            db_version: db_version as u64,
            seq: seq as u64,
        })),
    }
}

/// Shorthand for the row's tombstone slot.
pub fn get_tombstone(
    conn: &Connection,
    table: &str,
    pk_encoded: &str,
) -> CrrResult<Option<StoredSlot>> {
    get_slot(conn, table, pk_encoded, TOMBSTONE_COLUMN)
}

/// Write one clock slot, replacing any prior tuple.
pub fn upsert_slot(
    conn: &Connection,
    table: &str,
    pk_encoded: &str,
    column: &str,
    version: CellVersion,
    db_version: u64,
    seq: u64,
) -> CrrResult<()> {
    let clock = quote_ident(&clock_table_name(table));
    conn.execute(
        &format!(
            "INSERT INTO {clock} (pk, col_name, col_version, db_version, site_id, seq)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (pk, col_name) DO UPDATE SET
                col_version = excluded.col_version,
                db_version = excluded.db_version,
                site_id = excluded.site_id,
                seq = excluded.seq"
        ),
        params![
            pk_encoded,
            column,
            version.col_version as i64,
            db_version as i64,
            version.site_id.to_string(),
            seq as i64,
        ],
    )
    .map_err(|e| to_storage_err(format!("upsert_slot {table}.{column}: {e}")))?;
    Ok(())
}

/// Clear every column slot a tombstone outranks. Surviving slots are the
/// columns that revive the row.
pub fn clear_dominated_columns(
    conn: &Connection,
    table: &str,
    pk_encoded: &str,
    tombstone: CellVersion,
) -> CrrResult<()> {
    let clock = quote_ident(&clock_table_name(table));
    conn.execute(
        &format!(
            "DELETE FROM {clock}
             WHERE pk = ?1 AND col_name != ?2
               AND (col_version < ?3 OR (col_version = ?3 AND site_id < ?4))"
        ),
        params![
            pk_encoded,
            TOMBSTONE_COLUMN,
            tombstone.col_version as i64,
            tombstone.site_id.to_string(),
        ],
    )
    .map_err(|e| to_storage_err(format!("clear_dominated_columns {table}: {e}")))?;
    Ok(())
}

/// Column slots that outrank a tombstone, i.e. stay live through it.
pub fn surviving_columns(
    conn: &Connection,
    table: &str,
    pk_encoded: &str,
    tombstone: CellVersion,
) -> CrrResult<Vec<String>> {
    let clock = quote_ident(&clock_table_name(table));
    let mut stmt = conn
        .prepare(&format!(
            "SELECT col_name FROM {clock}
             WHERE pk = ?1 AND col_name != ?2
               AND (col_version > ?3 OR (col_version = ?3 AND site_id > ?4))
             ORDER BY col_name"
        ))
        .map_err(|e| to_storage_err(format!("surviving_columns {table}: {e}")))?;
    let rows = stmt
        .query_map(
            params![
                pk_encoded,
                TOMBSTONE_COLUMN,
                tombstone.col_version as i64,
                tombstone.site_id.to_string(),
            ],
            |row| row.get::<_, String>(0),
        )
        .map_err(|e| to_storage_err(format!("surviving_columns {table}: {e}")))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.map_err(|e| to_storage_err(format!("surviving_columns {table}: {e}")))?);
    }
    Ok(out)
}

/// Drop every column slot of a row (local delete: the tombstone dominates
/// them all by construction).
pub fn clear_all_columns(conn: &Connection, table: &str, pk_encoded: &str) -> CrrResult<()> {
    let clock = quote_ident(&clock_table_name(table));
    conn.execute(
        &format!("DELETE FROM {clock} WHERE pk = ?1 AND col_name != ?2"),
        params![pk_encoded, TOMBSTONE_COLUMN],
    )
    .map_err(|e| to_storage_err(format!("clear_all_columns {table}: {e}")))?;
    Ok(())
}

/// Highest `col_version` across every slot of a row, tombstone included.
pub fn max_col_version(conn: &Connection, table: &str, pk_encoded: &str) -> CrrResult<u64> {
    let clock = quote_ident(&clock_table_name(table));
    let max: Option<i64> = conn
        .query_row(
            &format!("SELECT MAX(col_version) FROM {clock} WHERE pk = ?1"),
            params![pk_encoded],
            |row| row.get(0),
        )
        .map_err(|e| to_storage_err(format!("max_col_version {table}: {e}")))?;
    Ok(max.unwrap_or(0) as u64)
}

/// All clock rows of one table above a watermark, optionally excluding an
/// originating site. Ordering across tables happens in the reader.
pub fn rows_since(
    conn: &Connection,
    table: &str,
    since_db_version: u64,
    exclude_site: Option<SiteId>,
) -> CrrResult<Vec<ClockRow>> {
    let clock = quote_ident(&clock_table_name(table));
    let sql = format!(
        "SELECT pk, col_name, col_version, db_version, site_id, seq FROM {clock}
         WHERE db_version > ?1 AND (?2 IS NULL OR site_id != ?2)
         ORDER BY db_version, seq"
    );
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| to_storage_err(format!("rows_since {table}: {e}")))?;
    let rows = stmt
        .query_map(
            params![since_db_version as i64, exclude_site.map(|s| s.to_string())],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, i64>(5)?,
                ))
            },
        )
        .map_err(|e| to_storage_err(format!("rows_since {table}: {e}")))?;

    let mut out = Vec::new();
    for row in rows {
        let (pk_encoded, column, col_version, db_version, site, seq) =
            row.map_err(|e| to_storage_err(format!("rows_since {table}: {e}")))?;
        out.push(ClockRow {
            pk_encoded,
            column,
            col_version: col_version as u64,
            db_version: db_version as u64,
            site_id: parse_site(&site)?,
            seq: seq as u64,
        });
    }
    Ok(out)
}
