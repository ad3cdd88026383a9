//! Replica — owns the SQLite connection, startup pragma configuration,
//! migrations, and tracking activation.

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, instrument};

use crr_core::errors::{CrrResult, SchemaError, StorageError};
use crr_core::SiteId;

use crate::capture::TrackedWrite;
use crate::migrations;
use crate::queries::{changelog_ops, clock_ops};
use crate::schema::TableSchema;
use crate::to_storage_err;

/// One database replica: a SQLite database plus the crr bookkeeping that
/// turns its tracked tables into replicated relations.
///
/// All writes flow through [`Replica::with_write`] (local DML with capture)
/// or the merge engine; the host engine's transaction discipline serializes
/// writers, so the replica holds a single connection and spawns no threads.
pub struct Replica {
    conn: Connection,
}

impl Replica {
    /// Open a replica backed by a file on disk.
    pub fn open(path: &Path) -> CrrResult<Self> {
        let conn = Connection::open(path)
            .map_err(|e| to_storage_err(format!("open {}: {e}", path.display())))?;
        Self::from_connection(conn)
    }

    /// Open an in-memory replica (for testing).
    pub fn open_in_memory() -> CrrResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| to_storage_err(format!("open in-memory: {e}")))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> CrrResult<Self> {
        apply_pragmas(&conn)?;
        migrations::run_migrations(&conn)?;
        Ok(Self { conn })
    }

    /// The underlying connection, for callers that manage their own schema
    /// DDL or untracked tables.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// This replica's stable site identifier.
    pub fn site_id(&self) -> CrrResult<SiteId> {
        clock_ops::site_id(&self.conn)
    }

    /// The replica's current `db_version` (highest local tick allocated).
    pub fn db_version(&self) -> CrrResult<u64> {
        clock_ops::current_db_version(&self.conn)
    }

    /// Begin tracking a table.
    ///
    /// Validates the schema contract, creates the shadow clock table, and
    /// freezes the descriptor in the registry. Idempotent when the table is
    /// already tracked with an unchanged schema; a changed schema fails with
    /// [`SchemaError::SchemaChanged`].
    #[instrument(skip(self))]
    pub fn track(&self, table: &str) -> CrrResult<()> {
        let live = TableSchema::introspect(&self.conn, table)?;

        if let Some(frozen) = self.frozen_schema(table)? {
            // Already tracked: revalidate, never re-freeze.
            frozen.validate_unchanged(&self.conn)?;
            return Ok(());
        }

        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(|e| to_storage_err(format!("track begin: {e}")))?;
        changelog_ops::create_clock_table(&tx, table)?;
        let schema_json = serde_json::to_string(&live).map_err(|e| {
            StorageError::MetaCorrupt {
                details: format!("encode schema for {table}: {e}"),
            }
        })?;
        tx.execute(
            "INSERT INTO crr_tracked (table_name, schema_json) VALUES (?1, ?2)",
            params![table, schema_json],
        )
        .map_err(|e| to_storage_err(format!("track register: {e}")))?;
        tx.commit()
            .map_err(|e| to_storage_err(format!("track commit: {e}")))?;

        debug!(table, "tracking activated");
        Ok(())
    }

    /// Stop tracking a table: drops its shadow clock table and registry
    /// entry. Row data is left untouched. Idempotent.
    #[instrument(skip(self))]
    pub fn untrack(&self, table: &str) -> CrrResult<()> {
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(|e| to_storage_err(format!("untrack begin: {e}")))?;
        changelog_ops::drop_clock_table(&tx, table)?;
        tx.execute(
            "DELETE FROM crr_tracked WHERE table_name = ?1",
            params![table],
        )
        .map_err(|e| to_storage_err(format!("untrack unregister: {e}")))?;
        tx.commit()
            .map_err(|e| to_storage_err(format!("untrack commit: {e}")))?;
        Ok(())
    }

    /// Names of all tracked tables, in registration order.
    pub fn tracked_tables(&self) -> CrrResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT table_name FROM crr_tracked ORDER BY rowid")
            .map_err(|e| to_storage_err(format!("tracked_tables: {e}")))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| to_storage_err(format!("tracked_tables: {e}")))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(|e| to_storage_err(format!("tracked_tables: {e}")))?);
        }
        Ok(out)
    }

    /// The frozen descriptor of a tracked table, revalidated against the
    /// live schema.
    pub fn schema_of(&self, table: &str) -> CrrResult<TableSchema> {
        let frozen = self.frozen_schema(table)?.ok_or(SchemaError::NotTracked {
            table: table.to_string(),
        })?;
        frozen.validate_unchanged(&self.conn)?;
        Ok(frozen)
    }

    fn frozen_schema(&self, table: &str) -> CrrResult<Option<TableSchema>> {
        let json: Option<String> = self
            .conn
            .query_row(
                "SELECT schema_json FROM crr_tracked WHERE table_name = ?1",
                params![table],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| to_storage_err(format!("frozen_schema: {e}")))?;
        match json {
            None => Ok(None),
            Some(json) => {
                let schema = serde_json::from_str(&json).map_err(|e| {
                    StorageError::MetaCorrupt {
                        details: format!("decode schema for {table}: {e}"),
                    }
                })?;
                Ok(Some(schema))
            }
        }
    }

    /// Run local DML with capture in one transaction: the row mutations and
    /// their change-log bookkeeping commit or roll back together.
    pub fn with_write<T>(
        &self,
        f: impl FnOnce(&mut TrackedWrite<'_>) -> CrrResult<T>,
    ) -> CrrResult<T> {
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(|e| to_storage_err(format!("write begin: {e}")))?;
        let site_id = clock_ops::site_id(&tx)?;
        let mut write = TrackedWrite::new(tx, site_id, self);
        match f(&mut write) {
            Ok(value) => {
                write
                    .into_transaction()
                    .commit()
                    .map_err(|e| to_storage_err(format!("write commit: {e}")))?;
                Ok(value)
            }
            // Dropping the transaction rolls it back.
            Err(e) => Err(e),
        }
    }
}

/// Safety and performance pragmas applied at open.
fn apply_pragmas(conn: &Connection) -> CrrResult<()> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA busy_timeout = 5000;
        PRAGMA foreign_keys = ON;
        ",
    )
    .map_err(|e| to_storage_err(format!("pragmas: {e}")))?;
    Ok(())
}
