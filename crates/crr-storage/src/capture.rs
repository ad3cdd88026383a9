//! Capture: translating local DML on tracked tables into change records.
//!
//! The trigger mechanism is an explicit synchronous hook, not a SQL
//! trigger: [`TrackedWrite`] performs the row DML and then invokes its own
//! [`IRowMutationHook`] implementation, which derives the minimal record set
//! and persists it into the shadow clock table — all inside one host
//! transaction, so row storage and version state can never diverge on crash.

use rusqlite::Transaction;
use tracing::debug;

use crr_core::errors::CrrResult;
use crr_core::{ChangeRecord, CrrError, IRowMutationHook, PrimaryKey, RowValues, Scalar, SiteId};
use crr_core::constants::TOMBSTONE_COLUMN;
use crr_crdt::CellVersion;

use crate::queries::{changelog_ops, clock_ops};
use crate::replica::Replica;
use crate::schema::TableSchema;
use crate::to_storage_err;
use crate::value::{quote_ident, scalar_from_ref, SqlScalar};

/// One local write transaction against tracked tables.
///
/// The `db_version` tick is allocated lazily on the first captured change,
/// so transactions that touch nothing burn no version space. `seq` starts
/// at 0 and increments per emitted record across the whole transaction.
pub struct TrackedWrite<'a> {
    tx: Transaction<'a>,
    site_id: SiteId,
    replica: &'a Replica,
    db_version: Option<u64>,
    seq: u64,
}

impl<'a> TrackedWrite<'a> {
    pub(crate) fn new(tx: Transaction<'a>, site_id: SiteId, replica: &'a Replica) -> Self {
        Self {
            tx,
            site_id,
            replica,
            db_version: None,
            seq: 0,
        }
    }

    pub(crate) fn into_transaction(self) -> Transaction<'a> {
        self.tx
    }

    /// Insert a row. `row` must carry every primary-key column; value
    /// columns left out keep their SQL defaults and emit no records.
    ///
    /// An insert carrying only key columns therefore emits nothing and the
    /// row stays invisible to peers until a later update writes a value
    /// column. Provide at least one value column for rows that must
    /// replicate on insert.
    pub fn insert(&mut self, table: &str, row: &RowValues) -> CrrResult<Vec<ChangeRecord>> {
        let schema = self.replica.schema_of(table)?;
        self.check_columns(&schema, row)?;

        let columns: Vec<&str> = row.keys().map(String::as_str).collect();
        let placeholders: Vec<String> =
            (1..=columns.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(table),
            columns.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", "),
            placeholders.join(", "),
        );
        let params: Vec<SqlScalar<'_>> = row.values().map(SqlScalar).collect();
        self.tx
            .execute(&sql, rusqlite::params_from_iter(params))
            .map_err(|e| to_storage_err(format!("insert into {table}: {e}")))?;

        self.on_row_mutation(table, None, Some(row))
    }

    /// Update a row in place. `row` carries the primary-key columns plus
    /// the columns to set; columns whose value did not actually change are
    /// neither written nor version-bumped.
    pub fn update(&mut self, table: &str, row: &RowValues) -> CrrResult<Vec<ChangeRecord>> {
        let schema = self.replica.schema_of(table)?;
        self.check_columns(&schema, row)?;
        let pk = extract_pk(&schema, row)?;

        let old_row = self.read_row(&schema, &pk)?.ok_or_else(|| CrrError::Apply {
            reason: format!("update of missing row in {table} (pk {})", pk.encode()),
        })?;

        // Full new image: old values overlaid with the provided columns.
        let mut new_row = old_row.clone();
        for (column, value) in row {
            new_row.insert(column.clone(), value.clone());
        }

        let changed: Vec<&str> = schema
            .value_columns
            .iter()
            .map(|c| c.name.as_str())
            .filter(|c| old_row.get(*c) != new_row.get(*c))
            .collect();
        if changed.is_empty() {
            return Ok(Vec::new());
        }

        let assignments: Vec<String> = changed
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{} = ?{}", quote_ident(c), i + 1))
            .collect();
        let mut params: Vec<SqlScalar<'_>> = changed
            .iter()
            .map(|c| SqlScalar(new_row.get(*c).unwrap_or(&Scalar::Null)))
            .collect();
        let where_clause = pk_where_clause(&schema, params.len());
        for value in pk.values() {
            params.push(SqlScalar(value));
        }
        let sql = format!(
            "UPDATE {} SET {} WHERE {}",
            quote_ident(table),
            assignments.join(", "),
            where_clause,
        );
        self.tx
            .execute(&sql, rusqlite::params_from_iter(params))
            .map_err(|e| to_storage_err(format!("update {table}: {e}")))?;

        self.on_row_mutation(table, Some(&old_row), Some(&new_row))
    }

    /// Delete a row, emitting a single tombstone record versioned above
    /// every column write this replica has observed for the row.
    pub fn delete(&mut self, table: &str, pk: &PrimaryKey) -> CrrResult<Vec<ChangeRecord>> {
        let schema = self.replica.schema_of(table)?;
        let old_row = self.read_row(&schema, pk)?.ok_or_else(|| CrrError::Apply {
            reason: format!("delete of missing row in {table} (pk {})", pk.encode()),
        })?;

        let mut params: Vec<SqlScalar<'_>> = Vec::new();
        let where_clause = pk_where_clause(&schema, 0);
        for value in pk.values() {
            params.push(SqlScalar(value));
        }
        let sql = format!("DELETE FROM {} WHERE {}", quote_ident(table), where_clause);
        self.tx
            .execute(&sql, rusqlite::params_from_iter(params))
            .map_err(|e| to_storage_err(format!("delete from {table}: {e}")))?;

        self.on_row_mutation(table, Some(&old_row), None)
    }

    /// The `db_version` tick shared by every record of this transaction.
    fn tick(&mut self) -> CrrResult<u64> {
        if let Some(version) = self.db_version {
            return Ok(version);
        }
        let version = clock_ops::next_db_version(&self.tx)?;
        self.db_version = Some(version);
        Ok(version)
    }

    fn next_seq(&mut self) -> u64 {
        let seq = self.seq;
        self.seq += 1;
        seq
    }

    /// Reject columns the frozen schema does not know about.
    fn check_columns(&self, schema: &TableSchema, row: &RowValues) -> CrrResult<()> {
        for column in row.keys() {
            let known = schema.value_column(column).is_some()
                || schema.pk_columns.iter().any(|c| &c.name == column);
            if !known {
                return Err(CrrError::Apply {
                    reason: format!("unknown column {column} in {}", schema.table),
                });
            }
        }
        Ok(())
    }

    /// Current full image of a row, pk columns included.
    fn read_row(&self, schema: &TableSchema, pk: &PrimaryKey) -> CrrResult<Option<RowValues>> {
        let all: Vec<&str> = schema
            .pk_columns
            .iter()
            .chain(schema.value_columns.iter())
            .map(|c| c.name.as_str())
            .collect();
        let sql = format!(
            "SELECT {} FROM {} WHERE {}",
            all.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", "),
            quote_ident(&schema.table),
            pk_where_clause(schema, 0),
        );
        let params: Vec<SqlScalar<'_>> = pk.values().iter().map(SqlScalar).collect();
        let mut stmt = self
            .tx
            .prepare(&sql)
            .map_err(|e| to_storage_err(format!("read row {}: {e}", schema.table)))?;
        let mut rows = stmt
            .query(rusqlite::params_from_iter(params))
            .map_err(|e| to_storage_err(format!("read row {}: {e}", schema.table)))?;
        let row = rows
            .next()
            .map_err(|e| to_storage_err(format!("read row {}: {e}", schema.table)))?;
        match row {
            None => Ok(None),
            Some(row) => {
                let mut values = RowValues::new();
                for (i, name) in all.iter().enumerate() {
                    let value = row
                        .get_ref(i)
                        .map_err(|e| to_storage_err(format!("read row {}: {e}", schema.table)))?;
                    values.insert((*name).to_string(), scalar_from_ref(value));
                }
                Ok(Some(values))
            }
        }
    }

    /// Next version for a cell about to be written locally: at least 1,
    /// above the cell's stored version, and above the row tombstone so that
    /// a re-insert causally dominates the deletion it undoes.
    fn next_col_version(
        &self,
        table: &str,
        pk_encoded: &str,
        column: &str,
        tombstone: Option<CellVersion>,
    ) -> CrrResult<u64> {
        let stored = changelog_ops::get_slot(&self.tx, table, pk_encoded, column)?
            .map(|slot| slot.version.col_version)
            .unwrap_or(0);
        let dominated = tombstone.map(|t| t.col_version).unwrap_or(0);
        Ok(stored.max(dominated) + 1)
    }
}

impl IRowMutationHook for TrackedWrite<'_> {
    fn on_row_mutation(
        &mut self,
        table: &str,
        old_row: Option<&RowValues>,
        new_row: Option<&RowValues>,
    ) -> CrrResult<Vec<ChangeRecord>> {
        let schema = self.replica.schema_of(table)?;
        let image = new_row.or(old_row).ok_or_else(|| CrrError::Apply {
            reason: "row mutation with neither old nor new image".to_string(),
        })?;
        let pk = extract_pk(&schema, image)?;
        let pk_encoded = pk.encode();
        let site_id = self.site_id;

        let mut records = Vec::new();
        match (old_row, new_row) {
            // Delete: one tombstone above everything this site has observed.
            (Some(_), None) => {
                let db_version = self.tick()?;
                let seq = self.next_seq();
                let max = changelog_ops::max_col_version(&self.tx, table, &pk_encoded)?;
                let version = CellVersion::new(max + 1, site_id);
                changelog_ops::clear_all_columns(&self.tx, table, &pk_encoded)?;
                changelog_ops::upsert_slot(
                    &self.tx,
                    table,
                    &pk_encoded,
                    TOMBSTONE_COLUMN,
                    version,
                    db_version,
                    seq,
                )?;
                records.push(ChangeRecord {
                    table: table.to_string(),
                    pk: pk.clone(),
                    column: TOMBSTONE_COLUMN.to_string(),
                    value: None,
                    col_version: version.col_version,
                    db_version,
                    site_id,
                    seq,
                });
            }
            // Insert or update: one record per written/changed column.
            (old, Some(new)) => {
                let tombstone = changelog_ops::get_tombstone(&self.tx, table, &pk_encoded)?
                    .map(|slot| slot.version);
                for column in &schema.value_columns {
                    let Some(value) = new.get(&column.name) else {
                        continue;
                    };
                    if let Some(old) = old {
                        if old.get(&column.name) == Some(value) {
                            // Unchanged columns are never bumped: bumping
                            // them would manufacture conflicts on merge.
                            continue;
                        }
                    }
                    let db_version = self.tick()?;
                    let col_version =
                        self.next_col_version(table, &pk_encoded, &column.name, tombstone)?;
                    let seq = self.next_seq();
                    changelog_ops::upsert_slot(
                        &self.tx,
                        table,
                        &pk_encoded,
                        &column.name,
                        CellVersion::new(col_version, site_id),
                        db_version,
                        seq,
                    )?;
                    records.push(ChangeRecord {
                        table: table.to_string(),
                        pk: pk.clone(),
                        column: column.name.clone(),
                        value: Some(value.clone()),
                        col_version,
                        db_version,
                        site_id,
                        seq,
                    });
                }
                // A re-insert leaves the tombstone slot in place: the new
                // column versions dominate it, and erasing it here would let
                // this replica and a peer that synced the delete disagree on
                // the tombstone's rank.
            }
            (None, None) => unreachable!("checked above"),
        }

        debug!(
            table,
            pk = %pk_encoded,
            count = records.len(),
            "captured row mutation"
        );
        Ok(records)
    }
}

/// Pull the ordered primary-key scalars out of a row image.
fn extract_pk(schema: &TableSchema, row: &RowValues) -> CrrResult<PrimaryKey> {
    let mut values = Vec::with_capacity(schema.pk_columns.len());
    for column in &schema.pk_columns {
        let value = row.get(&column.name).ok_or_else(|| CrrError::Apply {
            reason: format!(
                "missing primary-key column {} for {}",
                column.name, schema.table
            ),
        })?;
        values.push(value.clone());
    }
    Ok(PrimaryKey::new(values))
}

/// `"pk1" = ?N AND "pk2" = ?N+1 ...` with placeholders offset past any
/// already-bound parameters.
fn pk_where_clause(schema: &TableSchema, offset: usize) -> String {
    schema
        .pk_columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{} = ?{}", quote_ident(&c.name), offset + i + 1))
        .collect::<Vec<_>>()
        .join(" AND ")
}
