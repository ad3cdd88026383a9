//! Merge engine: the inbound half of the sync protocol.
//!
//! Applies incoming change records with deterministic conflict resolution.
//! Every decision is a pure function of two version tuples (see
//! `crr-crdt::decide`), which makes the merge commutative, associative, and
//! idempotent across any delivery order or duplication.

use std::collections::HashMap;

use rusqlite::Connection;
use tracing::{debug, instrument, warn};

use crr_core::errors::{CrrError, CrrResult, SchemaError};
use crr_core::{
    BatchReport, ChangeRecord, ConflictReason, MergeOutcome, Scalar, SiteId,
};
use crr_crdt::{decide_column, decide_tombstone, CellVersion, MergeDecision};
use crr_storage::queries::{changelog_ops, watermark_ops};
use crr_storage::value::{quote_ident, SqlScalar};
use crr_storage::{to_storage_err, Replica, TableSchema};

/// Stateless orchestrator applying incoming records to a replica.
pub struct MergeEngine;

impl MergeEngine {
    /// Apply one incoming change record inside its own transaction.
    ///
    /// Stale and duplicate records produce `Skipped` — normal control flow.
    /// `Conflict` marks a structurally inapplicable record and is fatal to
    /// that record only. Host-engine failures propagate untouched.
    #[instrument(skip(replica, record), fields(table = %record.table))]
    pub fn apply(replica: &Replica, record: &ChangeRecord) -> CrrResult<MergeOutcome> {
        let tx = replica
            .connection()
            .unchecked_transaction()
            .map_err(|e| to_storage_err(format!("apply begin: {e}")))?;
        let outcome = Self::apply_in_tx(&tx, replica, record)?;
        tx.commit()
            .map_err(|e| to_storage_err(format!("apply commit: {e}")))?;
        Ok(outcome)
    }

    /// Apply a batch of records in order.
    ///
    /// Per-record conflicts never abort the batch; the report enumerates
    /// applied/skipped/conflicted records so the transport can decide what
    /// to do. Afterwards each originating site's watermark is advanced to
    /// the highest `db_version` durably applied — unless that site had a
    /// conflicted record in this batch, in which case its watermark is left
    /// for the caller to advance deliberately.
    #[instrument(skip(replica, records), fields(count = records.len()))]
    pub fn apply_batch(replica: &Replica, records: &[ChangeRecord]) -> CrrResult<BatchReport> {
        let mut report = BatchReport::default();
        let mut high_water: HashMap<SiteId, u64> = HashMap::new();
        let mut conflicted_sites: Vec<SiteId> = Vec::new();

        for (index, record) in records.iter().enumerate() {
            let outcome = Self::apply(replica, record)?;
            if let MergeOutcome::Conflict(reason) = &outcome {
                warn!(
                    table = %record.table,
                    site = %record.site_id,
                    %reason,
                    "structurally inapplicable change record"
                );
                conflicted_sites.push(record.site_id);
            } else {
                let entry = high_water.entry(record.site_id).or_insert(0);
                *entry = (*entry).max(record.db_version);
            }
            report.record(index, &outcome);
        }

        for (site, version) in high_water {
            if conflicted_sites.contains(&site) {
                continue;
            }
            if version > watermark_ops::get(replica.connection(), site)? {
                watermark_ops::advance(replica.connection(), site, version)?;
            }
        }

        debug!(
            applied = report.applied,
            skipped = report.skipped,
            conflicts = report.conflicts.len(),
            "merge batch done"
        );
        Ok(report)
    }

    fn apply_in_tx(
        tx: &Connection,
        replica: &Replica,
        record: &ChangeRecord,
    ) -> CrrResult<MergeOutcome> {
        // Structural checks first: unknown table/column and key-shape
        // mismatches are conflicts, not errors. A schema that drifted from
        // its frozen descriptor is an error and surfaces loudly.
        let schema = match replica.schema_of(&record.table) {
            Ok(schema) => schema,
            Err(CrrError::Schema(SchemaError::NotTracked { table }))
            | Err(CrrError::Schema(SchemaError::NoSuchTable { table })) => {
                return Ok(MergeOutcome::Conflict(ConflictReason::UnknownTable(table)));
            }
            Err(e) => return Err(e),
        };
        if !record.is_tombstone() && schema.value_column(&record.column).is_none() {
            return Ok(MergeOutcome::Conflict(ConflictReason::UnknownColumn(
                record.column.clone(),
            )));
        }
        if record.pk.len() != schema.pk_columns.len() {
            return Ok(MergeOutcome::Conflict(ConflictReason::MalformedPrimaryKey(
                format!(
                    "{} key columns, record carries {}",
                    schema.pk_columns.len(),
                    record.pk.len()
                ),
            )));
        }

        let pk_encoded = record.pk.encode();
        let incoming = CellVersion::new(record.col_version, record.site_id);
        let tombstone_slot =
            changelog_ops::get_tombstone(tx, &record.table, &pk_encoded)?.map(|s| s.version);

        let decision = if record.is_tombstone() {
            decide_tombstone(incoming, tombstone_slot)
        } else {
            let stored = changelog_ops::get_slot(tx, &record.table, &pk_encoded, &record.column)?
                .map(|s| s.version);
            decide_column(incoming, stored, tombstone_slot)
        };

        let MergeDecision::Skip(reason) = decision else {
            return if record.is_tombstone() {
                Self::apply_tombstone(tx, &schema, record, incoming)
            } else {
                Self::apply_column(tx, &schema, record, incoming)
            };
        };
        Ok(MergeOutcome::Skipped(reason))
    }

    /// Write the winning cell into the base row and overwrite the clock
    /// slot with the incoming tuple. Creates the row if the key is absent
    /// (first sight of the row, or revival of a tombstoned one); a base
    /// table constraint rejecting that row surfaces as a `Conflict`, not an
    /// error.
    fn apply_column(
        tx: &Connection,
        schema: &TableSchema,
        record: &ChangeRecord,
        incoming: CellVersion,
    ) -> CrrResult<MergeOutcome> {
        let pk_names: Vec<String> = schema
            .pk_columns
            .iter()
            .map(|c| quote_ident(&c.name))
            .collect();
        let placeholders: Vec<String> = (1..=schema.pk_columns.len())
            .map(|i| format!("?{i}"))
            .collect();
        let value_placeholder = format!("?{}", schema.pk_columns.len() + 1);
        let sql = format!(
            "INSERT INTO {} ({}, {}) VALUES ({}, {})
             ON CONFLICT ({}) DO UPDATE SET {} = excluded.{}",
            quote_ident(&schema.table),
            pk_names.join(", "),
            quote_ident(&record.column),
            placeholders.join(", "),
            value_placeholder,
            pk_names.join(", "),
            quote_ident(&record.column),
            quote_ident(&record.column),
        );
        let null = Scalar::Null;
        let value = record.value.as_ref().unwrap_or(&null);
        let params: Vec<SqlScalar<'_>> = record
            .pk
            .values()
            .iter()
            .chain(std::iter::once(value))
            .map(SqlScalar)
            .collect();
        match tx.execute(&sql, rusqlite::params_from_iter(params)) {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(err, message))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                // The clock slot stays untouched so the record can apply
                // later, once the missing columns have arrived.
                return Ok(MergeOutcome::Conflict(ConflictReason::ConstraintViolation(
                    message.unwrap_or_else(|| err.to_string()),
                )));
            }
            Err(e) => {
                return Err(to_storage_err(format!("merge write {}: {e}", schema.table)));
            }
        }

        changelog_ops::upsert_slot(
            tx,
            &schema.table,
            &record.pk.encode(),
            &record.column,
            incoming,
            record.db_version,
            record.seq,
        )?;
        Ok(MergeOutcome::Applied)
    }

    /// Apply a winning tombstone: clear every column slot it dominates;
    /// columns that outrank it keep the row alive (revived rows), the rest
    /// of the row is removed.
    fn apply_tombstone(
        tx: &Connection,
        schema: &TableSchema,
        record: &ChangeRecord,
        incoming: CellVersion,
    ) -> CrrResult<MergeOutcome> {
        let pk_encoded = record.pk.encode();
        changelog_ops::clear_dominated_columns(tx, &schema.table, &pk_encoded, incoming)?;
        let survivors =
            changelog_ops::surviving_columns(tx, &schema.table, &pk_encoded, incoming)?;

        let pk_where: Vec<String> = schema
            .pk_columns
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{} = ?{}", quote_ident(&c.name), i + 1))
            .collect();
        let params: Vec<SqlScalar<'_>> = record.pk.values().iter().map(SqlScalar).collect();

        if survivors.is_empty() {
            let sql = format!(
                "DELETE FROM {} WHERE {}",
                quote_ident(&schema.table),
                pk_where.join(" AND "),
            );
            tx.execute(&sql, rusqlite::params_from_iter(params))
                .map_err(|e| to_storage_err(format!("merge delete {}: {e}", schema.table)))?;
        } else {
            // Partial dominance: null out the dominated columns, keep the
            // survivors visible.
            let dominated: Vec<&str> = schema
                .value_columns
                .iter()
                .map(|c| c.name.as_str())
                .filter(|c| !survivors.iter().any(|s| s == c))
                .collect();
            if !dominated.is_empty() {
                let assignments: Vec<String> = dominated
                    .iter()
                    .map(|c| format!("{} = NULL", quote_ident(c)))
                    .collect();
                let sql = format!(
                    "UPDATE {} SET {} WHERE {}",
                    quote_ident(&schema.table),
                    assignments.join(", "),
                    pk_where.join(" AND "),
                );
                tx.execute(&sql, rusqlite::params_from_iter(params))
                    .map_err(|e| {
                        to_storage_err(format!("merge partial delete {}: {e}", schema.table))
                    })?;
            }
        }

        changelog_ops::upsert_slot(
            tx,
            &schema.table,
            &pk_encoded,
            crr_core::constants::TOMBSTONE_COLUMN,
            incoming,
            record.db_version,
            record.seq,
        )?;
        Ok(MergeOutcome::Applied)
    }
}
