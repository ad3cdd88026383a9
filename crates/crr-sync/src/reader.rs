//! Changes reader: the outbound half of the sync protocol.

use rusqlite::OptionalExtension;
use tracing::{instrument, warn};

use crr_core::errors::{CrrResult, StorageError};
use crr_core::{ChangeRecord, PrimaryKey, SiteId};
use crr_storage::queries::changelog_ops;
use crr_storage::value::{quote_ident, scalar_from_ref, SqlScalar};
use crr_storage::Replica;

/// All committed change records with `db_version > since_db_version`,
/// ordered by `(db_version, seq)` ascending, across every tracked table.
///
/// `exclude_site` omits records originated by that site, so a transport can
/// avoid echoing a peer's own changes back to it. Restartable: the same
/// watermark yields the same sequence. Column values are read from the live
/// row at call time; tombstones carry no value.
#[instrument(skip(replica))]
pub fn read_changes(
    replica: &Replica,
    since_db_version: u64,
    exclude_site: Option<SiteId>,
) -> CrrResult<Vec<ChangeRecord>> {
    let conn = replica.connection();
    let mut records = Vec::new();

    for table in replica.tracked_tables()? {
        let schema = replica.schema_of(&table)?;
        for row in changelog_ops::rows_since(conn, &table, since_db_version, exclude_site)? {
            let pk = PrimaryKey::decode(&row.pk_encoded).map_err(|e| {
                StorageError::MetaCorrupt {
                    details: format!("clock pk {} in {table}: {e}", row.pk_encoded),
                }
            })?;

            let is_tombstone = row.column == crr_core::constants::TOMBSTONE_COLUMN;
            let value = if is_tombstone {
                None
            } else {
                let pk_where: Vec<String> = schema
                    .pk_columns
                    .iter()
                    .enumerate()
                    .map(|(i, c)| format!("{} = ?{}", quote_ident(&c.name), i + 1))
                    .collect();
                let sql = format!(
                    "SELECT {} FROM {} WHERE {}",
                    quote_ident(&row.column),
                    quote_ident(&table),
                    pk_where.join(" AND "),
                );
                let params: Vec<SqlScalar<'_>> = pk.values().iter().map(SqlScalar).collect();
                let value = conn
                    .query_row(&sql, rusqlite::params_from_iter(params), |r| {
                        r.get_ref(0).map(scalar_from_ref)
                    })
                    .optional()
                    .map_err(|e| {
                        crr_storage::to_storage_err(format!("read value {table}: {e}"))
                    })?;
                match value {
                    Some(value) => Some(value),
                    None => {
                        // Clock entry without a live base row: only possible
                        // when untracked DML bypassed capture. Surface it to
                        // the operator and drop the record.
                        warn!(table = %table, pk = %row.pk_encoded, column = %row.column,
                              "clock entry has no live row; skipping");
                        continue;
                    }
                }
            };

            records.push(ChangeRecord {
                table: table.clone(),
                pk,
                column: row.column,
                value,
                col_version: row.col_version,
                db_version: row.db_version,
                site_id: row.site_id,
                seq: row.seq,
            });
        }
    }

    // (db_version, seq) is the contract; the remaining keys make ordering
    // total and therefore restartable. The pk encoding is precomputed once
    // per record rather than per comparison.
    let mut keyed: Vec<(String, ChangeRecord)> = records
        .into_iter()
        .map(|r| (r.pk.encode(), r))
        .collect();
    keyed.sort_by(|(a_pk, a), (b_pk, b)| {
        (a.db_version, a.seq, a.site_id, a.table.as_str(), a_pk.as_str(), a.column.as_str())
            .cmp(&(b.db_version, b.seq, b.site_id, b.table.as_str(), b_pk.as_str(), b.column.as_str()))
    });
    Ok(keyed.into_iter().map(|(_, r)| r).collect())
}
