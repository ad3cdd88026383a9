//! Capture semantics: version allocation for insert, update, and delete.

use crr_core::constants::TOMBSTONE_COLUMN;
use crr_core::{PrimaryKey, RowValues, Scalar};
use crr_storage::Replica;

fn todos_replica() -> Replica {
    let replica = Replica::open_in_memory().unwrap();
    replica
        .connection()
        .execute_batch("CREATE TABLE todos (id INTEGER PRIMARY KEY, title TEXT, done INTEGER);")
        .unwrap();
    replica.track("todos").unwrap();
    replica
}

fn row(pairs: &[(&str, Scalar)]) -> RowValues {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[test]
fn insert_emits_col_version_one_per_provided_column() {
    let replica = todos_replica();
    let records = replica
        .with_write(|w| {
            w.insert(
                "todos",
                &row(&[
                    ("id", 1.into()),
                    ("title", "walk the dog".into()),
                    ("done", 0.into()),
                ]),
            )
        })
        .unwrap();

    assert_eq!(records.len(), 2);
    for record in &records {
        assert_eq!(record.col_version, 1);
        assert_eq!(record.db_version, 1);
    }
    let seqs: Vec<u64> = records.iter().map(|r| r.seq).collect();
    assert_eq!(seqs, vec![0, 1]);
}

#[test]
fn update_bumps_only_changed_columns() {
    let replica = todos_replica();
    replica
        .with_write(|w| {
            w.insert(
                "todos",
                &row(&[("id", 1.into()), ("title", "a".into()), ("done", 0.into())]),
            )
        })
        .unwrap();

    let records = replica
        .with_write(|w| {
            w.update(
                "todos",
                &row(&[("id", 1.into()), ("title", "b".into()), ("done", 0.into())]),
            )
        })
        .unwrap();

    // `done` was written with an identical value: no record, no bump.
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].column, "title");
    assert_eq!(records[0].col_version, 2);
    assert_eq!(records[0].db_version, 2);
}

#[test]
fn no_op_update_burns_no_version_space() {
    let replica = todos_replica();
    replica
        .with_write(|w| {
            w.insert("todos", &row(&[("id", 1.into()), ("title", "a".into())]))
        })
        .unwrap();
    let before = replica.db_version().unwrap();

    let records = replica
        .with_write(|w| {
            w.update("todos", &row(&[("id", 1.into()), ("title", "a".into())]))
        })
        .unwrap();

    assert!(records.is_empty());
    assert_eq!(replica.db_version().unwrap(), before);
}

#[test]
fn delete_emits_tombstone_above_every_column_version() {
    let replica = todos_replica();
    replica
        .with_write(|w| {
            w.insert("todos", &row(&[("id", 1.into()), ("title", "a".into())]))
        })
        .unwrap();
    replica
        .with_write(|w| {
            w.update("todos", &row(&[("id", 1.into()), ("title", "b".into())]))
        })
        .unwrap();

    let records = replica
        .with_write(|w| w.delete("todos", &PrimaryKey::new(vec![1.into()])))
        .unwrap();

    assert_eq!(records.len(), 1);
    let tombstone = &records[0];
    assert!(tombstone.is_tombstone());
    assert_eq!(tombstone.column, TOMBSTONE_COLUMN);
    // title was at col_version 2; the delete dominates it.
    assert_eq!(tombstone.col_version, 3);
    assert!(tombstone.value.is_none());

    let live: i64 = replica
        .connection()
        .query_row("SELECT COUNT(*) FROM todos WHERE id = 1", [], |r| r.get(0))
        .unwrap();
    assert_eq!(live, 0);
}

#[test]
fn reinsert_after_delete_dominates_the_tombstone() {
    let replica = todos_replica();
    replica
        .with_write(|w| {
            w.insert("todos", &row(&[("id", 1.into()), ("title", "a".into())]))
        })
        .unwrap();
    replica
        .with_write(|w| w.delete("todos", &PrimaryKey::new(vec![1.into()])))
        .unwrap();

    let records = replica
        .with_write(|w| {
            w.insert("todos", &row(&[("id", 1.into()), ("title", "again".into())]))
        })
        .unwrap();

    // Tombstone was at col_version 2; the re-insert must outrank it so the
    // un-delete propagates.
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].col_version, 3);

    // The tombstone slot keeps its rank. Peers that synced the delete hold
    // the same slot; dropping it here would make the replicas disagree on
    // how later stale records rank against the deletion.
    let tombstone_version: i64 = replica
        .connection()
        .query_row(
            "SELECT col_version FROM todos__crr_clock WHERE col_name = ?1",
            [TOMBSTONE_COLUMN],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(tombstone_version, 2);
}

#[test]
fn one_transaction_shares_one_db_version_across_rows() {
    let replica = todos_replica();
    let records = replica
        .with_write(|w| {
            let mut all = w.insert("todos", &row(&[("id", 1.into()), ("title", "a".into())]))?;
            all.extend(w.insert("todos", &row(&[("id", 2.into()), ("title", "b".into())]))?);
            Ok(all)
        })
        .unwrap();

    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.db_version == 1));
    assert_eq!(
        records.iter().map(|r| r.seq).collect::<Vec<_>>(),
        vec![0, 1]
    );
    assert_eq!(replica.db_version().unwrap(), 1);
}

#[test]
fn failed_write_rolls_back_rows_and_bookkeeping_together() {
    let replica = todos_replica();
    let result: Result<(), _> = replica.with_write(|w| {
        w.insert("todos", &row(&[("id", 1.into()), ("title", "a".into())]))?;
        // Second insert violates the primary key and poisons the whole
        // transaction.
        w.insert("todos", &row(&[("id", 1.into()), ("title", "dup".into())]))?;
        Ok(())
    });
    assert!(result.is_err());

    let rows: i64 = replica
        .connection()
        .query_row("SELECT COUNT(*) FROM todos", [], |r| r.get(0))
        .unwrap();
    let clock_rows: i64 = replica
        .connection()
        .query_row("SELECT COUNT(*) FROM todos__crr_clock", [], |r| r.get(0))
        .unwrap();
    assert_eq!(rows, 0);
    assert_eq!(clock_rows, 0);
    assert_eq!(replica.db_version().unwrap(), 0);
}
