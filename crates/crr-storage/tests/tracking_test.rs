//! Tracking activation: schema contract enforcement and idempotence.

use crr_core::errors::{CrrError, SchemaError};
use crr_storage::Replica;

fn replica_with(ddl: &str) -> Replica {
    let replica = Replica::open_in_memory().unwrap();
    replica.connection().execute_batch(ddl).unwrap();
    replica
}

#[test]
fn track_creates_clock_table_and_registry_entry() {
    let replica = replica_with(
        "CREATE TABLE todos (id INTEGER PRIMARY KEY, title TEXT, done INTEGER);",
    );
    replica.track("todos").unwrap();

    assert_eq!(replica.tracked_tables().unwrap(), vec!["todos".to_string()]);
    let clock_exists: i64 = replica
        .connection()
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'todos__crr_clock'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(clock_exists, 1);
}

#[test]
fn track_is_idempotent() {
    let replica = replica_with("CREATE TABLE todos (id INTEGER PRIMARY KEY, title TEXT);");
    replica.track("todos").unwrap();
    replica.track("todos").unwrap();
    assert_eq!(replica.tracked_tables().unwrap().len(), 1);
}

#[test]
fn track_rejects_missing_table() {
    let replica = Replica::open_in_memory().unwrap();
    let err = replica.track("nope").unwrap_err();
    assert!(matches!(
        err,
        CrrError::Schema(SchemaError::NoSuchTable { .. })
    ));
}

#[test]
fn track_rejects_table_without_primary_key() {
    let replica = replica_with("CREATE TABLE log (message TEXT);");
    let err = replica.track("log").unwrap_err();
    assert!(matches!(
        err,
        CrrError::Schema(SchemaError::NoPrimaryKey { .. })
    ));
}

#[test]
fn track_rejects_nullable_primary_key_column() {
    // Composite text key without NOT NULL: SQLite admits NULLs here.
    let replica = replica_with(
        "CREATE TABLE pairs (a TEXT, b TEXT NOT NULL, v INTEGER, PRIMARY KEY (a, b));",
    );
    let err = replica.track("pairs").unwrap_err();
    assert!(matches!(
        err,
        CrrError::Schema(SchemaError::NullablePrimaryKey { .. })
    ));
}

#[test]
fn integer_primary_key_rowid_alias_is_accepted() {
    // `id INTEGER PRIMARY KEY` reports notnull = 0 but is implicitly NOT NULL.
    let replica = replica_with("CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT);");
    replica.track("t").unwrap();
}

#[test]
fn composite_not_null_primary_key_is_accepted() {
    let replica = replica_with(
        "CREATE TABLE pairs (a TEXT NOT NULL, b TEXT NOT NULL, v INTEGER, PRIMARY KEY (a, b));",
    );
    replica.track("pairs").unwrap();
}

#[test]
fn schema_change_after_tracking_fails_loudly() {
    let replica = replica_with("CREATE TABLE todos (id INTEGER PRIMARY KEY, title TEXT);");
    replica.track("todos").unwrap();

    replica
        .connection()
        .execute_batch("ALTER TABLE todos ADD COLUMN done INTEGER;")
        .unwrap();

    let err = replica.schema_of("todos").unwrap_err();
    assert!(matches!(
        err,
        CrrError::Schema(SchemaError::SchemaChanged { .. })
    ));
    // Re-activation must not silently re-freeze the new shape either.
    let err = replica.track("todos").unwrap_err();
    assert!(matches!(
        err,
        CrrError::Schema(SchemaError::SchemaChanged { .. })
    ));
}

#[test]
fn untrack_drops_shadow_state_and_is_idempotent() {
    let replica = replica_with("CREATE TABLE todos (id INTEGER PRIMARY KEY, title TEXT);");
    replica.track("todos").unwrap();
    replica.untrack("todos").unwrap();
    replica.untrack("todos").unwrap();

    assert!(replica.tracked_tables().unwrap().is_empty());
    let clock_exists: i64 = replica
        .connection()
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'todos__crr_clock'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(clock_exists, 0);
}

#[test]
fn schema_of_unknown_table_is_not_tracked() {
    let replica = Replica::open_in_memory().unwrap();
    let err = replica.schema_of("ghost").unwrap_err();
    assert!(matches!(
        err,
        CrrError::Schema(SchemaError::NotTracked { .. })
    ));
}
