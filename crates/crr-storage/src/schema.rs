//! Schema descriptors for tracked tables.
//!
//! The descriptor captured at activation is frozen for the lifetime of the
//! tracking session; every later operation revalidates the live schema
//! against it and fails loudly on divergence rather than corrupting version
//! state.

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crr_core::errors::{CrrResult, SchemaError};

use crate::to_storage_err;

/// One column of a tracked table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    /// Declared type as written in the CREATE TABLE, uppercased.
    pub decl_type: String,
    pub not_null: bool,
}

/// Ordered primary-key columns and ordered non-key columns of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub table: String,
    pub pk_columns: Vec<ColumnDef>,
    pub value_columns: Vec<ColumnDef>,
}

impl TableSchema {
    /// Introspect a table via `PRAGMA table_info`.
    ///
    /// Fails with [`SchemaError`] if the table does not exist, has no
    /// primary key, or has a primary-key column that admits NULL. A single
    /// `INTEGER PRIMARY KEY` column is the rowid alias and is implicitly
    /// NOT NULL even when the pragma reports otherwise.
    pub fn introspect(conn: &Connection, table: &str) -> CrrResult<Self> {
        let mut stmt = conn
            .prepare("SELECT name, type, \"notnull\", pk FROM pragma_table_info(?1) ORDER BY cid")
            .map_err(|e| to_storage_err(format!("table_info: {e}")))?;

        // (pk index, column, notnull)
        let mut pk: Vec<(i64, ColumnDef)> = Vec::new();
        let mut value_columns = Vec::new();

        let rows = stmt
            .query_map([table], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })
            .map_err(|e| to_storage_err(format!("table_info: {e}")))?;

        for row in rows {
            let (name, decl_type, not_null, pk_index) =
                row.map_err(|e| to_storage_err(format!("table_info: {e}")))?;
            let column = ColumnDef {
                name,
                decl_type: decl_type.to_uppercase(),
                not_null: not_null != 0,
            };
            if pk_index > 0 {
                pk.push((pk_index, column));
            } else {
                value_columns.push(column);
            }
        }

        if pk.is_empty() && value_columns.is_empty() {
            return Err(SchemaError::NoSuchTable {
                table: table.to_string(),
            }
            .into());
        }
        if pk.is_empty() {
            return Err(SchemaError::NoPrimaryKey {
                table: table.to_string(),
            }
            .into());
        }

        pk.sort_by_key(|(index, _)| *index);
        let rowid_alias = pk.len() == 1 && pk[0].1.decl_type == "INTEGER";
        if !rowid_alias {
            if let Some((_, column)) = pk.iter().find(|(_, c)| !c.not_null) {
                return Err(SchemaError::NullablePrimaryKey {
                    table: table.to_string(),
                    column: column.name.clone(),
                }
                .into());
            }
        }

        Ok(Self {
            table: table.to_string(),
            pk_columns: pk.into_iter().map(|(_, c)| c).collect(),
            value_columns,
        })
    }

    /// Compare the live schema against this frozen descriptor.
    pub fn validate_unchanged(&self, conn: &Connection) -> CrrResult<()> {
        let live = Self::introspect(conn, &self.table)?;
        if live != *self {
            return Err(SchemaError::SchemaChanged {
                table: self.table.clone(),
                details: format!("tracked {:?}, live {:?}", self, live),
            }
            .into());
        }
        Ok(())
    }

    pub fn value_column(&self, name: &str) -> Option<&ColumnDef> {
        self.value_columns.iter().find(|c| c.name == name)
    }

    pub fn pk_column_names(&self) -> Vec<&str> {
        self.pk_columns.iter().map(|c| c.name.as_str()).collect()
    }
}
