//! Scalar ↔ rusqlite value conversions.

use rusqlite::types::{ToSqlOutput, Value, ValueRef};
use rusqlite::ToSql;

use crr_core::Scalar;

/// Wrapper giving [`Scalar`] a `ToSql` implementation without coupling
/// crr-core to rusqlite.
pub struct SqlScalar<'a>(pub &'a Scalar);

impl ToSql for SqlScalar<'_> {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self.0 {
            Scalar::Null => ToSqlOutput::Owned(Value::Null),
            Scalar::Integer(i) => ToSqlOutput::Owned(Value::Integer(*i)),
            Scalar::Real(r) => ToSqlOutput::Owned(Value::Real(*r)),
            Scalar::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Scalar::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
        })
    }
}

/// Read a column value into a [`Scalar`], covering all five storage classes.
pub fn scalar_from_ref(value: ValueRef<'_>) -> Scalar {
    match value {
        ValueRef::Null => Scalar::Null,
        ValueRef::Integer(i) => Scalar::Integer(i),
        ValueRef::Real(r) => Scalar::Real(r),
        ValueRef::Text(s) => Scalar::Text(String::from_utf8_lossy(s).into_owned()),
        ValueRef::Blob(b) => Scalar::Blob(b.to_vec()),
    }
}

/// Quote an identifier for interpolation into dynamically built SQL.
/// Tracked table and column names come from the caller, never from peers
/// without schema validation, but quoting keeps odd names working.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
