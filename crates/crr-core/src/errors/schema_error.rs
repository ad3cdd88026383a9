/// Reasons a table fails the tracking contract.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("table {table} does not exist")]
    NoSuchTable { table: String },

    #[error("table {table} has no primary key")]
    NoPrimaryKey { table: String },

    #[error("table {table} has nullable primary-key column {column}")]
    NullablePrimaryKey { table: String, column: String },

    #[error("table {table} changed after tracking began: {details}")]
    SchemaChanged { table: String, details: String },

    #[error("table {table} is not tracked")]
    NotTracked { table: String },
}
