//! Error taxonomy for the crr workspace.
//!
//! Version-comparison "losses" (stale or duplicate records) are normal
//! control flow and never raised as errors; only structural impossibilities
//! and invariant violations appear here.

pub mod schema_error;
pub mod storage_error;

pub use schema_error::SchemaError;
pub use storage_error::StorageError;

/// Result alias used across the workspace.
pub type CrrResult<T> = Result<T, CrrError>;

/// Top-level error for all crr operations.
#[derive(Debug, thiserror::Error)]
pub enum CrrError {
    /// A table cannot be tracked or no longer matches its frozen descriptor.
    /// Fatal to the activation call or the operation that detected it.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// A peer watermark was asked to move backwards. Signals an upstream
    /// transport or replay bug; the stored watermark is left unchanged.
    #[error("watermark regression for peer {peer}: stored {stored}, attempted {attempted}")]
    WatermarkRegression {
        peer: String,
        stored: u64,
        attempted: u64,
    },

    /// A single change record is structurally inapplicable.
    #[error("change record inapplicable: {reason}")]
    Apply { reason: String },

    /// Host-engine failure, propagated untouched.
    #[error(transparent)]
    Storage(#[from] StorageError),
}
