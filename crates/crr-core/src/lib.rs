//! # crr-core
//!
//! Foundation crate for the crr replication system.
//! Defines the change-record wire types, site identifiers, scalar values,
//! merge outcomes, errors, and constants. Every other crate in the
//! workspace depends on this.

pub mod constants;
pub mod errors;
pub mod outcome;
pub mod record;
pub mod scalar;
pub mod site;
pub mod traits;

// Re-export the most commonly used types at the crate root.
pub use errors::{CrrError, CrrResult};
pub use outcome::{BatchReport, ConflictReason, MergeOutcome, SkipReason};
pub use record::{ChangeRecord, PrimaryKey};
pub use scalar::Scalar;
pub use site::SiteId;
pub use traits::{IRowMutationHook, RowValues};
