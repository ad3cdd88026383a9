//! Merge outcomes and batch reporting.

use serde::{Deserialize, Serialize};

/// Why a record was skipped. Skips are normal control flow, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    /// Identical `(col_version, site_id)` already stored — duplicate delivery.
    Duplicate,
    /// Incoming rank is below the stored rank — genuinely stale data.
    Stale,
    /// The target row is tombstoned at a rank the incoming write does not beat.
    DeletedAtHigherVersion,
}

/// Why a record is structurally inapplicable. Fatal to that record only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictReason {
    /// The target table is not tracked on this replica.
    UnknownTable(String),
    /// The target column does not exist in the current schema.
    UnknownColumn(String),
    /// The primary key does not match the table's key shape.
    MalformedPrimaryKey(String),
    /// The base table rejected the write (e.g. a NOT NULL column the row
    /// has no value for yet).
    ConstraintViolation(String),
}

impl std::fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictReason::UnknownTable(t) => write!(f, "unknown table {t}"),
            ConflictReason::UnknownColumn(c) => write!(f, "unknown column {c}"),
            ConflictReason::MalformedPrimaryKey(d) => write!(f, "malformed primary key: {d}"),
            ConflictReason::ConstraintViolation(d) => write!(f, "constraint violation: {d}"),
        }
    }
}

/// Result of applying one change record.
///
/// Equal `col_version` with a different `site_id` is a concurrent write
/// resolved deterministically by the site tie-break; it surfaces as
/// `Applied` or `Skipped`, never as `Conflict`. `Conflict` is reserved for
/// structural impossibilities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MergeOutcome {
    Applied,
    Skipped(SkipReason),
    Conflict(ConflictReason),
}

/// Partial-success report for a merge batch.
///
/// The transport layer uses this to decide whether to retry records or
/// advance its own bookkeeping regardless.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Count of records applied.
    pub applied: usize,
    /// Count of records skipped as stale or duplicate.
    pub skipped: usize,
    /// Structurally inapplicable records: (index in batch, reason).
    pub conflicts: Vec<(usize, ConflictReason)>,
}

impl BatchReport {
    pub fn record(&mut self, index: usize, outcome: &MergeOutcome) {
        match outcome {
            MergeOutcome::Applied => self.applied += 1,
            MergeOutcome::Skipped(_) => self.skipped += 1,
            MergeOutcome::Conflict(reason) => self.conflicts.push((index, reason.clone())),
        }
    }

    pub fn total(&self) -> usize {
        self.applied + self.skipped + self.conflicts.len()
    }
}
