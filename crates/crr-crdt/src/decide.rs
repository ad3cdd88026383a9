//! The pure per-record merge decision.
//!
//! Both the SQL-backed merge engine and the in-memory [`RowState`] model go
//! through these two functions, so the decision logic exists exactly once.
//!
//! [`RowState`]: crate::row::RowState

use crr_core::outcome::SkipReason;

use crate::primitives::CellVersion;

/// What to do with one incoming record. Skips carry no effect at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeDecision {
    Apply,
    Skip(SkipReason),
}

impl MergeDecision {
    pub fn is_apply(&self) -> bool {
        matches!(self, MergeDecision::Apply)
    }
}

/// Decide an incoming column write.
///
/// The write must outrank both its own column slot and the row's tombstone
/// slot: a deletion suppresses every column write it outranks, and a write
/// that outranks the deletion revives the row for that column.
pub fn decide_column(
    incoming: CellVersion,
    stored: Option<CellVersion>,
    tombstone: Option<CellVersion>,
) -> MergeDecision {
    if Some(incoming) == stored {
        return MergeDecision::Skip(SkipReason::Duplicate);
    }
    if !incoming.beats(stored.as_ref()) {
        return MergeDecision::Skip(SkipReason::Stale);
    }
    if !incoming.beats(tombstone.as_ref()) {
        return MergeDecision::Skip(SkipReason::DeletedAtHigherVersion);
    }
    MergeDecision::Apply
}

/// Decide an incoming tombstone. Compared against the tombstone slot only;
/// applying it clears every column slot it outranks.
pub fn decide_tombstone(
    incoming: CellVersion,
    stored_tombstone: Option<CellVersion>,
) -> MergeDecision {
    if Some(incoming) == stored_tombstone {
        return MergeDecision::Skip(SkipReason::Duplicate);
    }
    if !incoming.beats(stored_tombstone.as_ref()) {
        return MergeDecision::Skip(SkipReason::Stale);
    }
    MergeDecision::Apply
}
