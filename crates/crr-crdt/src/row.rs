//! In-memory row version state.
//!
//! The reference model of one replicated row: a map of per-column LWW
//! registers plus the row-level tombstone slot. The SQL-backed engine keeps
//! the same state spread across a base table and its shadow clock table;
//! this model keeps it in one struct, which makes convergence properties
//! directly testable.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crr_core::Scalar;

use crate::decide::{decide_column, decide_tombstone, MergeDecision};
use crate::primitives::{CellRegister, CellVersion};

/// Versioned state of a single row: per-column registers + tombstone slot.
///
/// Created on first tracked write and never discarded; deletion tombstones
/// the state instead of erasing it, so concurrent operations against a
/// deleted row still merge deterministically.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowState {
    cells: BTreeMap<String, CellRegister<Scalar>>,
    tombstone: Option<CellVersion>,
}

impl RowState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one column write. On success the cell takes the incoming value
    /// and version; a write outranking the tombstone revives the row for
    /// that column.
    pub fn apply_column(
        &mut self,
        column: &str,
        value: Scalar,
        version: CellVersion,
    ) -> MergeDecision {
        let stored = self.cells.get(column).map(|c| c.version());
        let decision = decide_column(version, stored, self.tombstone);
        if decision.is_apply() {
            self.cells
                .insert(column.to_string(), CellRegister::new(value, version));
        }
        decision
    }

    /// Apply one tombstone. On success every column slot the tombstone
    /// outranks is cleared; higher-ranked columns survive and keep the row
    /// visible.
    pub fn apply_tombstone(&mut self, version: CellVersion) -> MergeDecision {
        let decision = decide_tombstone(version, self.tombstone);
        if decision.is_apply() {
            self.tombstone = Some(version);
            self.cells.retain(|_, cell| cell.version() > version);
        }
        decision
    }

    /// Whether the row is logically present.
    pub fn is_visible(&self) -> bool {
        !self.cells.is_empty() || self.tombstone.is_none()
    }

    /// Current value of a live column.
    pub fn value(&self, column: &str) -> Option<&Scalar> {
        self.cells.get(column).map(|c| c.get())
    }

    /// Stored version of a column slot.
    pub fn cell_version(&self, column: &str) -> Option<CellVersion> {
        self.cells.get(column).map(|c| c.version())
    }

    pub fn tombstone(&self) -> Option<CellVersion> {
        self.tombstone
    }

    /// Live columns in deterministic order.
    pub fn live_columns(&self) -> impl Iterator<Item = (&str, &Scalar)> {
        self.cells.iter().map(|(name, cell)| (name.as_str(), cell.get()))
    }

    /// Highest `col_version` across every slot of this row, tombstone
    /// included. A local delete must version itself above this.
    pub fn max_col_version(&self) -> u64 {
        let cells = self
            .cells
            .values()
            .map(|c| c.version().col_version)
            .max()
            .unwrap_or(0);
        cells.max(self.tombstone.map(|t| t.col_version).unwrap_or(0))
    }
}
