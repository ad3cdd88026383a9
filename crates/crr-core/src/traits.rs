//! Seam traits between the row-storage layer and the capture engine.

use std::collections::BTreeMap;

use crate::errors::CrrResult;
use crate::record::ChangeRecord;
use crate::scalar::Scalar;

/// A row image: column name → value, deterministically ordered.
pub type RowValues = BTreeMap<String, Scalar>;

/// Synchronous capture hook invoked by the row-storage layer on every local
/// mutation of a tracked table, inside the mutating transaction.
///
/// `old_row` is `None` for inserts, `new_row` is `None` for deletes; updates
/// carry both. The returned records must be persisted in the same
/// transaction as the row mutation, so the two can never diverge on crash.
/// Implementors hold the live transaction, so the trait is single-threaded
/// by construction.
pub trait IRowMutationHook {
    fn on_row_mutation(
        &mut self,
        table: &str,
        old_row: Option<&RowValues>,
        new_row: Option<&RowValues>,
    ) -> CrrResult<Vec<ChangeRecord>>;
}
