//! # crr-crdt
//!
//! Pure merge mathematics for replicated relations. No I/O, no SQLite:
//! everything here is a function of version tuples, which is what makes the
//! merge commutative, associative, and idempotent across any delivery order.

pub mod decide;
pub mod primitives;
pub mod row;

pub use decide::{decide_column, decide_tombstone, MergeDecision};
pub use primitives::{CellRegister, CellVersion};
pub use row::RowState;
