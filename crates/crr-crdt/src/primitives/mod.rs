//! CRDT primitives: the cell rank and the per-cell last-writer-wins register.

pub mod cell_register;
pub mod cell_version;

pub use cell_register::CellRegister;
pub use cell_version::CellVersion;
