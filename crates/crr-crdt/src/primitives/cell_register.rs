//! Per-cell last-writer-wins register.
//!
//! Each cell of a tracked row is an independent LWW register ranked by
//! `(col_version, site_id)`. Merge keeps the value with the highest rank;
//! the site id breaks ties, so convergence is deterministic even when two
//! sites write the same version concurrently.

use serde::{Deserialize, Serialize};

use super::cell_version::CellVersion;

/// A last-writer-wins register holding one cell value and the version of
/// the write that currently owns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellRegister<T> {
    value: T,
    version: CellVersion,
}

impl<T: Clone> CellRegister<T> {
    pub fn new(value: T, version: CellVersion) -> Self {
        Self { value, version }
    }

    /// Overwrite only if `version` outranks the current one.
    /// Returns whether the write took effect.
    pub fn set(&mut self, value: T, version: CellVersion) -> bool {
        if version > self.version {
            self.value = value;
            self.version = version;
            true
        } else {
            false
        }
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    pub fn version(&self) -> CellVersion {
        self.version
    }

    /// Merge with another register: keep the higher-ranked write.
    pub fn merge(&mut self, other: &Self) {
        if other.version > self.version {
            self.value = other.value.clone();
            self.version = other.version;
        }
    }
}
