//! The `(col_version, site_id)` rank driving all conflict resolution.

use serde::{Deserialize, Serialize};

use crr_core::SiteId;

/// Version tuple of one write to one cell (or to a row's tombstone slot).
///
/// The derived `Ord` is lexicographic: `col_version` first, site id bytes as
/// the tie-break. Two sites writing the same `col_version` concurrently are
/// therefore resolved deterministically on every replica. This ordering is
/// the convergence contract and must never change.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct CellVersion {
    /// Per-cell write counter, starting at 1.
    pub col_version: u64,
    /// Site that produced the write.
    pub site_id: SiteId,
}

impl CellVersion {
    pub fn new(col_version: u64, site_id: SiteId) -> Self {
        Self {
            col_version,
            site_id,
        }
    }

    /// Whether this version outranks a stored one. `None` means the slot has
    /// never been written (all versions zero), which every write outranks.
    pub fn beats(&self, stored: Option<&CellVersion>) -> bool {
        match stored {
            Some(stored) => self > stored,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn site(byte: u8) -> SiteId {
        SiteId::from_uuid(Uuid::from_bytes([byte; 16]))
    }

    #[test]
    fn col_version_dominates_site() {
        assert!(CellVersion::new(2, site(0)) > CellVersion::new(1, site(9)));
    }

    #[test]
    fn site_breaks_ties() {
        assert!(CellVersion::new(2, site(9)) > CellVersion::new(2, site(0)));
    }

    #[test]
    fn every_write_beats_an_unwritten_slot() {
        assert!(CellVersion::new(1, site(0)).beats(None));
    }
}
