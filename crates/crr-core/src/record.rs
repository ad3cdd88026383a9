//! The change record — the unit of replication.

use serde::{Deserialize, Serialize};

use crate::constants::TOMBSTONE_COLUMN;
use crate::scalar::Scalar;
use crate::site::SiteId;

/// Ordered primary-key value(s) of a tracked row.
///
/// Encoded canonically as the JSON array of its scalars; that encoding is
/// both the wire form and the key of the shadow clock tables, so it must be
/// stable byte-for-byte for a given logical key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrimaryKey(Vec<Scalar>);

impl PrimaryKey {
    pub fn new(values: Vec<Scalar>) -> Self {
        Self(values)
    }

    pub fn values(&self) -> &[Scalar] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Canonical encoding used as the clock-table key.
    pub fn encode(&self) -> String {
        // Vec<Scalar> serialization is infallible.
        serde_json::to_string(&self.0).unwrap_or_default()
    }

    pub fn decode(encoded: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(encoded).map(Self)
    }
}

impl From<Scalar> for PrimaryKey {
    fn from(v: Scalar) -> Self {
        Self(vec![v])
    }
}

/// One versioned write to a single cell, or to a row's tombstone slot.
///
/// `db_version` is the originating site's local logical clock; values from
/// different sites are not comparable. `(col_version, site_id)` is the rank
/// used for conflict resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Tracked table this record targets.
    pub table: String,
    /// Primary-key value(s) of the target row.
    pub pk: PrimaryKey,
    /// Column name, or [`TOMBSTONE_COLUMN`] for a row deletion.
    pub column: String,
    /// New value. Absent for tombstones.
    pub value: Option<Scalar>,
    /// Per-cell write counter, starting at 1.
    pub col_version: u64,
    /// Originating site's logical clock tick.
    pub db_version: u64,
    /// Originating site.
    pub site_id: SiteId,
    /// Intra-transaction sub-counter, starting at 0.
    pub seq: u64,
}

impl ChangeRecord {
    /// Whether this record marks a row deletion.
    pub fn is_tombstone(&self) -> bool {
        self.column == TOMBSTONE_COLUMN
    }
}
