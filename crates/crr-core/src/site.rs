//! Stable site identifiers.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies one independent writer/replica.
///
/// Assigned once per database, never reused. The derived `Ord` compares the
/// raw 16 UUID bytes big-endian; this is the conflict-resolution tie-break
/// when two writes carry the same `col_version`, so the ordering must never
/// change across versions of this crate.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SiteId(Uuid);

impl SiteId {
    /// Generate a fresh random site id (done once at replica init).
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// Parse from the hyphenated form stored in the meta table.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }
}

impl std::fmt::Display for SiteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
