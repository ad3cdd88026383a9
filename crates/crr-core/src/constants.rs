/// crr system version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Sentinel column name addressing a row's tombstone slot.
///
/// A [`ChangeRecord`](crate::ChangeRecord) whose `column` equals this value
/// is a row deletion, not a column write.
pub const TOMBSTONE_COLUMN: &str = "__crr_del";

/// Suffix appended to a tracked table's name to form its shadow clock table.
pub const CLOCK_TABLE_SUFFIX: &str = "__crr_clock";

/// Meta table holding the replica's site id and db_version counter.
pub const META_TABLE: &str = "crr_meta";

/// Registry of tracked tables and their frozen schema descriptors.
pub const TRACKED_TABLE: &str = "crr_tracked";

/// Per-peer watermark table.
pub const PEERS_TABLE: &str = "crr_peers";
