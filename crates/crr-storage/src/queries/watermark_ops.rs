//! Peer watermark map: highest `db_version` fully applied per peer.

use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crr_core::errors::{CrrError, CrrResult};
use crr_core::SiteId;

use crate::to_storage_err;

/// Last fully-applied `db_version` for a peer; 0 for unknown peers.
pub fn get(conn: &Connection, peer: SiteId) -> CrrResult<u64> {
    let version: Option<i64> = conn
        .query_row(
            "SELECT db_version FROM crr_peers WHERE site_id = ?1",
            params![peer.to_string()],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| to_storage_err(format!("watermark get: {e}")))?;
    Ok(version.unwrap_or(0) as u64)
}

/// Advance a peer's watermark.
///
/// Moving backwards indicates an upstream transport or replay bug and fails
/// with a regression error, leaving the stored watermark unchanged; it is
/// never silently clamped.
pub fn advance(conn: &Connection, peer: SiteId, version: u64) -> CrrResult<()> {
    let stored = get(conn, peer)?;
    if version < stored {
        return Err(CrrError::WatermarkRegression {
            peer: peer.to_string(),
            stored,
            attempted: version,
        });
    }
    debug!(%peer, stored, version, "advancing peer watermark");
    conn.execute(
        "INSERT INTO crr_peers (site_id, db_version) VALUES (?1, ?2)
         ON CONFLICT (site_id) DO UPDATE SET db_version = excluded.db_version",
        params![peer.to_string(), version as i64],
    )
    .map_err(|e| to_storage_err(format!("watermark advance: {e}")))?;
    Ok(())
}

/// All known peers and their watermarks, for operator visibility.
pub fn all(conn: &Connection) -> CrrResult<Vec<(SiteId, u64)>> {
    let mut stmt = conn
        .prepare("SELECT site_id, db_version FROM crr_peers ORDER BY site_id")
        .map_err(|e| to_storage_err(format!("watermark all: {e}")))?;
    let rows = stmt
        .query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })
        .map_err(|e| to_storage_err(format!("watermark all: {e}")))?;

    let mut out = Vec::new();
    for row in rows {
        let (site, version) = row.map_err(|e| to_storage_err(format!("watermark all: {e}")))?;
        let site = SiteId::parse(&site).map_err(|e| {
            to_storage_err(format!("watermark site_id {site}: {e}"))
        })?;
        out.push((site, version as u64));
    }
    Ok(out)
}
