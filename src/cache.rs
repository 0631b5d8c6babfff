//! On-disk snapshot of the deduplicated issue map, for iterating on fixes
//! without hitting the network again.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::dedupe::IssueGroups;
use crate::error::Error;

/// File name of the snapshot in the docs root.
pub const CACHE_FILE: &str = ".doclinks-cache.json";

/// Bumped whenever the snapshot layout changes.
const CACHE_VERSION: u32 = 1;

/// The snapshot as written to disk.
#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    /// Issue records by kind.
    groups: IssueGroups,
    /// Layout version.
    version: u32,
}

/// Parse a snapshot from JSON.
///
/// # Errors
///
/// Returns `Error::CacheCorrupt` if the content is not a snapshot or was
/// written by a different layout version.
pub fn parse(content: &str) -> Result<IssueGroups, Error> {
    let snapshot: Snapshot = serde_json::from_str(content).map_err(|e| {
        return Error::CacheCorrupt { reason: e.to_string() };
    })?;
    if snapshot.version != CACHE_VERSION {
        return Err(Error::CacheCorrupt {
            reason: format!("version {} (expected {CACHE_VERSION})", snapshot.version),
        });
    }
    return Ok(snapshot.groups);
}

/// Read the snapshot, `None` when there isn't one.
///
/// # Errors
///
/// Returns `Error::FileRead` for read failures other than not-found, or
/// `Error::CacheCorrupt` if the file can't be used.
pub fn read(path: &Path) -> Result<Option<IssueGroups>, Error> {
    let content = match std::fs::read_to_string(path) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::read(path, e)),
        Ok(c) => c,
    };
    return parse(&content).map(Some);
}

/// Write the snapshot.
///
/// # Errors
///
/// Returns `Error::Json` if serialization fails, or `Error::Io` if the file
/// cannot be written.
pub fn write(path: &Path, groups: &IssueGroups) -> Result<(), Error> {
    let snapshot = Snapshot { groups: groups.clone(), version: CACHE_VERSION };
    let mut content = serde_json::to_string_pretty(&snapshot)?;
    content.push('\n');
    std::fs::write(path, content)?;
    return Ok(());
}
