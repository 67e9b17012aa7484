use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// One registered file: a stable identifier and its current path.
///
/// The id never changes; the path is rewritten on move. A record may
/// transiently point at a path that no longer exists on disk until the next
/// incremental fix or rescan.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: Uuid,
    pub path: PathBuf,
}

impl FileRecord {
    pub fn new(id: Uuid, path: impl Into<PathBuf>) -> Self {
        Self {
            id,
            path: path.into(),
        }
    }
}

/// A directed edge: the `user` file references the `resource` file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UsageEdge {
    pub user: Uuid,
    pub resource: Uuid,
}

impl UsageEdge {
    pub fn new(user: Uuid, resource: Uuid) -> Self {
        Self { user, resource }
    }

    /// The stored primary key for this edge.
    pub fn combo_key(&self) -> String {
        format!("{}:{}", self.user, self.resource)
    }
}

/// Counters reported by a completed full rescan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStats {
    /// Files indexed (record upserted, edges replaced or kept).
    pub scanned: usize,
    /// Candidate paths rejected by the validity filter or with no
    /// resolvable identifier.
    pub skipped: usize,
    /// Stored records not re-observed and therefore deleted.
    pub removed: usize,
}
