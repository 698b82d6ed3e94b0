use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-container ingestion position.
///
/// `position` only advances once every byte up to that offset has been
/// committed; on an inode mismatch the owner resets it to zero before the
/// next read (rotation).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cursor {
    /// Full opaque container identifier (primary key).
    pub container_id: String,
    /// Absolute path of the log file last read.
    pub file_path: PathBuf,
    /// Byte offset at which the next read must resume.
    pub position: u64,
    /// Filesystem inode of `file_path` when `position` was recorded.
    pub inode: u64,
    /// Last successful commit time.
    pub updated_at: DateTime<Utc>,
}

impl Cursor {
    pub fn new(container_id: impl Into<String>, file_path: PathBuf, position: u64, inode: u64) -> Self {
        Self {
            container_id: container_id.into(),
            file_path,
            position,
            inode,
            updated_at: Utc::now(),
        }
    }

    /// Reset for a rotated file: back to the start of the new inode.
    pub fn reset_for_rotation(&mut self, inode: u64) {
        self.position = 0;
        self.inode = inode;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_reset_zeroes_position_and_swaps_inode() {
        let mut cursor = Cursor::new("abc123", PathBuf::from("/logs/abc123-json.log"), 4096, 11);
        cursor.reset_for_rotation(99);
        assert_eq!(cursor.position, 0);
        assert_eq!(cursor.inode, 99);
        assert_eq!(cursor.container_id, "abc123");
    }
}
