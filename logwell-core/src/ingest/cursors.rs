//! In-memory cursor policy. The authoritative copy lives in the store; this
//! map is owned exclusively by the ingestion worker, so no locking applies.

use std::collections::HashMap;
use std::path::Path;

use chrono::Utc;
use tracing::debug;

use logwell_model::Cursor;

#[derive(Debug, Default)]
pub struct CursorMap {
    cursors: HashMap<String, Cursor>,
}

impl CursorMap {
    pub fn from_loaded(cursors: Vec<Cursor>) -> Self {
        Self {
            cursors: cursors
                .into_iter()
                .map(|cursor| (cursor.container_id.clone(), cursor))
                .collect(),
        }
    }

    pub fn get(&self, container_id: &str) -> Option<&Cursor> {
        self.cursors.get(container_id)
    }

    /// Cursor for a container, seeding one on first sight so that only the
    /// last `tail_buffer` bytes of pre-existing history are replayed.
    pub fn get_or_seed(
        &mut self,
        container_id: &str,
        log_path: &Path,
        file_size: u64,
        inode: u64,
        tail_buffer: u64,
    ) -> Cursor {
        if let Some(cursor) = self.cursors.get(container_id) {
            return cursor.clone();
        }
        let position = file_size.saturating_sub(tail_buffer);
        debug!(
            container = container_id,
            position, inode, "seeding cursor for newly seen container"
        );
        let cursor = Cursor::new(container_id, log_path.to_path_buf(), position, inode);
        self.cursors.insert(container_id.to_string(), cursor.clone());
        cursor
    }

    /// Adopt a cursor that was just persisted with its batch.
    pub fn commit(&mut self, mut cursor: Cursor) {
        cursor.updated_at = Utc::now();
        self.cursors.insert(cursor.container_id.clone(), cursor);
    }
}
