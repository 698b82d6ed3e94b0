//! Positioned, rotation-aware reads over a single log file.
//!
//! The reader never consumes a trailing partial line: the returned end
//! position always lands on the byte after the last complete `\n`, so the
//! cursor can only ever cover whole records.

use std::io::{self, SeekFrom};
use std::os::unix::fs::MetadataExt;
use std::path::Path;

use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Lines successfully read past `position`, each with the byte offset just
/// after its terminating newline.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReadBatch {
    pub lines: Vec<(String, u64)>,
    /// Offset after the last complete line (equal to the last line's end
    /// offset, or the starting position when nothing complete was found).
    pub end_position: u64,
}

/// Outcome of one positioned read.
#[derive(Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    /// The file at this path is no longer the file the cursor describes:
    /// its inode changed, or it shrank below the cursor position
    /// (copytruncate). The caller resets the cursor and re-reads.
    Rotated { inode: u64 },
    Data(ReadBatch),
}

/// Read complete lines from `path` starting at `position`, verifying the
/// file still carries `expected_inode` first.
///
/// Every error short of rotation is transient: the caller retries on the
/// next poll with an unchanged cursor.
pub async fn read_from(
    path: &Path,
    position: u64,
    expected_inode: u64,
) -> io::Result<ReadOutcome> {
    let meta = tokio::fs::metadata(path).await?;
    let inode = meta.ino();
    if inode != expected_inode || meta.len() < position {
        return Ok(ReadOutcome::Rotated { inode });
    }
    if meta.len() == position {
        return Ok(ReadOutcome::Data(ReadBatch {
            lines: Vec::new(),
            end_position: position,
        }));
    }

    let mut file = tokio::fs::File::open(path).await?;
    file.seek(SeekFrom::Start(position)).await?;

    let mut buf = Vec::with_capacity((meta.len() - position) as usize);
    let mut limited = file.take(meta.len() - position);
    limited.read_to_end(&mut buf).await?;

    let mut lines = Vec::new();
    let mut line_start = 0usize;
    for (index, byte) in buf.iter().enumerate() {
        if *byte == b'\n' {
            let text = String::from_utf8_lossy(&buf[line_start..index]).into_owned();
            lines.push((text, position + index as u64 + 1));
            line_start = index + 1;
        }
    }

    let end_position = lines.last().map_or(position, |(_, end)| *end);
    Ok(ReadOutcome::Data(ReadBatch { lines, end_position }))
}

/// Stat helper used when seeding a cursor for a newly discovered container.
pub async fn stat(path: &Path) -> io::Result<(u64, u64)> {
    let meta = tokio::fs::metadata(path).await?;
    Ok((meta.len(), meta.ino()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    async fn fixture(content: &[u8]) -> (tempfile::TempDir, PathBuf, u64) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c-json.log");
        tokio::fs::write(&path, content).await.unwrap();
        let (_, inode) = stat(&path).await.unwrap();
        (dir, path, inode)
    }

    #[tokio::test]
    async fn yields_complete_lines_with_end_offsets() {
        let (_dir, path, inode) = fixture(b"alpha\nbeta\n").await;

        let outcome = read_from(&path, 0, inode).await.unwrap();
        let ReadOutcome::Data(batch) = outcome else {
            panic!("unexpected rotation");
        };
        assert_eq!(
            batch.lines,
            vec![("alpha".to_string(), 6), ("beta".to_string(), 11)]
        );
        assert_eq!(batch.end_position, 11);
    }

    #[tokio::test]
    async fn holds_back_a_trailing_partial_line() {
        let (_dir, path, inode) = fixture(b"alpha\npart").await;

        let ReadOutcome::Data(batch) = read_from(&path, 0, inode).await.unwrap() else {
            panic!("unexpected rotation");
        };
        assert_eq!(batch.lines.len(), 1);
        assert_eq!(batch.end_position, 6);

        // Completing the line later picks up exactly the remainder.
        let mut content = tokio::fs::read(&path).await.unwrap();
        content.extend_from_slice(b"ial\n");
        tokio::fs::write(&path, &content).await.unwrap();
        let (_, inode) = stat(&path).await.unwrap();

        let ReadOutcome::Data(batch) = read_from(&path, 6, inode).await.unwrap() else {
            panic!("unexpected rotation");
        };
        assert_eq!(batch.lines, vec![("partial".to_string(), 14)]);
    }

    #[tokio::test]
    async fn resumes_from_a_mid_file_position() {
        let (_dir, path, inode) = fixture(b"alpha\nbeta\ngamma\n").await;

        let ReadOutcome::Data(batch) = read_from(&path, 6, inode).await.unwrap() else {
            panic!("unexpected rotation");
        };
        assert_eq!(batch.lines.len(), 2);
        assert_eq!(batch.lines[0].0, "beta");
        assert_eq!(batch.end_position, 17);
    }

    #[tokio::test]
    async fn detects_inode_mismatch_as_rotation() {
        let (_dir, path, inode) = fixture(b"old\n").await;

        tokio::fs::remove_file(&path).await.unwrap();
        tokio::fs::write(&path, b"new\n").await.unwrap();
        let (_, new_inode) = stat(&path).await.unwrap();

        let outcome = read_from(&path, 4, inode).await.unwrap();
        if new_inode != inode {
            assert_eq!(outcome, ReadOutcome::Rotated { inode: new_inode });
        }
    }

    #[tokio::test]
    async fn detects_truncation_as_rotation() {
        let (_dir, path, inode) = fixture(b"a long line of content\n").await;

        tokio::fs::write(&path, b"x\n").await.unwrap();
        let (_, inode_after) = stat(&path).await.unwrap();
        if inode_after == inode {
            let outcome = read_from(&path, 23, inode).await.unwrap();
            assert_eq!(outcome, ReadOutcome::Rotated { inode });
        }
    }

    #[tokio::test]
    async fn missing_file_is_a_transient_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_from(&dir.path().join("gone.log"), 0, 1).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
