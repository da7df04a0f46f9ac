//! Operation log, the secondary fast-access store.
//!
//! One redb table holds the most recent operations per block, keyed by the
//! 40-byte concatenation `document_id ‖ block_id ‖ timestamp` (ids are raw
//! UUID bytes, timestamp is big-endian unix millis). A range scan over the
//! 32-byte `document_id ‖ block_id` prefix walks one block's history in
//! timestamp order; iterating from the end gives newest-first.
//!
//! This store is advisory. It is written best-effort after the document
//! store commits and read only as a conflict-resolution hint and audit
//! trail, never as the source of truth. Same-key writes overwrite: per-key
//! last-write-wins on timestamp is the intended resolution for concurrent
//! log writes against one block.

use std::path::Path;

use redb::{Database, TableDefinition};
use serde::{Deserialize, Serialize};
use tracing::debug;

use orihon_types::{BlockId, BlockOp, DocumentId, UserId, now_millis};

const OPLOG: TableDefinition<&[u8], &[u8]> = TableDefinition::new("oplog");

/// Per-request item ceiling for batch writes and deletes. Callers issue one
/// logical call; chunking to this size happens internally.
pub const CHUNK_SIZE: usize = 25;

/// Operation log failures. Best-effort paths log and swallow these; only
/// explicit history reads surface them.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("log storage error: {0}")]
    Storage(String),
    #[error("log entry encoding error: {0}")]
    Encoding(String),
}

impl From<redb::DatabaseError> for LogError {
    fn from(e: redb::DatabaseError) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<redb::TransactionError> for LogError {
    fn from(e: redb::TransactionError) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<redb::TableError> for LogError {
    fn from(e: redb::TableError) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<redb::StorageError> for LogError {
    fn from(e: redb::StorageError) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<redb::CommitError> for LogError {
    fn from(e: redb::CommitError) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<postcard::Error> for LogError {
    fn from(e: postcard::Error) -> Self {
        Self::Encoding(e.to_string())
    }
}

/// One logged operation: who wrote what to which block, and the document
/// version the write landed at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub document_id: DocumentId,
    pub user_id: UserId,
    /// The full resolved operation as applied (post-collapse).
    pub operation: BlockOp,
    /// Server-assigned unix millis; the ordering component of the key.
    pub timestamp: u64,
    /// Post-commit document version.
    pub document_version_at_write: u64,
}

impl LogEntry {
    /// Stamp a resolved operation for logging, timestamped now.
    pub fn new(
        document_id: DocumentId,
        user_id: UserId,
        operation: BlockOp,
        document_version_at_write: u64,
    ) -> Self {
        Self {
            document_id,
            user_id,
            operation,
            timestamp: now_millis(),
            document_version_at_write,
        }
    }

    /// The block this entry is keyed under.
    pub fn block_id(&self) -> BlockId {
        self.operation.block_id
    }

    fn key(&self) -> [u8; 40] {
        entry_key(self.document_id, self.block_id(), self.timestamp)
    }
}

fn entry_key(doc: DocumentId, block: BlockId, timestamp: u64) -> [u8; 40] {
    let mut key = [0u8; 40];
    key[..16].copy_from_slice(doc.as_bytes());
    key[16..32].copy_from_slice(block.as_bytes());
    key[32..].copy_from_slice(&timestamp.to_be_bytes());
    key
}

/// Inclusive key bounds covering one block's whole history. Keys are always
/// exactly 40 bytes, so padding the timestamp with 0x00 / 0xFF is precise.
fn block_range(doc: DocumentId, block: BlockId) -> ([u8; 40], [u8; 40]) {
    (entry_key(doc, block, 0), entry_key(doc, block, u64::MAX))
}

/// Append-only/overwrite store for operation log entries.
pub struct OpLogStore {
    db: Database,
}

impl OpLogStore {
    /// Open or create the log database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, LogError> {
        let db = Database::create(path)?;

        // Create the table up front so empty reads don't fail.
        let write = db.begin_write()?;
        write.open_table(OPLOG)?;
        write.commit()?;

        debug!("opened operation log");
        Ok(Self { db })
    }

    /// Write one entry.
    pub fn put(&self, entry: &LogEntry) -> Result<(), LogError> {
        let value = postcard::to_stdvec(entry)?;
        let write = self.db.begin_write()?;
        {
            let mut table = write.open_table(OPLOG)?;
            table.insert(entry.key().as_slice(), value.as_slice())?;
        }
        write.commit()?;
        Ok(())
    }

    /// Write many entries, chunked at [`CHUNK_SIZE`] per write transaction.
    pub fn put_batch(&self, entries: &[LogEntry]) -> Result<(), LogError> {
        for chunk in entries.chunks(CHUNK_SIZE) {
            let write = self.db.begin_write()?;
            {
                let mut table = write.open_table(OPLOG)?;
                for entry in chunk {
                    let value = postcard::to_stdvec(entry)?;
                    table.insert(entry.key().as_slice(), value.as_slice())?;
                }
            }
            write.commit()?;
        }
        debug!(entries = entries.len(), "logged batch");
        Ok(())
    }

    /// The most recent entries for one block, newest first, at most `limit`.
    pub fn most_recent(
        &self,
        doc: DocumentId,
        block: BlockId,
        limit: usize,
    ) -> Result<Vec<LogEntry>, LogError> {
        let read = self.db.begin_read()?;
        let table = read.open_table(OPLOG)?;
        let (lo, hi) = block_range(doc, block);

        let mut entries = Vec::new();
        for item in table.range(lo.as_slice()..=hi.as_slice())?.rev() {
            if entries.len() >= limit {
                break;
            }
            let (_, value) = item?;
            entries.push(postcard::from_bytes(value.value())?);
        }
        Ok(entries)
    }

    /// Delete every entry for the given blocks of one document. Returns the
    /// number of entries removed. Deletes are chunked at [`CHUNK_SIZE`] keys
    /// per write transaction regardless of how many blocks are passed.
    pub fn batch_delete(
        &self,
        doc: DocumentId,
        blocks: &[BlockId],
    ) -> Result<usize, LogError> {
        // Collect the full key set first; the per-chunk transactions below
        // must not hold a read open across commits.
        let mut keys: Vec<[u8; 40]> = Vec::new();
        {
            let read = self.db.begin_read()?;
            let table = read.open_table(OPLOG)?;
            for block in blocks {
                let (lo, hi) = block_range(doc, *block);
                for item in table.range(lo.as_slice()..=hi.as_slice())? {
                    let (key, _) = item?;
                    let mut k = [0u8; 40];
                    k.copy_from_slice(key.value());
                    keys.push(k);
                }
            }
        }

        for chunk in keys.chunks(CHUNK_SIZE) {
            let write = self.db.begin_write()?;
            {
                let mut table = write.open_table(OPLOG)?;
                for key in chunk {
                    table.remove(key.as_slice())?;
                }
            }
            write.commit()?;
        }

        debug!(
            document = %doc,
            blocks = blocks.len(),
            removed = keys.len(),
            "purged log entries"
        );
        Ok(keys.len())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (OpLogStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = OpLogStore::open(dir.path().join("oplog.redb")).unwrap();
        (store, dir)
    }

    fn entry(doc: DocumentId, block: BlockId, ts: u64, content: &str) -> LogEntry {
        let mut e = LogEntry::new(
            doc,
            UserId::new(),
            BlockOp::update(block, 0).with_content(content),
            1,
        );
        e.timestamp = ts;
        e
    }

    // ── Point writes and recency queries ────────────────────────────────

    #[test]
    fn test_put_then_most_recent() {
        let (store, _dir) = store();
        let doc = DocumentId::new();
        let block = BlockId::new();

        store.put(&entry(doc, block, 100, "old")).unwrap();
        store.put(&entry(doc, block, 200, "mid")).unwrap();
        store.put(&entry(doc, block, 300, "new")).unwrap();

        let recent = store.most_recent(doc, block, 2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].operation.content.as_deref(), Some("new"));
        assert_eq!(recent[1].operation.content.as_deref(), Some("mid"));

        let all = store.most_recent(doc, block, 10).unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_most_recent_on_empty_block_is_empty() {
        let (store, _dir) = store();
        let recent = store
            .most_recent(DocumentId::new(), BlockId::new(), 5)
            .unwrap();
        assert!(recent.is_empty());
    }

    #[test]
    fn test_entries_are_scoped_per_block() {
        let (store, _dir) = store();
        let doc = DocumentId::new();
        let a = BlockId::new();
        let b = BlockId::new();

        store.put(&entry(doc, a, 100, "for-a")).unwrap();
        store.put(&entry(doc, b, 200, "for-b")).unwrap();

        let recent = store.most_recent(doc, a, 10).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].operation.content.as_deref(), Some("for-a"));
    }

    #[test]
    fn test_same_key_overwrites_last_write_wins() {
        let (store, _dir) = store();
        let doc = DocumentId::new();
        let block = BlockId::new();

        store.put(&entry(doc, block, 100, "first")).unwrap();
        store.put(&entry(doc, block, 100, "second")).unwrap();

        let recent = store.most_recent(doc, block, 10).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].operation.content.as_deref(), Some("second"));
    }

    // ── Chunked batch operations ────────────────────────────────────────

    #[test]
    fn test_put_batch_larger_than_chunk() {
        let (store, _dir) = store();
        let doc = DocumentId::new();

        let blocks: Vec<BlockId> = (0..60).map(|_| BlockId::new()).collect();
        let entries: Vec<LogEntry> = blocks
            .iter()
            .enumerate()
            .map(|(i, b)| entry(doc, *b, 1_000 + i as u64, "x"))
            .collect();
        assert!(entries.len() > 2 * CHUNK_SIZE);

        store.put_batch(&entries).unwrap();

        for b in &blocks {
            assert_eq!(store.most_recent(doc, *b, 1).unwrap().len(), 1);
        }
    }

    #[test]
    fn test_batch_delete_purges_only_named_blocks() {
        let (store, _dir) = store();
        let doc = DocumentId::new();
        let keep = BlockId::new();
        let drop_a = BlockId::new();
        let drop_b = BlockId::new();

        for ts in [10, 20, 30] {
            store.put(&entry(doc, drop_a, ts, "a")).unwrap();
            store.put(&entry(doc, drop_b, ts, "b")).unwrap();
            store.put(&entry(doc, keep, ts, "k")).unwrap();
        }

        let removed = store.batch_delete(doc, &[drop_a, drop_b]).unwrap();
        assert_eq!(removed, 6);

        assert!(store.most_recent(doc, drop_a, 10).unwrap().is_empty());
        assert!(store.most_recent(doc, drop_b, 10).unwrap().is_empty());
        assert_eq!(store.most_recent(doc, keep, 10).unwrap().len(), 3);
    }

    #[test]
    fn test_batch_delete_spanning_many_chunks() {
        let (store, _dir) = store();
        let doc = DocumentId::new();

        let blocks: Vec<BlockId> = (0..30).map(|_| BlockId::new()).collect();
        let entries: Vec<LogEntry> = blocks
            .iter()
            .map(|b| entry(doc, *b, 500, "x"))
            .collect();
        store.put_batch(&entries).unwrap();

        let removed = store.batch_delete(doc, &blocks).unwrap();
        assert_eq!(removed, 30);
        for b in &blocks {
            assert!(store.most_recent(doc, *b, 1).unwrap().is_empty());
        }
    }

    #[test]
    fn test_entry_roundtrips_full_operation() {
        let (store, _dir) = store();
        let doc = DocumentId::new();
        let block = BlockId::new();
        let user = UserId::new();

        let op = BlockOp::update(block, 3)
            .with_content("resolved text")
            .with_kind(orihon_types::BlockKind::Heading2);
        let mut e = LogEntry::new(doc, user, op.clone(), 4);
        e.timestamp = 999;
        store.put(&e).unwrap();

        let got = store.most_recent(doc, block, 1).unwrap().remove(0);
        assert_eq!(got.user_id, user);
        assert_eq!(got.operation, op);
        assert_eq!(got.document_version_at_write, 4);
        assert_eq!(got.timestamp, 999);
    }
}
