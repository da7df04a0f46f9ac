//! SQLite persistence for documents. This is the source of truth.
//!
//! Stores document metadata, collaborators, and normalized block rows.
//! Relational tables (not JSON blobs) so the schema can evolve and so block
//! mutations are row-level operations inside one transaction.
//!
//! Concurrency: one connection behind a mutex. [`DocumentDb::with_txn`] locks
//! the connection, opens a single SQLite transaction, and hands the caller a
//! [`DocumentTxn`] view: version reads and mutations issued through it see
//! the same snapshot, and the lock makes the transaction the serialization
//! point for concurrent edits to the same document.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};

use orihon_types::{Block, BlockId, BlockKind, BlockOp, Document, DocumentId, UserId, now_millis};

/// Database handle for document persistence.
pub struct DocumentDb {
    conn: Mutex<Connection>,
}

const SCHEMA: &str = r#"
-- Document metadata (version counts applied batches)
CREATE TABLE IF NOT EXISTS documents (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    version INTEGER NOT NULL DEFAULT 0,
    creator_id TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_documents_updated ON documents(updated_at DESC);

-- Blocks (composite PK: block ids are unique within their document)
CREATE TABLE IF NOT EXISTS blocks (
    document_id TEXT NOT NULL,
    id TEXT NOT NULL,
    kind TEXT NOT NULL,
    content TEXT NOT NULL,
    order_idx INTEGER NOT NULL,
    version INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    PRIMARY KEY (document_id, id),
    FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE
);
CREATE INDEX IF NOT EXISTS idx_blocks_order ON blocks(document_id, order_idx);

-- Collaborators (the creator is never listed here)
CREATE TABLE IF NOT EXISTS collaborators (
    document_id TEXT NOT NULL,
    user_id TEXT NOT NULL,
    added_at INTEGER NOT NULL,
    PRIMARY KEY (document_id, user_id),
    FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE
);
"#;

/// Document store failures, mapped to the engine taxonomy at the service
/// boundary (see `error.rs`).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("document {0} not found")]
    DocumentMissing(DocumentId),
    #[error("block {0} not found")]
    BlockMissing(BlockId),
    #[error("block {0} already exists")]
    BlockExists(BlockId),
    #[error("user {0} is already a collaborator")]
    AlreadyCollaborator(UserId),
    #[error("user {0} is the creator and cannot be a collaborator")]
    CreatorCollaborator(UserId),
    #[error("user {0} is not a collaborator")]
    NotCollaborator(UserId),
    #[error("stored row is corrupt: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

// =============================================================================
// Row structs (module-private helpers)
// =============================================================================

/// Maps a row from the blocks table.
#[derive(Debug)]
struct BlockRow {
    id: String,
    kind: String,
    content: String,
    order_idx: i64,
    version: i64,
    created_at: i64,
}

fn row_to_block(row: BlockRow) -> Result<Block, StoreError> {
    Ok(Block {
        id: BlockId::parse(&row.id).map_err(|e| StoreError::Corrupt(e.to_string()))?,
        // Unknown kinds degrade to paragraph rather than failing the load.
        kind: BlockKind::from_str(&row.kind).unwrap_or_default(),
        content: row.content,
        order: row.order_idx,
        version: row.version as u64,
        created_at: row.created_at as u64,
    })
}

fn parse_doc_id(s: &str) -> Result<DocumentId, StoreError> {
    DocumentId::parse(s).map_err(|e| StoreError::Corrupt(e.to_string()))
}

fn parse_user_id(s: &str) -> Result<UserId, StoreError> {
    UserId::parse(s).map_err(|e| StoreError::Corrupt(e.to_string()))
}

impl DocumentDb {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Run `f` against one SQLite transaction. Commits if `f` returns `Ok`,
    /// rolls back otherwise. The connection lock is held for the duration, so
    /// everything `f` reads and writes is against one consistent snapshot.
    pub fn with_txn<T>(
        &self,
        f: impl FnOnce(&DocumentTxn<'_>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let conn = self.conn.lock();
        let tx = conn.unchecked_transaction()?;
        let out = f(&DocumentTxn { tx: &tx })?;
        tx.commit()?;
        Ok(out)
    }

    // =========================================================================
    // Document CRUD
    // =========================================================================

    /// Create a document with its initial block (order 0, version 0).
    ///
    /// The initial block id is server-generated: the client has nothing to
    /// render optimistically at document-create time.
    pub fn create_document(
        &self,
        creator: UserId,
        title: &str,
        initial_content: &str,
    ) -> Result<Document, StoreError> {
        let doc_id = DocumentId::new();
        let block = Block::new(BlockId::new(), BlockKind::Paragraph, initial_content, 0);
        let now = now_millis();

        self.with_txn(|txn| {
            txn.tx.execute(
                "INSERT INTO documents (id, title, version, creator_id, created_at, updated_at)
                 VALUES (?1, ?2, 0, ?3, ?4, ?4)",
                params![doc_id.to_string(), title, creator.to_string(), now as i64],
            )?;
            txn.insert_block(doc_id, &block)?;
            Ok(())
        })?;

        self.load_document(doc_id)?
            .ok_or(StoreError::DocumentMissing(doc_id))
    }

    /// Load a document with its ordered blocks and collaborators.
    pub fn load_document(&self, id: DocumentId) -> Result<Option<Document>, StoreError> {
        let conn = self.conn.lock();

        let meta = conn
            .query_row(
                "SELECT title, version, creator_id, created_at, updated_at
                 FROM documents WHERE id = ?1",
                params![id.to_string()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, i64>(4)?,
                    ))
                },
            )
            .optional()?;

        let Some((title, version, creator, created_at, updated_at)) = meta else {
            return Ok(None);
        };

        let blocks = load_blocks(&conn, id)?;
        let collaborator_ids = load_collaborators(&conn, id)?;

        Ok(Some(Document {
            id,
            title,
            version: version as u64,
            creator_id: parse_user_id(&creator)?,
            collaborator_ids,
            blocks,
            created_at: created_at as u64,
            updated_at: updated_at as u64,
        }))
    }

    /// Whether a document row exists. Cheaper than a full load.
    pub fn document_exists(&self, id: DocumentId) -> Result<bool, StoreError> {
        let conn = self.conn.lock();
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM documents WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Set the mutable title. Does not touch the version counter.
    pub fn rename(&self, id: DocumentId, title: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE documents SET title = ?2, updated_at = ?3 WHERE id = ?1",
            params![id.to_string(), title, now_millis() as i64],
        )?;
        if changed == 0 {
            return Err(StoreError::DocumentMissing(id));
        }
        Ok(())
    }

    /// Delete a document. Blocks and collaborators go with it (FK cascade).
    ///
    /// Returns the ids of the blocks that existed, so the caller can purge
    /// the operation log for each of them.
    pub fn delete_document(&self, id: DocumentId) -> Result<Vec<BlockId>, StoreError> {
        self.with_txn(|txn| {
            let mut stmt = txn
                .tx
                .prepare("SELECT id FROM blocks WHERE document_id = ?1")?;
            let ids: Vec<String> = stmt
                .query_map(params![id.to_string()], |row| row.get(0))?
                .collect::<Result<_, _>>()?;

            let deleted = txn
                .tx
                .execute("DELETE FROM documents WHERE id = ?1", params![id.to_string()])?;
            if deleted == 0 {
                return Err(StoreError::DocumentMissing(id));
            }

            ids.iter()
                .map(|s| BlockId::parse(s).map_err(|e| StoreError::Corrupt(e.to_string())))
                .collect()
        })
    }

    /// All documents the user created or collaborates on, newest-updated
    /// first.
    pub fn list_for_user(&self, user: UserId) -> Result<Vec<DocumentId>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT d.id FROM documents d
             WHERE d.creator_id = ?1
                OR EXISTS (SELECT 1 FROM collaborators c
                           WHERE c.document_id = d.id AND c.user_id = ?1)
             ORDER BY d.updated_at DESC",
        )?;
        let ids: Vec<String> = stmt
            .query_map(params![user.to_string()], |row| row.get(0))?
            .collect::<Result<_, _>>()?;

        ids.iter().map(|s| parse_doc_id(s)).collect()
    }

    // =========================================================================
    // Collaborators
    // =========================================================================

    /// Add a collaborator. The creator cannot be added, and duplicates are
    /// rejected; both checks run inside the same transaction as the insert.
    pub fn add_collaborator(&self, id: DocumentId, user: UserId) -> Result<(), StoreError> {
        self.with_txn(|txn| {
            let creator: Option<String> = txn
                .tx
                .query_row(
                    "SELECT creator_id FROM documents WHERE id = ?1",
                    params![id.to_string()],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(creator) = creator else {
                return Err(StoreError::DocumentMissing(id));
            };
            if parse_user_id(&creator)? == user {
                return Err(StoreError::CreatorCollaborator(user));
            }

            let exists: Option<i64> = txn
                .tx
                .query_row(
                    "SELECT 1 FROM collaborators WHERE document_id = ?1 AND user_id = ?2",
                    params![id.to_string(), user.to_string()],
                    |row| row.get(0),
                )
                .optional()?;
            if exists.is_some() {
                return Err(StoreError::AlreadyCollaborator(user));
            }

            txn.tx.execute(
                "INSERT INTO collaborators (document_id, user_id, added_at) VALUES (?1, ?2, ?3)",
                params![id.to_string(), user.to_string(), now_millis() as i64],
            )?;
            txn.tx.execute(
                "UPDATE documents SET updated_at = ?2 WHERE id = ?1",
                params![id.to_string(), now_millis() as i64],
            )?;
            Ok(())
        })
    }

    /// Remove a collaborator. Removing someone who isn't one is an error.
    pub fn remove_collaborator(&self, id: DocumentId, user: UserId) -> Result<(), StoreError> {
        self.with_txn(|txn| {
            let exists: Option<i64> = txn
                .tx
                .query_row(
                    "SELECT 1 FROM documents WHERE id = ?1",
                    params![id.to_string()],
                    |row| row.get(0),
                )
                .optional()?;
            if exists.is_none() {
                return Err(StoreError::DocumentMissing(id));
            }

            let removed = txn.tx.execute(
                "DELETE FROM collaborators WHERE document_id = ?1 AND user_id = ?2",
                params![id.to_string(), user.to_string()],
            )?;
            if removed == 0 {
                return Err(StoreError::NotCollaborator(user));
            }
            txn.tx.execute(
                "UPDATE documents SET updated_at = ?2 WHERE id = ?1",
                params![id.to_string(), now_millis() as i64],
            )?;
            Ok(())
        })
    }
}

// =============================================================================
// Transactional view
// =============================================================================

/// Per-operation mutations and version reads against one open transaction.
///
/// Handed out by [`DocumentDb::with_txn`]; everything here sees the snapshot
/// the transaction opened with, which is what keeps conflict detection and
/// the apply itself consistent with each other.
pub struct DocumentTxn<'a> {
    tx: &'a rusqlite::Transaction<'a>,
}

impl DocumentTxn<'_> {
    /// Current document version, or `None` if the document doesn't exist.
    pub fn document_version(&self, id: DocumentId) -> Result<Option<u64>, StoreError> {
        let v: Option<i64> = self
            .tx
            .query_row(
                "SELECT version FROM documents WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(v.map(|v| v as u64))
    }

    /// Current block version, or `None` if the block doesn't exist.
    pub fn block_version(&self, doc: DocumentId, block: BlockId) -> Result<Option<u64>, StoreError> {
        let v: Option<i64> = self
            .tx
            .query_row(
                "SELECT version FROM blocks WHERE document_id = ?1 AND id = ?2",
                params![doc.to_string(), block.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(v.map(|v| v as u64))
    }

    /// Insert a freshly created block (version 0).
    pub fn insert_block(&self, doc: DocumentId, block: &Block) -> Result<(), StoreError> {
        let exists: Option<i64> = self
            .tx
            .query_row(
                "SELECT 1 FROM blocks WHERE document_id = ?1 AND id = ?2",
                params![doc.to_string(), block.id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_some() {
            return Err(StoreError::BlockExists(block.id));
        }

        self.tx.execute(
            "INSERT INTO blocks (document_id, id, kind, content, order_idx, version, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                doc.to_string(),
                block.id.to_string(),
                block.kind.as_str(),
                block.content,
                block.order,
                block.version as i64,
                block.created_at as i64,
            ],
        )?;
        Ok(())
    }

    /// Apply a `create` op: client-supplied id, defaults for omitted fields.
    pub fn create_from_op(&self, doc: DocumentId, op: &BlockOp) -> Result<(), StoreError> {
        let block = Block::new(
            op.block_id,
            op.block_kind.unwrap_or_default(),
            op.content.clone().unwrap_or_default(),
            op.order.unwrap_or(0),
        );
        self.insert_block(doc, &block)
    }

    /// Apply an `update` op: set whichever of content/kind the op carries,
    /// leave the rest untouched, bump the block version by exactly 1.
    pub fn update_from_op(&self, doc: DocumentId, op: &BlockOp) -> Result<(), StoreError> {
        let changed = self.tx.execute(
            "UPDATE blocks SET
               content = COALESCE(?3, content),
               kind = COALESCE(?4, kind),
               version = version + 1
             WHERE document_id = ?1 AND id = ?2",
            params![
                doc.to_string(),
                op.block_id.to_string(),
                op.content,
                op.block_kind.map(|k| k.as_str()),
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::BlockMissing(op.block_id));
        }
        Ok(())
    }

    /// Apply a `delete` op. Absence is an error, not a no-op.
    pub fn delete_block(&self, doc: DocumentId, block: BlockId) -> Result<(), StoreError> {
        let changed = self.tx.execute(
            "DELETE FROM blocks WHERE document_id = ?1 AND id = ?2",
            params![doc.to_string(), block.to_string()],
        )?;
        if changed == 0 {
            return Err(StoreError::BlockMissing(block));
        }
        Ok(())
    }

    /// Apply a `move` op: order only, version untouched. Moving an absent
    /// block is a silent no-op (unconditional positional update).
    pub fn move_block(&self, doc: DocumentId, block: BlockId, order: i64) -> Result<(), StoreError> {
        self.tx.execute(
            "UPDATE blocks SET order_idx = ?3 WHERE document_id = ?1 AND id = ?2",
            params![doc.to_string(), block.to_string(), order],
        )?;
        Ok(())
    }

    /// One document-version bump per batch. Returns the post-bump version.
    pub fn bump_document(&self, id: DocumentId) -> Result<u64, StoreError> {
        let changed = self.tx.execute(
            "UPDATE documents SET version = version + 1, updated_at = ?2 WHERE id = ?1",
            params![id.to_string(), now_millis() as i64],
        )?;
        if changed == 0 {
            return Err(StoreError::DocumentMissing(id));
        }
        let v: i64 = self.tx.query_row(
            "SELECT version FROM documents WHERE id = ?1",
            params![id.to_string()],
            |row| row.get(0),
        )?;
        Ok(v as u64)
    }
}

// =============================================================================
// Shared load helpers (used under either the plain lock or a transaction)
// =============================================================================

fn load_blocks(conn: &Connection, doc: DocumentId) -> Result<Vec<Block>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, kind, content, order_idx, version, created_at
         FROM blocks WHERE document_id = ?1 ORDER BY order_idx",
    )?;
    let rows = stmt.query_map(params![doc.to_string()], |row| {
        Ok(BlockRow {
            id: row.get(0)?,
            kind: row.get(1)?,
            content: row.get(2)?,
            order_idx: row.get(3)?,
            version: row.get(4)?,
            created_at: row.get(5)?,
        })
    })?;

    let mut blocks = Vec::new();
    for row in rows {
        blocks.push(row_to_block(row?)?);
    }
    Ok(blocks)
}

fn load_collaborators(conn: &Connection, doc: DocumentId) -> Result<Vec<UserId>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT user_id FROM collaborators WHERE document_id = ?1 ORDER BY added_at",
    )?;
    let ids: Vec<String> = stmt
        .query_map(params![doc.to_string()], |row| row.get(0))?
        .collect::<Result<_, _>>()?;

    ids.iter().map(|s| parse_user_id(s)).collect()
}

// ============================================================================
// Tests
// ============================================================================
