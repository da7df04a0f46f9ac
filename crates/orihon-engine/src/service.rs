//! The document service facade.
//!
//! Lifecycle operations plus the edit entry point, over two stores: the
//! relational document store (source of truth) and the operation log
//! (advisory). Store handles are shared, so the service is `Clone` and one
//! instance can serve concurrent submissions from independent tasks.
//!
//! # Concurrency Model
//!
//! - Document state serializes on the document store's connection lock
//! - Log writes are best-effort after commit, per-key last-write-wins
//! - Event broadcasting for downstream fan-out; lagging receivers drop
//!   oldest events

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use orihon_types::{BlockId, Document, DocumentId, OpBatch, UserId};

use crate::applier::{self, BatchOutcome};
use crate::config::EngineConfig;
use crate::document_db::DocumentDb;
use crate::error::{EngineError, Result};
use crate::oplog::{LogEntry, OpLogStore};

/// Events broadcast when documents change.
#[derive(Clone, Debug)]
pub enum DocumentEvent {
    /// A new document was created.
    Created {
        document_id: DocumentId,
        creator_id: UserId,
    },
    /// A batch committed against a document.
    BatchApplied {
        document_id: DocumentId,
        user_id: UserId,
        /// Document version after the batch.
        version: u64,
        /// Blocks the batch touched, in first-touch order.
        block_ids: Vec<BlockId>,
    },
    /// The document title changed.
    Renamed {
        document_id: DocumentId,
        title: String,
    },
    /// A collaborator was added.
    CollaboratorAdded {
        document_id: DocumentId,
        user_id: UserId,
    },
    /// A collaborator was removed.
    CollaboratorRemoved {
        document_id: DocumentId,
        user_id: UserId,
    },
    /// The document and its blocks are gone.
    Deleted { document_id: DocumentId },
}

/// Facade over the two stores.
#[derive(Clone)]
pub struct DocumentService {
    db: Arc<DocumentDb>,
    log: Arc<OpLogStore>,
    config: EngineConfig,
    event_tx: broadcast::Sender<DocumentEvent>,
}

impl DocumentService {
    /// Build a service from already-opened stores.
    pub fn new(db: DocumentDb, log: OpLogStore, config: EngineConfig) -> Self {
        let (event_tx, _) = broadcast::channel(1024);
        Self {
            db: Arc::new(db),
            log: Arc::new(log),
            config,
            event_tx,
        }
    }

    /// Open both stores under one data directory.
    pub fn open<P: AsRef<Path>>(data_dir: P, config: EngineConfig) -> Result<Self> {
        let dir = data_dir.as_ref();
        std::fs::create_dir_all(dir)
            .map_err(|e| EngineError::StoreUnavailable(e.to_string()))?;
        let db = DocumentDb::open(dir.join("documents.db"))?;
        let log = OpLogStore::open(dir.join("oplog.redb"))?;
        info!(dir = %dir.display(), "document service opened");
        Ok(Self::new(db, log, config))
    }

    /// Get the event receiver for subscribing to changes.
    pub fn subscribe(&self) -> broadcast::Receiver<DocumentEvent> {
        self.event_tx.subscribe()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Create a document with one initial paragraph block.
    #[tracing::instrument(skip(self, initial_content), name = "docs.create", fields(creator = %creator))]
    pub async fn create(
        &self,
        creator: UserId,
        title: &str,
        initial_content: Option<&str>,
    ) -> Result<Document> {
        let doc = self
            .db
            .create_document(creator, title, initial_content.unwrap_or(""))?;
        info!(document = %doc.id, "document created");

        let _ = self.event_tx.send(DocumentEvent::Created {
            document_id: doc.id,
            creator_id: creator,
        });
        Ok(doc)
    }

    /// Load a document with ordered blocks and collaborators.
    pub async fn find_one(&self, id: DocumentId) -> Result<Document> {
        self.db
            .load_document(id)?
            .ok_or_else(|| EngineError::NotFound(format!("document {id}")))
    }

    /// All documents the user created or collaborates on, newest first.
    pub async fn list_for_user(&self, user: UserId) -> Result<Vec<Document>> {
        let ids = self.db.list_for_user(user)?;
        let mut docs = Vec::with_capacity(ids.len());
        for id in ids {
            // A document deleted between listing and loading just drops out.
            if let Some(doc) = self.db.load_document(id)? {
                docs.push(doc);
            }
        }
        Ok(docs)
    }

    /// Set the title. Does not bump the document version; versions count
    /// applied batches only.
    #[tracing::instrument(skip(self, title), name = "docs.rename", fields(document = %id))]
    pub async fn rename(&self, id: DocumentId, title: &str) -> Result<Document> {
        self.db.rename(id, title)?;
        let doc = self.find_one(id).await?;

        let _ = self.event_tx.send(DocumentEvent::Renamed {
            document_id: id,
            title: title.to_string(),
        });
        Ok(doc)
    }

    /// Delete the document, then purge its log entries.
    ///
    /// The document store delete is authoritative; log cleanup is attempted
    /// inline once and, on failure, retried in a background task. A failed
    /// purge never turns a successful delete into an error.
    #[tracing::instrument(skip(self), name = "docs.delete", fields(document = %id))]
    pub async fn delete(&self, id: DocumentId) -> Result<()> {
        let block_ids = self.db.delete_document(id)?;

        match self.log.batch_delete(id, &block_ids) {
            Ok(removed) => {
                debug!(document = %id, removed, "log entries purged");
            }
            Err(e) => {
                warn!(document = %id, error = %e, "log purge failed, retrying in background");
                tokio::spawn(purge_with_retries(
                    Arc::clone(&self.log),
                    id,
                    block_ids,
                    self.config.cleanup_retry_attempts,
                    self.config.cleanup_retry_backoff(),
                ));
            }
        }

        info!(document = %id, "document deleted");
        let _ = self
            .event_tx
            .send(DocumentEvent::Deleted { document_id: id });
        Ok(())
    }

    // =========================================================================
    // Collaborators
    // =========================================================================

    /// Add a collaborator. The creator cannot be added, nor can anyone twice.
    #[tracing::instrument(skip(self), name = "docs.add_collaborator", fields(document = %id, user = %user))]
    pub async fn add_collaborator(&self, id: DocumentId, user: UserId) -> Result<Document> {
        self.db.add_collaborator(id, user)?;
        let doc = self.find_one(id).await?;

        let _ = self.event_tx.send(DocumentEvent::CollaboratorAdded {
            document_id: id,
            user_id: user,
        });
        Ok(doc)
    }

    /// Remove a collaborator.
    #[tracing::instrument(skip(self), name = "docs.remove_collaborator", fields(document = %id, user = %user))]
    pub async fn remove_collaborator(&self, id: DocumentId, user: UserId) -> Result<Document> {
        self.db.remove_collaborator(id, user)?;
        let doc = self.find_one(id).await?;

        let _ = self.event_tx.send(DocumentEvent::CollaboratorRemoved {
            document_id: id,
            user_id: user,
        });
        Ok(doc)
    }

    // =========================================================================
    // Edits
    // =========================================================================

    /// Apply one operation batch and return the refreshed document.
    pub async fn apply_batch(&self, batch: OpBatch) -> Result<Document> {
        let document_id = batch.document_id;
        let user_id = batch.user_id;

        let BatchOutcome {
            document, touched, ..
        } = applier::apply_batch(&self.db, &self.log, &self.config, batch)?;

        let _ = self.event_tx.send(DocumentEvent::BatchApplied {
            document_id,
            user_id,
            version: document.version,
            block_ids: touched,
        });
        Ok(document)
    }

    /// The most recent log entries for one block, newest first. Advisory:
    /// this reads the log, never document state.
    pub async fn block_history(
        &self,
        id: DocumentId,
        block: BlockId,
        limit: Option<usize>,
    ) -> Result<Vec<LogEntry>> {
        if !self.db.document_exists(id)? {
            return Err(EngineError::NotFound(format!("document {id}")));
        }
        let limit = limit.unwrap_or(self.config.history_default_limit);
        Ok(self.log.most_recent(id, block, limit)?)
    }
}

/// Background log cleanup after a delete whose inline purge failed.
async fn purge_with_retries(
    log: Arc<OpLogStore>,
    doc: DocumentId,
    blocks: Vec<BlockId>,
    attempts: u32,
    backoff: Duration,
) {
    for attempt in 1..=attempts.max(1) {
        tokio::time::sleep(backoff).await;
        match log.batch_delete(doc, &blocks) {
            Ok(removed) => {
                debug!(document = %doc, removed, attempt, "log entries purged");
                return;
            }
            Err(e) => {
                warn!(document = %doc, attempt, error = %e, "log purge retry failed");
            }
        }
    }
    warn!(document = %doc, attempts, "log purge abandoned, entries left behind");
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use orihon_types::{BlockKind, BlockOp};
    use tempfile::TempDir;

    fn service() -> (DocumentService, TempDir) {
        let dir = TempDir::new().unwrap();
        let db = DocumentDb::in_memory().unwrap();
        let log = OpLogStore::open(dir.path().join("oplog.redb")).unwrap();
        (DocumentService::new(db, log, EngineConfig::default()), dir)
    }

    // ── Lifecycle ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_create_shape() {
        let (svc, _dir) = service();
        let user = UserId::new();

        let doc = svc.create(user, "Plan", Some("Hello")).await.unwrap();
        assert_eq!(doc.title, "Plan");
        assert_eq!(doc.version, 0);
        assert_eq!(doc.creator_id, user);
        assert_eq!(doc.blocks.len(), 1);

        let block = &doc.blocks[0];
        assert_eq!(block.kind, BlockKind::Paragraph);
        assert_eq!(block.content, "Hello");
        assert_eq!(block.order, 0);
        assert_eq!(block.version, 0);
    }

    #[tokio::test]
    async fn test_create_without_content() {
        let (svc, _dir) = service();
        let doc = svc.create(UserId::new(), "Empty", None).await.unwrap();
        assert_eq!(doc.blocks[0].content, "");
    }

    #[tokio::test]
    async fn test_find_one_missing() {
        let (svc, _dir) = service();
        let err = svc.find_one(DocumentId::new()).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_rename_keeps_version() {
        let (svc, _dir) = service();
        let doc = svc.create(UserId::new(), "Before", None).await.unwrap();

        let renamed = svc.rename(doc.id, "After").await.unwrap();
        assert_eq!(renamed.title, "After");
        assert_eq!(renamed.version, 0);
    }

    #[tokio::test]
    async fn test_rename_missing() {
        let (svc, _dir) = service();
        let err = svc.rename(DocumentId::new(), "x").await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_purges_both_stores() {
        let (svc, _dir) = service();
        let user = UserId::new();
        let doc = svc.create(user, "Doomed", Some("x")).await.unwrap();
        let block = doc.blocks[0].id;

        // Put something in the log first.
        let batch = OpBatch::new(doc.id, user, 0)
            .with_op(BlockOp::update(block, 0).with_content("y"));
        svc.apply_batch(batch).await.unwrap();
        assert_eq!(svc.block_history(doc.id, block, None).await.unwrap().len(), 1);

        svc.delete(doc.id).await.unwrap();

        let err = svc.find_one(doc.id).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
        // The inline purge ran before delete returned.
        assert!(svc.log.most_recent(doc.id, block, 10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_missing() {
        let (svc, _dir) = service();
        let err = svc.delete(DocumentId::new()).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    // ── Collaborators ───────────────────────────────────────────────────

    #[tokio::test]
    async fn test_collaborator_lifecycle() {
        let (svc, _dir) = service();
        let creator = UserId::new();
        let friend = UserId::new();
        let doc = svc.create(creator, "Shared", None).await.unwrap();

        let doc = svc.add_collaborator(doc.id, friend).await.unwrap();
        assert_eq!(doc.collaborator_ids, vec![friend]);

        let doc = svc.remove_collaborator(doc.id, friend).await.unwrap();
        assert!(doc.collaborator_ids.is_empty());
    }

    #[tokio::test]
    async fn test_creator_cannot_collaborate() {
        let (svc, _dir) = service();
        let creator = UserId::new();
        let doc = svc.create(creator, "Mine", None).await.unwrap();

        let err = svc.add_collaborator(doc.id, creator).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_duplicate_collaborator_rejected() {
        let (svc, _dir) = service();
        let friend = UserId::new();
        let doc = svc.create(UserId::new(), "Shared", None).await.unwrap();

        svc.add_collaborator(doc.id, friend).await.unwrap();
        let err = svc.add_collaborator(doc.id, friend).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_remove_unknown_collaborator() {
        let (svc, _dir) = service();
        let doc = svc.create(UserId::new(), "Shared", None).await.unwrap();

        let err = svc
            .remove_collaborator(doc.id, UserId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_for_user_spans_roles() {
        let (svc, _dir) = service();
        let author = UserId::new();
        let reader = UserId::new();

        let own = svc.create(author, "Own", None).await.unwrap();
        let shared = svc.create(reader, "Theirs", None).await.unwrap();
        svc.add_collaborator(shared.id, author).await.unwrap();
        svc.create(UserId::new(), "Unrelated", None).await.unwrap();

        let docs = svc.list_for_user(author).await.unwrap();
        let ids: Vec<DocumentId> = docs.iter().map(|d| d.id).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&own.id));
        assert!(ids.contains(&shared.id));
        // Blocks come loaded.
        assert!(docs.iter().all(|d| !d.blocks.is_empty()));
    }

    // ── Edits and history ───────────────────────────────────────────────

    #[tokio::test]
    async fn test_apply_batch_returns_refreshed_document() {
        let (svc, _dir) = service();
        let user = UserId::new();
        let doc = svc.create(user, "Plan", Some("Hello")).await.unwrap();
        let block = doc.blocks[0].id;

        let batch = OpBatch::new(doc.id, user, 0)
            .with_op(BlockOp::update(block, 0).with_content("Hello, world"));
        let updated = svc.apply_batch(batch).await.unwrap();

        assert_eq!(updated.version, 1);
        assert_eq!(updated.blocks[0].content, "Hello, world");
    }

    #[tokio::test]
    async fn test_block_history_newest_first() {
        let (svc, _dir) = service();
        let user = UserId::new();
        let doc = svc.create(user, "Plan", Some("v0")).await.unwrap();
        let block = doc.blocks[0].id;

        for (version, text) in [(0, "v1"), (1, "v2"), (2, "v3")] {
            let batch = OpBatch::new(doc.id, user, version)
                .with_op(BlockOp::update(block, version).with_content(text));
            svc.apply_batch(batch).await.unwrap();
            // Log keys end in millis; spacing keeps all three entries distinct.
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        let history = svc.block_history(doc.id, block, None).await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].operation.content.as_deref(), Some("v3"));
        assert_eq!(history[2].operation.content.as_deref(), Some("v1"));

        let one = svc.block_history(doc.id, block, Some(1)).await.unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].operation.content.as_deref(), Some("v3"));
    }

    #[tokio::test]
    async fn test_block_history_missing_document() {
        let (svc, _dir) = service();
        let err = svc
            .block_history(DocumentId::new(), BlockId::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    // ── Events ──────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_event_subscription() {
        let (svc, _dir) = service();
        let mut rx = svc.subscribe();
        let user = UserId::new();

        let doc = svc.create(user, "Plan", None).await.unwrap();
        match rx.try_recv().unwrap() {
            DocumentEvent::Created {
                document_id,
                creator_id,
            } => {
                assert_eq!(document_id, doc.id);
                assert_eq!(creator_id, user);
            }
            other => panic!("expected Created, got {other:?}"),
        }

        let block = doc.blocks[0].id;
        let batch = OpBatch::new(doc.id, user, 0)
            .with_op(BlockOp::update(block, 0).with_content("x"));
        svc.apply_batch(batch).await.unwrap();

        match rx.try_recv().unwrap() {
            DocumentEvent::BatchApplied {
                document_id,
                user_id,
                version,
                block_ids,
            } => {
                assert_eq!(document_id, doc.id);
                assert_eq!(user_id, user);
                assert_eq!(version, 1);
                assert_eq!(block_ids, vec![block]);
            }
            other => panic!("expected BatchApplied, got {other:?}"),
        }

        svc.delete(doc.id).await.unwrap();
        match rx.try_recv().unwrap() {
            DocumentEvent::Deleted { document_id } => assert_eq!(document_id, doc.id),
            other => panic!("expected Deleted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let (svc, _dir) = service();
        let user = UserId::new();

        let clone = svc.clone();
        let doc = clone.create(user, "Shared handle", None).await.unwrap();
        assert!(svc.find_one(doc.id).await.is_ok());
    }
}
