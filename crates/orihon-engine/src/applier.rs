//! The batch applier: collapse, resolve, apply, log.
//!
//! One batch flows through a fixed pipeline. Validation happens before any
//! store access. The batch collapses to its last operation per block. Update
//! conflicts are checked and all mutations applied inside a single document
//! store transaction, so the version a check reads is the version the apply
//! acts on. Only after that transaction commits are log entries written,
//! best-effort.

use std::collections::HashMap;

use tracing::{debug, warn};

use orihon_types::{BlockId, Document, OpBatch, OpKind};

use crate::config::EngineConfig;
use crate::document_db::{DocumentDb, StoreError};
use crate::error::{EngineError, Result};
use crate::oplog::{LogEntry, OpLogStore};
use crate::resolver::resolve_update;

/// What a successfully applied batch produced.
#[derive(Debug)]
pub struct BatchOutcome {
    /// The document reloaded after commit, blocks sorted by order.
    pub document: Document,
    /// Blocks whose update superseded a newer stored version.
    pub conflicted: Vec<BlockId>,
    /// Blocks the batch touched after collapsing, in first-touch order.
    pub touched: Vec<BlockId>,
}

/// Apply one batch end to end.
#[tracing::instrument(
    skip(db, log, config, batch),
    name = "docs.apply_batch",
    fields(document = %batch.document_id, user = %batch.user_id, ops = batch.len())
)]
pub fn apply_batch(
    db: &DocumentDb,
    log: &OpLogStore,
    config: &EngineConfig,
    batch: OpBatch,
) -> Result<BatchOutcome> {
    if batch.len() > config.max_batch_ops {
        return Err(EngineError::InvalidRequest(format!(
            "batch has {} operations, limit is {}",
            batch.len(),
            config.max_batch_ops
        )));
    }
    if batch.is_empty() {
        return Err(EngineError::InvalidRequest(
            "batch has no operations".into(),
        ));
    }
    if !db.document_exists(batch.document_id)? {
        return Err(EngineError::NotFound(format!(
            "document {}",
            batch.document_id
        )));
    }

    // Last writer per block; earlier ops on the same block are superseded.
    let collapsed = batch.collapse();

    // Advisory prefetch of the latest log entry per updated block. The log
    // never decides the outcome, so a failed read degrades to "no entry".
    let mut logged: HashMap<BlockId, LogEntry> = HashMap::new();
    for (block_id, op) in &collapsed {
        if op.kind != OpKind::Update {
            continue;
        }
        match log.most_recent(batch.document_id, *block_id, 1) {
            Ok(entries) => {
                if let Some(entry) = entries.into_iter().next() {
                    logged.insert(*block_id, entry);
                }
            }
            Err(e) => {
                warn!(block = %block_id, error = %e, "log lookup failed, resolving without it");
            }
        }
    }

    // Conflict check and apply share one transaction: the versions read here
    // are the versions the mutations land on.
    let mut conflicted: Vec<BlockId> = Vec::new();
    let committed_version = db.with_txn(|txn| {
        txn.document_version(batch.document_id)?
            .ok_or(StoreError::DocumentMissing(batch.document_id))?;

        for (block_id, op) in &collapsed {
            match op.kind {
                OpKind::Create => txn.create_from_op(batch.document_id, op)?,
                OpKind::Update => {
                    let stored = txn
                        .block_version(batch.document_id, *block_id)?
                        .ok_or(StoreError::BlockMissing(*block_id))?;
                    let resolution = resolve_update(op, stored, logged.get(block_id));
                    if resolution.conflicted {
                        debug!(
                            block = %block_id,
                            stored,
                            base = op.base_version,
                            superseded = resolution.superseded_content.as_deref().unwrap_or(""),
                            "stale update supersedes stored version"
                        );
                        conflicted.push(*block_id);
                    }
                    txn.update_from_op(batch.document_id, op)?;
                }
                OpKind::Delete => txn.delete_block(batch.document_id, *block_id)?,
                OpKind::Move => {
                    // A move without a target slot has nothing to change.
                    if let Some(order) = op.order {
                        txn.move_block(batch.document_id, *block_id, order)?;
                    }
                }
            }
        }

        txn.bump_document(batch.document_id)
    })?;

    // Write-through after commit. A log failure must not undo the committed
    // document change.
    let touched: Vec<BlockId> = collapsed.keys().copied().collect();
    let entries: Vec<LogEntry> = collapsed
        .into_iter()
        .map(|(_, op)| LogEntry::new(batch.document_id, batch.user_id, op, committed_version))
        .collect();
    if let Err(e) = log.put_batch(&entries) {
        warn!(
            document = %batch.document_id,
            entries = entries.len(),
            error = %e,
            "operation log write failed after commit, continuing"
        );
    }

    let document = db
        .load_document(batch.document_id)?
        .ok_or_else(|| EngineError::NotFound(format!("document {}", batch.document_id)))?;

    debug!(
        version = document.version,
        touched = touched.len(),
        conflicts = conflicted.len(),
        "batch applied"
    );

    Ok(BatchOutcome {
        document,
        conflicted,
        touched,
    })
}

// ============================================================================
// Tests
// ============================================================================
