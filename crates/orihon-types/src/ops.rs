//! Block operations and the submission batch.
//!
//! A [`BlockOp`] is the unit of client intent: one action against one block,
//! carrying the block version the client last observed (`base_version`) so
//! the engine can detect staleness. An [`OpBatch`] is the unit of submission:
//! an ordered sequence of operations applied together as one logical edit.
//!
//! Operations are transient and never persisted as-is. What survives
//! is their effect on the document store plus one log entry per *surviving*
//! operation after [`OpBatch::collapse`].

use std::str::FromStr;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strum::EnumString;

use crate::block::BlockKind;
use crate::ids::{BlockId, DocumentId, UserId};

/// What a block operation does.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum OpKind {
    /// Insert a new block with a client-generated id.
    Create,
    /// Replace content and/or type on an existing block. The only kind that
    /// is version-checked and the only kind that bumps the block version.
    Update,
    /// Remove the block. Absence is an error, not a no-op.
    Delete,
    /// Reposition the block (`order` only).
    Move,
}

impl OpKind {
    /// Parse from string (case-insensitive).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            OpKind::Create => "create",
            OpKind::Update => "update",
            OpKind::Delete => "delete",
            OpKind::Move => "move",
        }
    }
}

impl std::fmt::Display for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One client-intended action against one block.
///
/// The optional fields mean "not supplied", not "set to empty": an `update`
/// that omits `content` leaves the stored content untouched. Wire shape is
/// flat with a `type` discriminant, matching the payload the HTTP layer
/// validates and forwards.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockOp {
    pub block_id: BlockId,
    #[serde(rename = "type")]
    pub kind: OpKind,
    // No `skip_serializing_if` here: ops are embedded in postcard-encoded
    // log entries, and postcard cannot round-trip skipped fields.
    #[serde(default)]
    pub content: Option<String>,
    #[serde(rename = "blockType", default)]
    pub block_kind: Option<BlockKind>,
    #[serde(default)]
    pub order: Option<i64>,
    /// Block version the client last observed. Meaningful for `update` only.
    pub base_version: u64,
    /// Client-reported wall clock (RFC 3339 on the wire). Advisory; the
    /// engine assigns its own monotonic stamps when logging.
    pub timestamp: DateTime<Utc>,
}

impl BlockOp {
    /// A `create` op for a client-minted block id.
    pub fn create(block_id: BlockId) -> Self {
        Self::bare(block_id, OpKind::Create, 0)
    }

    /// An `update` op against the version the client last saw.
    pub fn update(block_id: BlockId, base_version: u64) -> Self {
        Self::bare(block_id, OpKind::Update, base_version)
    }

    /// A `delete` op.
    pub fn delete(block_id: BlockId) -> Self {
        Self::bare(block_id, OpKind::Delete, 0)
    }

    /// A `move` op to a new order slot.
    pub fn move_to(block_id: BlockId, order: i64) -> Self {
        let mut op = Self::bare(block_id, OpKind::Move, 0);
        op.order = Some(order);
        op
    }

    fn bare(block_id: BlockId, kind: OpKind, base_version: u64) -> Self {
        Self {
            block_id,
            kind,
            content: None,
            block_kind: None,
            order: None,
            base_version,
            timestamp: Utc::now(),
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_kind(mut self, kind: BlockKind) -> Self {
        self.block_kind = Some(kind);
        self
    }

    pub fn with_order(mut self, order: i64) -> Self {
        self.order = Some(order);
        self
    }
}

/// Ordered operations submitted together as one logical edit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpBatch {
    pub document_id: DocumentId,
    pub user_id: UserId,
    /// Document version the client last observed. Carried into log entries
    /// for audit; conflict checks are per-block (`BlockOp::base_version`).
    pub base_version: u64,
    #[serde(rename = "operations")]
    pub ops: Vec<BlockOp>,
}

impl OpBatch {
    /// Create an empty batch.
    pub fn new(document_id: DocumentId, user_id: UserId, base_version: u64) -> Self {
        Self {
            document_id,
            user_id,
            base_version,
            ops: Vec::new(),
        }
    }

    /// Add an operation to the batch.
    pub fn push(&mut self, op: BlockOp) {
        self.ops.push(op);
    }

    /// Builder-style push, for test and client construction.
    pub fn with_op(mut self, op: BlockOp) -> Self {
        self.ops.push(op);
        self
    }

    /// Check if the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Number of operations as submitted (before collapse).
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Collapse to last-writer-per-block: only the final operation touching
    /// each block id survives. Earlier operations on the same block are
    /// superseded; intra-batch history is deliberately not preserved.
    ///
    /// The map iterates in first-touch order (insert-or-replace keeps the
    /// original position), so distinct blocks keep their submission order.
    pub fn collapse(&self) -> IndexMap<BlockId, BlockOp> {
        let mut last = IndexMap::with_capacity(self.ops.len());
        for op in &self.ops {
            last.insert(op.block_id, op.clone());
        }
        last
    }
}

// ============================================================================
// Tests
// ============================================================================
