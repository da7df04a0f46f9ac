//! Shared identity, block, and operation types for orihon.
//!
//! This crate is the data-model foundation: typed IDs, blocks, documents,
//! and the operation/batch types clients submit. It has **no internal orihon
//! dependencies** and no I/O, a pure leaf crate the engine builds on.
//!
//! # Entity-Relationship Overview
//!
//! ```text
//! Document (DocumentId)
//!     └── created by User (UserId), immutable creator
//!     └── edited by collaborators (UserId set, creator excluded)
//!     └── owns Blocks (BlockId, ordered by `order`, cascade-deleted)
//!     └── version counts applied batches
//!
//! User (UserId) ← authenticated by the excluded HTTP/auth layer
//!     └── creates Document
//!     └── joins Document as collaborator
//!     └── submits OpBatch (ordered BlockOps + base versions)
//!
//! Block (BlockId) ← client-generated id for batch-created blocks
//!     └── version counts accepted updates
//! ```
//!
//! # Key Types
//!
//! |----------------|----------------------------------------------|
//! | Type           | Purpose                                      |
//! |----------------|----------------------------------------------|
//! | [`Document`]   | Aggregate returned by every service call     |
//! | [`Block`]      | Ordered, versioned unit of content           |
//! | [`BlockOp`]    | One client-intended action against one block |
//! | [`OpBatch`]    | Ordered submission, collapsible per block    |
//! | [`DocumentId`] | Which document                               |
//! | [`BlockId`]    | Which block (client-mintable for creates)    |
//! | [`UserId`]     | Who (creator or collaborator)                |
//! |----------------|----------------------------------------------|

pub mod block;
pub mod document;
pub mod ids;
pub mod ops;

// Re-export primary types at crate root for convenience.
pub use block::{Block, BlockKind};
pub use document::Document;
pub use ids::{BlockId, DocumentId, ParseIdError, UserId};
pub use ops::{BlockOp, OpBatch, OpKind};

/// Current time as Unix milliseconds. Used by constructors here and by the
/// engine's store stamps.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
