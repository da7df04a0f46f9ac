//! # orihon-engine
//!
//! Storage and edit pipeline for collaborative block documents.
//!
//! The engine owns two stores and the algorithm between them:
//! - The document store (SQLite) is the source of truth: documents, blocks,
//!   collaborators, all mutated transactionally
//! - The operation log (redb) records the most recent operations per block,
//!   advisory only: conflict diagnosis and audit, never current state
//! - Edits arrive as operation batches; each batch collapses to its last
//!   operation per block, is checked for version conflicts, applies atomically,
//!   and bumps the document version exactly once
//! - Conflicts resolve last-write-wins at block granularity: the arriving
//!   write supersedes the stored one, and the supersession is recorded
//!
//! [`DocumentService`] is the entry point; it is `Clone` and safe to share
//! across tasks.

pub mod applier;
pub mod config;
pub mod document_db;
pub mod error;
pub mod oplog;
pub mod resolver;
pub mod service;

pub use applier::{BatchOutcome, apply_batch};
pub use config::{ConfigError, EngineConfig};
pub use document_db::{DocumentDb, DocumentTxn, StoreError};
pub use error::{EngineError, Result};
pub use oplog::{CHUNK_SIZE, LogEntry, LogError, OpLogStore};
pub use resolver::{Resolution, resolve_update};
pub use service::{DocumentEvent, DocumentService};
