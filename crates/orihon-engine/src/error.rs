//! Error taxonomy for the engine surface.
//!
//! The stores keep their own error enums; everything crossing the service
//! boundary is folded into the four [`EngineError`] categories here.

use thiserror::Error;

use crate::document_db::StoreError;
use crate::oplog::LogError;

/// Errors surfaced by the document service.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The addressed document, block, or collaborator does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The request is malformed or exceeds a configured limit.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The write collides with existing state (duplicate block create).
    #[error("conflict: {0}")]
    Conflict(String),

    /// A backing store failed or returned unusable data.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DocumentMissing(id) => Self::NotFound(format!("document {id}")),
            StoreError::BlockMissing(id) => Self::NotFound(format!("block {id}")),
            StoreError::BlockExists(id) => Self::Conflict(format!("block {id} already exists")),
            StoreError::AlreadyCollaborator(id) => {
                Self::InvalidRequest(format!("user {id} is already a collaborator"))
            }
            StoreError::CreatorCollaborator(id) => {
                Self::InvalidRequest(format!("user {id} is the document creator"))
            }
            StoreError::NotCollaborator(id) => Self::NotFound(format!("collaborator {id}")),
            StoreError::Corrupt(msg) => {
                Self::StoreUnavailable(format!("corrupt document store row: {msg}"))
            }
            StoreError::Sqlite(e) => Self::StoreUnavailable(e.to_string()),
        }
    }
}

impl From<LogError> for EngineError {
    fn from(e: LogError) -> Self {
        Self::StoreUnavailable(e.to_string())
    }
}
