//! Block-granularity last-write-wins conflict resolution.
//!
//! An update conflicts when the stored block version has moved past the
//! version the writer based their edit on. Resolution never alters the
//! operation: the incoming write is applied as-is, and the verdict only
//! records that it superseded someone else's newer write. The operation
//! log is consulted as an advisory source for what got overwritten, not
//! as an input to the decision.

use orihon_types::BlockOp;

use crate::oplog::LogEntry;

/// Outcome of checking one update against the stored block state.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// True when the stored version had advanced past the incoming base.
    pub conflicted: bool,
    /// Content the superseded writer last logged, when the log had it.
    pub superseded_content: Option<String>,
}

impl Resolution {
    pub fn clean() -> Self {
        Self {
            conflicted: false,
            superseded_content: None,
        }
    }
}

/// Check one update op against the stored version, consulting the most
/// recent log entry for the block when there is one.
pub fn resolve_update(
    incoming: &BlockOp,
    stored_version: u64,
    logged: Option<&LogEntry>,
) -> Resolution {
    if stored_version <= incoming.base_version {
        return Resolution::clean();
    }

    Resolution {
        conflicted: true,
        superseded_content: logged.and_then(|e| e.operation.content.clone()),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use orihon_types::{BlockId, DocumentId, UserId};

    fn logged(content: Option<&str>) -> LogEntry {
        let block = BlockId::new();
        let mut op = BlockOp::update(block, 1);
        if let Some(c) = content {
            op = op.with_content(c);
        }
        LogEntry::new(DocumentId::new(), UserId::new(), op, 2)
    }

    #[test]
    fn test_clean_when_base_matches_stored() {
        let op = BlockOp::update(BlockId::new(), 3).with_content("x");
        let r = resolve_update(&op, 3, None);
        assert!(!r.conflicted);
        assert!(r.superseded_content.is_none());
    }

    #[test]
    fn test_clean_when_base_ahead_of_stored() {
        let op = BlockOp::update(BlockId::new(), 5).with_content("x");
        assert!(!resolve_update(&op, 3, None).conflicted);
    }

    #[test]
    fn test_conflict_when_stored_moved_past_base() {
        let op = BlockOp::update(BlockId::new(), 1).with_content("mine");
        let r = resolve_update(&op, 2, None);
        assert!(r.conflicted);
        assert!(r.superseded_content.is_none());
    }

    #[test]
    fn test_conflict_surfaces_logged_content() {
        let op = BlockOp::update(BlockId::new(), 0).with_content("mine");
        let r = resolve_update(&op, 4, Some(&logged(Some("theirs"))));
        assert!(r.conflicted);
        assert_eq!(r.superseded_content.as_deref(), Some("theirs"));
    }

    #[test]
    fn test_conflict_with_contentless_log_entry() {
        let op = BlockOp::update(BlockId::new(), 0).with_content("mine");
        let r = resolve_update(&op, 4, Some(&logged(None)));
        assert!(r.conflicted);
        assert!(r.superseded_content.is_none());
    }

    #[test]
    fn test_log_entry_ignored_when_clean() {
        let op = BlockOp::update(BlockId::new(), 7).with_content("mine");
        let r = resolve_update(&op, 7, Some(&logged(Some("theirs"))));
        assert!(!r.conflicted);
        assert!(r.superseded_content.is_none());
    }
}
