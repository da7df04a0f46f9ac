//! Document aggregate: metadata plus the ordered block collection.
//!
//! This is the shape every service call returns: callers always see a whole
//! document, never partial state. Blocks are sorted by `order` ascending
//! whenever a `Document` leaves the engine.

use serde::{Deserialize, Serialize};

use crate::block::Block;
use crate::ids::{BlockId, DocumentId, UserId};

/// A collaborative document: one creator, any number of collaborators, and an
/// ordered collection of blocks it exclusively owns.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Immutable, server-assigned at creation.
    pub id: DocumentId,
    pub title: String,
    /// Incremented exactly once per successfully applied batch. Starts at 0.
    pub version: u64,
    /// Owning user, immutable.
    pub creator_id: UserId,
    /// Users with edit rights besides the creator. Set semantics: the creator
    /// is never listed here, and no id appears twice.
    pub collaborator_ids: Vec<UserId>,
    /// Sorted by `order` ascending.
    pub blocks: Vec<Block>,
    /// Unix milliseconds.
    pub created_at: u64,
    /// Unix milliseconds; refreshed on every applied batch.
    pub updated_at: u64,
}

impl Document {
    /// Is this user the document's creator?
    pub fn is_creator(&self, user: UserId) -> bool {
        self.creator_id == user
    }

    /// Is this user in the collaborator set? (Creator is not a collaborator.)
    pub fn is_collaborator(&self, user: UserId) -> bool {
        self.collaborator_ids.contains(&user)
    }

    /// Look up a block by id.
    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.blocks.iter().find(|b| b.id == id)
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockKind;
    use crate::now_millis;

    fn sample() -> Document {
        let creator = UserId::new();
        Document {
            id: DocumentId::new(),
            title: "Plan".to_string(),
            version: 0,
            creator_id: creator,
            collaborator_ids: vec![],
            blocks: vec![Block::new(BlockId::new(), BlockKind::Paragraph, "Hello", 0)],
            created_at: now_millis(),
            updated_at: now_millis(),
        }
    }

    #[test]
    fn test_creator_is_not_collaborator() {
        let doc = sample();
        assert!(doc.is_creator(doc.creator_id));
        assert!(!doc.is_collaborator(doc.creator_id));
    }

    #[test]
    fn test_block_lookup() {
        let doc = sample();
        let id = doc.blocks[0].id;
        assert_eq!(doc.block(id).map(|b| b.content.as_str()), Some("Hello"));
        assert!(doc.block(BlockId::new()).is_none());
    }

    #[test]
    fn test_serde_wire_shape() {
        let doc = sample();
        let json = serde_json::to_value(&doc).unwrap();
        assert!(json.get("creatorId").is_some());
        assert!(json.get("collaboratorIds").is_some());
        assert!(json.get("updatedAt").is_some());
        assert!(json.get("creator_id").is_none());

        let back: Document = serde_json::from_value(json).unwrap();
        assert_eq!(back, doc);
    }
}
