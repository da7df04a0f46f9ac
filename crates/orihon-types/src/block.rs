//! Block model: the independently addressable unit of document content.
//!
//! A document is an ordered collection of blocks. Each block carries its own
//! version counter, bumped only by accepted `update` operations; `create`,
//! `move`, and `delete` never touch it. Ordering is by the integer `order`
//! field, which is a stable sort key, not a contiguous index: clients may
//! leave gaps (10, 20, 30) to insert between neighbors without renumbering.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::EnumString;

use crate::ids::BlockId;
use crate::now_millis;

/// What a block *is*: the rendering tag, not the mechanism.
///
/// Stored as lowercase snake_case text in both stores and on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum BlockKind {
    /// Plain markdown/text paragraph. The default for new blocks.
    #[default]
    Paragraph,
    /// Top-level heading.
    Heading1,
    /// Section heading.
    Heading2,
    /// Subsection heading.
    Heading3,
    /// Fenced code block.
    Code,
    /// Block quote.
    Quote,
    /// Unordered list item.
    BulletedList,
    /// Ordered list item.
    NumberedList,
    /// Checkbox item.
    Todo,
    /// Horizontal rule; content is ignored by renderers.
    Divider,
}

impl BlockKind {
    /// Parse from string (case-insensitive).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockKind::Paragraph => "paragraph",
            BlockKind::Heading1 => "heading1",
            BlockKind::Heading2 => "heading2",
            BlockKind::Heading3 => "heading3",
            BlockKind::Code => "code",
            BlockKind::Quote => "quote",
            BlockKind::BulletedList => "bulleted_list",
            BlockKind::NumberedList => "numbered_list",
            BlockKind::Todo => "todo",
            BlockKind::Divider => "divider",
        }
    }

    /// True for the heading levels.
    pub fn is_heading(&self) -> bool {
        matches!(
            self,
            BlockKind::Heading1 | BlockKind::Heading2 | BlockKind::Heading3
        )
    }
}

impl std::fmt::Display for BlockKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One block of an orihon document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// Client-generated for batch-created blocks, server-generated for the
    /// initial block of a new document. Unique within the document.
    pub id: BlockId,
    /// Rendering tag.
    #[serde(rename = "type")]
    pub kind: BlockKind,
    /// Markdown / plain text payload.
    pub content: String,
    /// Stable sort key within the document. Not required to be contiguous.
    pub order: i64,
    /// Bumped by exactly 1 per accepted `update`. Starts at 0.
    pub version: u64,
    /// Unix milliseconds.
    pub created_at: u64,
}

impl Block {
    /// A fresh block at version 0, stamped now.
    pub fn new(id: BlockId, kind: BlockKind, content: impl Into<String>, order: i64) -> Self {
        Self {
            id,
            kind,
            content: content.into(),
            order,
            version: 0,
            created_at: now_millis(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
