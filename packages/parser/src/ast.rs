use crate::error::ParseError;
use duplex_common::{Diagnostic, Language, TextRange};
use serde::{Deserialize, Serialize};

/// Element categories emitted by the structural parser
pub mod kind {
    pub const FUNCTION: &str = "function";
    pub const CONDITION: &str = "condition";
    pub const LOOP: &str = "loop";
    pub const MATCH: &str = "match";
    pub const SWITCH: &str = "switch";
    pub const TYPE: &str = "type";
    pub const TRAIT: &str = "trait";
    pub const IMPL: &str = "impl";
    pub const MODULE: &str = "module";
    pub const CLASS: &str = "class";
    pub const INTERFACE: &str = "interface";
    pub const CONTEXT: &str = "context";
    pub const TRY: &str = "try";
}

/// Named sub-range inside a block, matched against `VisualMeta::anchors`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anchor {
    pub name: String,
    pub range: TextRange,
}

/// One syntactic element extracted from source text
///
/// Blocks are rebuilt on every parse. Identity across parses comes only from
/// the metadata comment attached to the block by the element mapper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Metadata id, absent until a record is attached
    pub visual_id: Option<String>,
    pub kind: String,
    pub range: TextRange,
    pub anchors: Vec<Anchor>,
}

impl Block {
    pub fn new(kind: impl Into<String>, range: TextRange) -> Self {
        Self {
            visual_id: None,
            kind: kind.into(),
            range,
            anchors: Vec::new(),
        }
    }

    /// Copy of this block carrying `id`
    pub fn with_visual_id(&self, id: impl Into<String>) -> Self {
        Self {
            visual_id: Some(id.into()),
            ..self.clone()
        }
    }

    pub fn is_mapped(&self) -> bool {
        self.visual_id.is_some()
    }
}

/// Blocks of one parse, ordered by start offset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntaxTree {
    pub language: Language,
    pub blocks: Vec<Block>,
    /// Every comment in the buffer, in source order
    pub comments: Vec<TextRange>,
    /// Problems that made the tree partial
    pub errors: Vec<ParseError>,
}

impl SyntaxTree {
    pub fn new(language: Language) -> Self {
        Self {
            language,
            blocks: Vec::new(),
            comments: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// True when the whole buffer parsed without errors
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.errors.iter().map(ParseError::to_diagnostic).collect()
    }

    /// Innermost block covering `offset`
    pub fn block_at(&self, offset: usize) -> Option<&Block> {
        self.blocks
            .iter()
            .filter(|b| b.range.contains(offset))
            .min_by_key(|b| b.range.len())
    }

    /// True when `offset` lies inside a comment
    pub fn in_comment(&self, offset: usize) -> bool {
        let idx = self.comments.partition_point(|c| c.end <= offset);
        self.comments
            .get(idx)
            .map(|c| c.contains(offset))
            .unwrap_or(false)
    }

    /// Sort blocks by start, outer blocks before the blocks they contain
    pub(crate) fn sort_blocks(&mut self) {
        self.blocks
            .sort_by(|a, b| a.range.start.cmp(&b.range.start).then(b.range.end.cmp(&a.range.end)));
    }
}
