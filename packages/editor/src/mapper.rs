//! Joining parsed blocks to metadata records.
//!
//! A record attaches to a block when its comment sits right before the block
//! (only whitespace and other comments in between, or a gap of at most
//! `window` bytes such as an attribute line), or lies inside the block within
//! `window` bytes of its start. Markers are visited in source order and the
//! first marker to reach a block keeps it.

use duplex_common::{Diagnostic, DiagnosticCode, LineIndex, TextRange};
use duplex_meta::{MetaEntry, MetaScan, VisualMeta};
use duplex_parser::{Anchor, Block, SyntaxTree};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

pub const DEFAULT_WINDOW: usize = 64;

pub const ANCHOR_MARKER: &str = "@ANCHOR";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapperOptions {
    pub window: usize,
}

impl Default for MapperOptions {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
        }
    }
}

/// Mismatches between the text and the records, recomputed on every parse
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncDiagnostics {
    /// Records with no matching block
    pub orphaned_blocks: BTreeSet<String>,
    /// Blocks with no record
    pub unmapped_code: Vec<TextRange>,
    /// Parse errors, unreadable comments, duplicate ids and claims, missing anchors
    pub issues: Vec<Diagnostic>,
}

impl SyncDiagnostics {
    pub fn is_clean(&self) -> bool {
        self.orphaned_blocks.is_empty() && self.unmapped_code.is_empty() && self.issues.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(Diagnostic::is_error)
    }
}

/// Result of one mapping pass. Lookups never re-parse.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mapping {
    blocks: Vec<Block>,
    index: BTreeMap<String, usize>,
    lines: LineIndex,
}

impl Mapping {
    /// Every block of the parse, mapped ones carrying their id
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Mapped ids in sorted order
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.index.keys().map(String::as_str)
    }

    pub fn block(&self, id: &str) -> Option<&Block> {
        self.index.get(id).map(|&i| &self.blocks[i])
    }

    pub fn range_of(&self, id: &str) -> Option<TextRange> {
        self.block(id).map(|b| b.range)
    }

    /// Id of the innermost mapped block covering `offset`
    pub fn id_at(&self, offset: usize) -> Option<&str> {
        self.blocks
            .iter()
            .filter(|b| b.range.contains(offset))
            .filter_map(|b| b.visual_id.as_deref().map(|id| (b.range.len(), id)))
            .min_by_key(|(len, _)| *len)
            .map(|(_, id)| id)
    }

    /// `id_at` for a 0-based line and character column of `source`
    pub fn id_at_position(&self, source: &str, line: usize, column: usize) -> Option<&str> {
        let offset = self.lines.offset_of(source, line, column)?;
        self.id_at(offset)
    }

    pub fn unmapped(&self) -> impl Iterator<Item = &Block> {
        self.blocks.iter().filter(|b| !b.is_mapped())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ElementMapper {
    options: MapperOptions,
}

impl ElementMapper {
    pub fn new(options: MapperOptions) -> Self {
        Self { options }
    }

    pub fn map(&self, text: &str, tree: &SyntaxTree, scan: &MetaScan) -> (Mapping, SyncDiagnostics) {
        let mut blocks = tree.blocks.clone();
        let mut index = BTreeMap::new();
        let mut diagnostics = SyncDiagnostics {
            issues: tree.diagnostics(),
            ..Default::default()
        };
        diagnostics.issues.extend(scan.diagnostics.iter().cloned());

        for (entry, meta) in scan.live() {
            let Some(target) = self.attach(text, tree, entry) else {
                debug!(id = %meta.id, "No block for metadata record");
                diagnostics.orphaned_blocks.insert(meta.id.clone());
                continue;
            };

            if let Some(owner) = &blocks[target].visual_id {
                warn!(id = %meta.id, owner = %owner, "Block already claimed by an earlier record");
                diagnostics.issues.push(
                    Diagnostic::warning(
                        DiagnosticCode::DuplicateBlockClaim,
                        format!("'{}' describes the same block as '{}'", meta.id, owner),
                    )
                    .with_range(entry.comment)
                    .with_id(meta.id.clone()),
                );
                diagnostics.orphaned_blocks.insert(meta.id.clone());
                continue;
            }

            blocks[target].visual_id = Some(meta.id.clone());
            index.insert(meta.id.clone(), target);
        }

        for (_, meta) in scan.live() {
            if let Some(&i) = index.get(&meta.id) {
                let (anchors, missing) = resolve_anchors(text, tree, &blocks, i, meta);
                for name in missing {
                    warn!(id = %meta.id, anchor = %name, "Anchor not found in block");
                    diagnostics.issues.push(
                        Diagnostic::warning(
                            DiagnosticCode::MissingAnchor,
                            format!("anchor '{}' of '{}' has no @ANCHOR comment", name, meta.id),
                        )
                        .with_range(blocks[i].range)
                        .with_id(meta.id.clone()),
                    );
                }
                blocks[i].anchors = anchors;
            }
        }

        diagnostics.unmapped_code = blocks
            .iter()
            .filter(|b| !b.is_mapped())
            .map(|b| b.range)
            .collect();

        debug!(
            blocks = blocks.len(),
            mapped = index.len(),
            orphaned = diagnostics.orphaned_blocks.len(),
            unmapped = diagnostics.unmapped_code.len(),
            "Mapped blocks to metadata"
        );

        let mapping = Mapping {
            blocks,
            index,
            lines: LineIndex::new(text),
        };
        (mapping, diagnostics)
    }

    /// Index of the block `entry` describes
    fn attach(&self, text: &str, tree: &SyntaxTree, entry: &MetaEntry) -> Option<usize> {
        let comment = entry.comment;
        let enclosing = innermost_containing(tree, comment.start);

        let following = tree.blocks.iter().position(|b| b.range.start >= comment.end);
        if let Some(i) = following {
            let block = &tree.blocks[i];
            let stays_inside = enclosing
                .map(|e| tree.blocks[e].range.covers(&block.range))
                .unwrap_or(true);
            let close = block.range.start - comment.end <= self.options.window
                || only_trivia(text, tree, comment.end, block.range.start);
            if stays_inside && close {
                return Some(i);
            }
        }

        enclosing.filter(|&e| comment.start - tree.blocks[e].range.start <= self.options.window)
    }
}

fn innermost_containing(tree: &SyntaxTree, offset: usize) -> Option<usize> {
    tree.blocks
        .iter()
        .enumerate()
        .filter(|(_, b)| b.range.contains(offset))
        .min_by_key(|(_, b)| b.range.len())
        .map(|(i, _)| i)
}

/// True when `text[from..to]` holds only whitespace and comments
fn only_trivia(text: &str, tree: &SyntaxTree, from: usize, to: usize) -> bool {
    let mut pos = from;
    for comment in tree.comments.iter().filter(|c| c.start >= from && c.end <= to) {
        if !text[pos..comment.start].trim().is_empty() {
            return false;
        }
        pos = comment.end;
    }
    text[pos..to].trim().is_empty()
}

/// Name carried by an `@ANCHOR name` comment
fn anchor_name<'a>(text: &'a str, comment: TextRange) -> Option<&'a str> {
    let body = &text[comment.as_range()];
    let body = body
        .trim_start_matches(|c: char| matches!(c, '/' | '*' | '#' | '!'))
        .trim_start();
    let rest = body.strip_prefix(ANCHOR_MARKER)?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    rest.split_whitespace()
        .next()
        .map(|name| name.trim_end_matches("*/"))
        .filter(|name| !name.is_empty())
}

/// Range of the first code line after `comment`, bounded by `limit`
fn next_code_line(text: &str, tree: &SyntaxTree, comment: TextRange, limit: usize) -> TextRange {
    let mut line_start = match text[comment.end..limit].find('\n') {
        Some(p) => comment.end + p + 1,
        None => return comment,
    };

    while line_start < limit {
        let line_end = text[line_start..limit]
            .find('\n')
            .map(|p| line_start + p)
            .unwrap_or(limit);
        let line = &text[line_start..line_end];
        let indent = line.len() - line.trim_start().len();
        let code_start = line_start + indent;

        if !line.trim().is_empty() && !tree.in_comment(code_start) {
            return TextRange::new(code_start, line_start + line.trim_end().len());
        }
        line_start = line_end + 1;
    }

    comment
}

/// Resolve the anchors of the block at `target`, returning the names left over
fn resolve_anchors(
    text: &str,
    tree: &SyntaxTree,
    blocks: &[Block],
    target: usize,
    meta: &VisualMeta,
) -> (Vec<Anchor>, Vec<String>) {
    if meta.anchors.is_empty() {
        return (Vec::new(), Vec::new());
    }

    let range = blocks[target].range;
    let mut found: BTreeMap<&str, TextRange> = BTreeMap::new();

    for &comment in tree.comments.iter().filter(|c| range.covers(c)) {
        let Some(name) = anchor_name(text, comment) else {
            continue;
        };
        // belongs to a nested mapped block instead
        let owner = blocks
            .iter()
            .enumerate()
            .filter(|(_, b)| b.is_mapped() && b.range.covers(&comment))
            .min_by_key(|(_, b)| b.range.len())
            .map(|(i, _)| i);
        if owner != Some(target) {
            continue;
        }
        found
            .entry(name)
            .or_insert_with(|| next_code_line(text, tree, comment, range.end));
    }

    let mut anchors = Vec::new();
    let mut missing = Vec::new();
    for name in &meta.anchors {
        match found.get(name.as_str()) {
            Some(&range) => anchors.push(Anchor {
                name: name.clone(),
                range,
            }),
            None => missing.push(name.clone()),
        }
    }

    (anchors, missing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use duplex_common::Language;
    use duplex_meta::scan;
    use duplex_parser::parse;

    fn map(text: &str, language: Language) -> (Mapping, SyncDiagnostics) {
        let tree = parse(text, language);
        let scan = scan(text, language);
        ElementMapper::default().map(text, &tree, &scan)
    }

    #[test]
    fn test_marker_before_block() {
        let text = "// @META {id:a,x:0,y:0}\nfn f(){}";
        let (mapping, diagnostics) = map(text, Language::Rust);
        assert_eq!(mapping.blocks().len(), 1);
        assert_eq!(mapping.blocks()[0].visual_id.as_deref(), Some("a"));
        assert!(diagnostics.is_clean());
    }

    #[test]
    fn test_marker_skips_attributes_and_doc_comments() {
        let text = "// @META {\"id\":\"p\"}\n/// A point\n#[derive(Debug, Clone)]\npub struct Point {\n    x: i32,\n}\n";
        let (mapping, diagnostics) = map(text, Language::Rust);
        assert_eq!(mapping.range_of("p").map(|r| &text[r.as_range()]), Some("pub struct Point {\n    x: i32,\n}"));
        assert!(diagnostics.orphaned_blocks.is_empty());
    }

    #[test]
    fn test_marker_far_from_block_is_orphaned() {
        let filler = "let x = 1;\n".repeat(10);
        let text = format!("// @META {{\"id\":\"far\"}}\n{}fn f() {{}}\n", filler);
        let (mapping, diagnostics) = map(&text, Language::Rust);
        assert_eq!(mapping.range_of("far"), None);
        assert_eq!(diagnostics.orphaned_blocks.iter().collect::<Vec<_>>(), vec!["far"]);
        assert_eq!(diagnostics.unmapped_code.len(), 1);
    }

    #[test]
    fn test_marker_inside_block_near_start() {
        let text = "def f():\n    # @META {\"id\": \"f\"}\n    return 1\n";
        let (mapping, diagnostics) = map(text, Language::Python);
        assert_eq!(mapping.range_of("f"), Some(TextRange::new(0, text.len() - 1)));
        assert!(diagnostics.orphaned_blocks.is_empty());
    }

    #[test]
    fn test_marker_does_not_escape_enclosing_block() {
        let text = "fn f() {\n    let a = 1;\n    // @META {\"id\":\"x\"}\n}\nfn g() {}\n";
        let (mapping, _) = map(text, Language::Rust);
        assert_eq!(mapping.range_of("x").map(|r| r.start), Some(0));

        let filler = "    let a = 1;\n".repeat(6);
        let text = format!("fn f() {{\n{}    // @META {{\"id\":\"x\"}}\n}}\nfn g() {{}}\n", filler);
        let (mapping, diagnostics) = map(&text, Language::Rust);
        assert_eq!(mapping.range_of("x"), None);
        assert!(diagnostics.orphaned_blocks.contains("x"));
    }

    #[test]
    fn test_second_claim_is_reported_and_orphaned() {
        let text = "// @META {\"id\":\"a\"}\n// @META {\"id\":\"b\"}\nfn f() {}\n";
        let (mapping, diagnostics) = map(text, Language::Rust);
        assert_eq!(mapping.ids().collect::<Vec<_>>(), vec!["a"]);
        assert!(diagnostics.orphaned_blocks.contains("b"));
        assert_eq!(diagnostics.issues.len(), 1);
        assert_eq!(diagnostics.issues[0].code, DiagnosticCode::DuplicateBlockClaim);
        assert_eq!(diagnostics.issues[0].id.as_deref(), Some("b"));
    }

    #[test]
    fn test_id_lookups() {
        let text = "// @META {\"id\":\"outer\"}\nfn f() {\n    // @META {\"id\":\"inner\"}\n    if ok {\n        go();\n    }\n}\n";
        let (mapping, _) = map(text, Language::Rust);

        let call = text.find("go()").unwrap();
        assert_eq!(mapping.id_at(call), Some("inner"));
        assert_eq!(mapping.id_at(text.find("fn f").unwrap()), Some("outer"));
        assert_eq!(mapping.id_at(0), None);

        assert_eq!(mapping.id_at_position(text, 4, 8), Some("inner"));
        assert_eq!(mapping.id_at_position(text, 1, 0), Some("outer"));
        assert_eq!(mapping.id_at_position(text, 40, 0), None);
    }

    #[test]
    fn test_anchors_resolve_to_next_code_line() {
        let text = "// @META {\"id\":\"f\",\"anchors\":[\"setup\",\"gone\"]}\nfn f() {\n    // @ANCHOR setup\n\n    let a = 1;\n}\n";
        let (mapping, diagnostics) = map(text, Language::Rust);

        let block = mapping.block("f").unwrap();
        assert_eq!(block.anchors.len(), 1);
        assert_eq!(block.anchors[0].name, "setup");
        assert_eq!(&text[block.anchors[0].range.as_range()], "let a = 1;");

        assert_eq!(diagnostics.issues.len(), 1);
        assert_eq!(diagnostics.issues[0].code, DiagnosticCode::MissingAnchor);
        assert!(!diagnostics.issues[0].is_error());
    }

    #[test]
    fn test_parse_and_scan_problems_are_collected() {
        let text = "// @META {\"id\":\n// @META {\"id\":\"a\"}\nfn f() {\n";
        let (_, diagnostics) = map(text, Language::Rust);
        let codes: Vec<_> = diagnostics.issues.iter().map(|d| d.code).collect();
        assert!(codes.contains(&DiagnosticCode::ParseError));
        assert!(codes.contains(&DiagnosticCode::MetaDecodeError));
    }
}
