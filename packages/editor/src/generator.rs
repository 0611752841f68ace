//! Rebuilding a source buffer from records and their blocks.
//!
//! Output layout:
//! ```text
//! <preamble: everything outside the reordered blocks, in source order>
//!
//! // @META {...}          one per top-level mapped block, sorted by (y, x, id)
//! <block text>
//!
//! // @META {...}          records without a block
//! ```
//! Records of nested blocks stay where they are and are rewritten in place.
//! The result is run through the [`Formatter`].

use duplex_common::{Language, TextRange};
use duplex_meta::{removal_span, CodecError, MetaCodec, VisualMeta};
use duplex_parser::{Block, Formatter, FormattingStyle, Grammar};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, PartialEq)]
pub enum GenerateError {
    #[error("Block '{id}' has kind '{kind}', which has no {language} template")]
    UnknownBlockKind {
        id: String,
        kind: String,
        language: Language,
    },

    #[error(transparent)]
    Codec(#[from] CodecError),
}

pub type GenerateResult<T> = Result<T, GenerateError>;

/// Records and the blocks they are mapped to
#[derive(Debug, Clone, Copy)]
pub struct GenerateInput<'a> {
    pub source: &'a str,
    pub metas: &'a [VisualMeta],
    pub blocks: &'a [Block],
}

#[derive(Debug, Clone, Copy)]
pub struct Generator {
    language: Language,
    style: FormattingStyle,
    codec: MetaCodec,
}

/// A block placed in the output, with its current range in the working text
#[derive(Debug, Clone)]
struct Placed<'a> {
    meta: &'a VisualMeta,
    block: &'a Block,
    range: Option<TextRange>,
    top_level: bool,
}

impl Generator {
    pub fn new(language: Language) -> Self {
        Self {
            language,
            style: FormattingStyle::default(),
            codec: MetaCodec::new(language),
        }
    }

    pub fn with_style(mut self, style: FormattingStyle) -> Self {
        self.style = style;
        self
    }

    pub fn preserve_formatting(mut self, preserve: bool) -> Self {
        self.codec = self.codec.preserve_formatting(preserve);
        self
    }

    pub fn generate(&self, input: &GenerateInput) -> GenerateResult<String> {
        let grammar = Grammar::for_language(self.language);
        let source = input.source;

        let by_id: BTreeMap<&str, &VisualMeta> = input.metas.iter().map(|m| (m.id.as_str(), m)).collect();

        // first block per id wins
        let mut placed: Vec<Placed> = Vec::new();
        let mut seen = BTreeSet::new();
        for block in input.blocks {
            let Some(meta) = block.visual_id.as_deref().and_then(|id| by_id.get(id).copied()) else {
                continue;
            };
            if !seen.insert(meta.id.as_str()) {
                continue;
            }
            if grammar.template(&block.kind).is_none() {
                return Err(GenerateError::UnknownBlockKind {
                    id: meta.id.clone(),
                    kind: block.kind.clone(),
                    language: self.language,
                });
            }
            let in_bounds = block.range.slice(source).is_some();
            // only blocks outside every other block move; the rest ride along
            // with their enclosing block, mapped or not
            let top_level = !in_bounds
                || !input
                    .blocks
                    .iter()
                    .any(|other| other.range != block.range && other.range.covers(&block.range));
            placed.push(Placed {
                meta,
                block,
                range: in_bounds.then_some(block.range),
                top_level,
            });
        }

        let orphans: Vec<&VisualMeta> = input.metas.iter().filter(|m| !seen.contains(m.id.as_str())).collect();

        let moved: BTreeSet<&str> = placed
            .iter()
            .filter(|p| p.top_level)
            .map(|p| p.meta.id.as_str())
            .chain(orphans.iter().map(|m| m.id.as_str()))
            .collect();

        let mut text = source.to_string();
        self.strip_comments(&mut text, &moved, &by_id, &mut placed);
        self.rewrite_nested(&mut text, &mut placed)?;

        let mut units: Vec<&Placed> = placed.iter().filter(|p| p.top_level).collect();
        units.sort_by(|a, b| layout_order(a.meta, b.meta));

        let mut segments: Vec<(usize, TextRange)> = units
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.range.map(|r| (i, r)))
            .collect();
        segments.sort_by_key(|(_, r)| r.start);

        let mut snippets: Vec<Option<&str>> = vec![None; units.len()];
        let mut preamble = String::new();
        let mut pos = 0;
        for (i, range) in segments {
            let segment = self.segment(&text, range, pos);
            preamble.push_str(&text[pos..segment.start]);
            snippets[i] = Some(&text[segment.as_range()]);
            pos = segment.end;
        }
        preamble.push_str(&text[pos..]);

        let mut out = String::new();
        if !preamble.trim().is_empty() {
            out.push_str(preamble.trim());
            out.push_str("\n\n");
        }

        for (unit, snippet) in units.iter().zip(snippets) {
            out.push_str(&self.codec.comment_for(unit.meta)?);
            out.push('\n');
            match snippet {
                Some(snippet) => out.push_str(snippet.trim()),
                None => {
                    // range points outside the source; fall back to the kind's stub
                    let template = grammar.template(&unit.block.kind).ok_or_else(|| GenerateError::UnknownBlockKind {
                        id: unit.meta.id.clone(),
                        kind: unit.block.kind.clone(),
                        language: self.language,
                    })?;
                    out.push_str(&template.render(&identifier(&unit.meta.id)));
                }
            }
            out.push_str("\n\n");
        }

        let mut orphans = orphans;
        orphans.sort_by(|a, b| layout_order(a, b));
        for meta in orphans {
            out.push_str(&self.codec.comment_for(meta)?);
            out.push('\n');
        }

        debug!(
            language = %self.language,
            blocks = units.len(),
            "Generated source"
        );

        Ok(Formatter::new(self.language, self.style).format(&out))
    }

    /// Delete every comment of a record that will be re-emitted, and any
    /// duplicate comment of a known record
    fn strip_comments(
        &self,
        text: &mut String,
        moved: &BTreeSet<&str>,
        known: &BTreeMap<&str, &VisualMeta>,
        placed: &mut [Placed],
    ) {
        let scan = self.codec.scan(text);
        let mut spans: Vec<TextRange> = scan
            .entries
            .iter()
            .filter(|e| match e.meta() {
                Some(meta) => moved.contains(meta.id.as_str()) || (e.duplicate && known.contains_key(meta.id.as_str())),
                None => false,
            })
            .map(|e| removal_span(text, e.comment))
            .collect();
        spans.sort_by_key(|s| std::cmp::Reverse(s.start));

        for span in spans {
            text.replace_range(span.as_range(), "");
            shift(placed, span.start, span.len(), 0);
        }
    }

    /// Upsert the records of nested blocks, last block first
    fn rewrite_nested(&self, text: &mut String, placed: &mut [Placed]) -> GenerateResult<()> {
        let mut order: Vec<usize> = (0..placed.len())
            .filter(|&i| !placed[i].top_level && placed[i].range.is_some())
            .collect();
        order.sort_by_key(|&i| std::cmp::Reverse(placed[i].range.map(|r| r.start)));

        for i in order {
            let (meta, Some(range)) = (placed[i].meta, placed[i].range) else {
                continue;
            };
            let (at, removed) = match self.codec.scan(text).find(&meta.id) {
                Some(entry) => (entry.payload.start, entry.payload.len()),
                None => (line_start(text, range.start), 0),
            };
            let before = text.len();
            *text = self.codec.upsert(text, meta, Some(range))?;
            let inserted = removed + text.len() - before;
            shift(placed, at, removed, inserted);
        }

        Ok(())
    }

    /// The lines a top-level block occupies, with leading attributes,
    /// decorators and comments, never reaching back before `floor`
    fn segment(&self, text: &str, range: TextRange, floor: usize) -> TextRange {
        let mut start = line_start(text, range.start);
        if !text[start..range.start].trim().is_empty() {
            start = range.start;
        } else {
            while start > floor {
                let prev = line_start(text, start - 1);
                if prev < floor || !self.is_lead_line(text[prev..start].trim()) {
                    break;
                }
                start = prev;
            }
        }

        let line_end = text[range.end..].find('\n').map(|p| range.end + p).unwrap_or(text.len());
        let rest = text[range.end..line_end].trim();
        let end = if rest.is_empty() || rest.starts_with(self.language.comment_syntax().line) {
            (line_end + 1).min(text.len())
        } else {
            range.end
        };

        TextRange::new(start.max(floor), end)
    }

    /// Lines directly above a block that travel with it
    fn is_lead_line(&self, line: &str) -> bool {
        if line.is_empty() {
            return false;
        }
        let syntax = self.language.comment_syntax();
        if line.starts_with(syntax.line) {
            return true;
        }
        match self.language {
            Language::Rust => line.starts_with("#["),
            Language::Go => false,
            _ => line.starts_with('@'),
        }
    }
}

/// Generate with the default style
pub fn generate(language: Language, input: &GenerateInput) -> GenerateResult<String> {
    Generator::new(language).generate(input)
}

/// Canvas order: top to bottom, then left to right, then by id
fn layout_order(a: &VisualMeta, b: &VisualMeta) -> Ordering {
    a.y.total_cmp(&b.y)
        .then(a.x.total_cmp(&b.x))
        .then_with(|| a.id.cmp(&b.id))
}

fn line_start(text: &str, offset: usize) -> usize {
    text[..offset].rfind('\n').map(|p| p + 1).unwrap_or(0)
}

/// Adjust ranges after `removed` bytes at `at` were replaced by `inserted` bytes
fn shift(placed: &mut [Placed], at: usize, removed: usize, inserted: usize) {
    for p in placed.iter_mut() {
        if let Some(range) = &mut p.range {
            range.start = moved_offset(range.start, at, removed, inserted, true);
            range.end = moved_offset(range.end, at, removed, inserted, false);
        }
    }
}

fn moved_offset(offset: usize, at: usize, removed: usize, inserted: usize, is_start: bool) -> usize {
    let past = if is_start { offset >= at } else { offset > at };
    if !past {
        offset
    } else if offset < at + removed {
        at + inserted
    } else {
        offset - removed + inserted
    }
}

/// Source-safe name derived from a record id
fn identifier(id: &str) -> String {
    let mut name: String = id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert(0, '_');
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::ElementMapper;
    use duplex_meta::{read_all, scan};
    use duplex_parser::{kind, parse};

    fn mapped(source: &str, language: Language) -> (Vec<VisualMeta>, Vec<Block>) {
        let tree = parse(source, language);
        let scan = scan(source, language);
        let (mapping, _) = ElementMapper::default().map(source, &tree, &scan);
        (scan.metas(), mapping.blocks().to_vec())
    }

    fn comment(language: Language, meta: &VisualMeta) -> String {
        MetaCodec::new(language).comment_for(meta).unwrap()
    }

    #[test]
    fn test_blocks_are_ordered_by_canvas_position() {
        let source = "use std::fmt;\n\n// @META {\"id\":\"b\",\"x\":0,\"y\":10}\nfn b() {}\n\n// @META {\"id\":\"a\",\"x\":0,\"y\":0}\nfn a() {}\n";
        let (metas, blocks) = mapped(source, Language::Rust);

        let out = generate(Language::Rust, &GenerateInput { source, metas: &metas, blocks: &blocks }).unwrap();

        let a = metas.iter().find(|m| m.id == "a").unwrap();
        let b = metas.iter().find(|m| m.id == "b").unwrap();
        assert_eq!(
            out,
            format!(
                "use std::fmt;\n\n{}\nfn a() {{}}\n\n{}\nfn b() {{}}\n",
                comment(Language::Rust, a),
                comment(Language::Rust, b)
            )
        );
    }

    #[test]
    fn test_ties_break_on_x_then_id() {
        let metas = vec![
            VisualMeta::new("c", 5.0, 0.0),
            VisualMeta::new("b", 0.0, 0.0),
            VisualMeta::new("a", 5.0, 0.0),
        ];
        let out = generate(Language::Go, &GenerateInput { source: "", metas: &metas, blocks: &[] }).unwrap();
        let ids: Vec<String> = read_all(&out, Language::Go).0.into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_attributes_travel_with_their_block() {
        let source = "// @META {\"id\":\"p\",\"y\":5}\n#[derive(Debug)]\nstruct P {\n    x: i32,\n}\n\n// @META {\"id\":\"q\",\"y\":1}\nfn q() {}\n";
        let (metas, blocks) = mapped(source, Language::Rust);
        let out = generate(Language::Rust, &GenerateInput { source, metas: &metas, blocks: &blocks }).unwrap();

        let p = metas.iter().find(|m| m.id == "p").unwrap();
        assert!(out.ends_with(&format!("{}\n#[derive(Debug)]\nstruct P {{\n    x: i32,\n}}\n", comment(Language::Rust, p))));
        assert!(out.starts_with("// @META"));
    }

    #[test]
    fn test_nested_records_stay_in_place() {
        let source = "import os\n\n# @META {\"id\": \"cls\", \"x\": 0, \"y\": 50}\nclass A:\n    # @META {\"id\": \"m\", \"x\": 1, \"y\": 1}\n    def m(self):\n        return 1\n\n# @META {\"id\": \"top\", \"x\": 0, \"y\": 0}\ndef top():\n    pass\n";
        let (metas, blocks) = mapped(source, Language::Python);
        assert_eq!(metas.len(), 3);

        let out = generate(Language::Python, &GenerateInput { source, metas: &metas, blocks: &blocks }).unwrap();

        let top = out.find("def top").unwrap();
        let class = out.find("class A").unwrap();
        let method = out.find("    def m(self):").unwrap();
        assert!(out.starts_with("import os\n\n"));
        assert!(top < class && class < method);
        assert!(out.contains("    # @META {\"id\": \"m\", \"x\": 1.0, \"y\": 1.0"));

        let (mut reread, diagnostics) = read_all(&out, Language::Python);
        assert!(diagnostics.is_empty());
        let mut expected = metas.clone();
        reread.sort_by(|a, b| a.id.cmp(&b.id));
        expected.sort_by(|a, b| a.id.cmp(&b.id));
        assert_eq!(reread, expected);
    }

    #[test]
    fn test_mapped_block_inside_unmapped_block_stays_put() {
        let source = "impl A {\n    // @META {\"id\":\"m\",\"y\":-10}\n    fn m(&self) {}\n}\n\n// @META {\"id\":\"a\",\"y\":0}\nfn a() {}\n";
        let (metas, blocks) = mapped(source, Language::Rust);
        assert_eq!(metas.len(), 2);
        assert!(blocks.iter().any(|b| b.visual_id.as_deref() == Some("m")));

        let out = generate(Language::Rust, &GenerateInput { source, metas: &metas, blocks: &blocks }).unwrap();

        assert!(out.starts_with("impl A {\n    // @META {\"id\":\"m\""));
        assert!(out.contains("\n    fn m(&self) {}\n}\n\n// @META"));
        assert!(out.ends_with("\nfn a() {}\n"));
        assert_eq!(read_all(&out, Language::Rust).0.len(), 2);
    }

    #[test]
    fn test_orphans_are_appended() {
        let source = "// @META {\"id\":\"lost\",\"x\":3,\"y\":3}\nconst message = \"a string long enough to push the next block out of reach\";\n\nfunction f() {}\n";
        let (metas, blocks) = mapped(source, Language::JavaScript);
        let out = generate(Language::JavaScript, &GenerateInput { source, metas: &metas, blocks: &blocks }).unwrap();

        assert_eq!(
            out,
            format!(
                "const message = \"a string long enough to push the next block out of reach\";\n\nfunction f() {{}}\n\n{}\n",
                comment(Language::JavaScript, &metas[0])
            )
        );
    }

    #[test]
    fn test_unknown_kind_fails_with_id() {
        let metas = vec![VisualMeta::new("w", 0.0, 0.0)];
        let blocks = vec![Block::new("widget", TextRange::new(0, 4)).with_visual_id("w")];
        let result = generate(Language::Rust, &GenerateInput { source: "x();", metas: &metas, blocks: &blocks });
        assert_eq!(
            result,
            Err(GenerateError::UnknownBlockKind {
                id: "w".to_string(),
                kind: "widget".to_string(),
                language: Language::Rust,
            })
        );
    }

    #[test]
    fn test_out_of_range_block_uses_template() {
        let metas = vec![VisualMeta::new("node-1", 0.0, 0.0)];
        let blocks = vec![Block::new(kind::FUNCTION, TextRange::new(100, 120)).with_visual_id("node-1")];
        let out = generate(Language::Rust, &GenerateInput { source: "", metas: &metas, blocks: &blocks }).unwrap();
        assert_eq!(out, format!("{}\nfn node_1() {{\n}}\n", comment(Language::Rust, &metas[0])));
    }

    #[test]
    fn test_generation_is_a_fixed_point() {
        let source = "const z = 0;\n// @META {\"id\":\"b\",\"y\":2}\nclass B {\nm() { return 1; }\n}\n// @META {\"id\":\"a\",\"y\":1}\nfunction a() {\nif (z) {\nrun();\n}\n}\n";
        let (metas, blocks) = mapped(source, Language::TypeScript);
        let first = generate(Language::TypeScript, &GenerateInput { source, metas: &metas, blocks: &blocks }).unwrap();

        let (metas, blocks) = mapped(&first, Language::TypeScript);
        let second = generate(Language::TypeScript, &GenerateInput { source: &first, metas: &metas, blocks: &blocks }).unwrap();
        assert_eq!(first, second);
        assert!(first.contains("function a() {\n    if (z) {\n        run();\n    }\n}"));
    }

    #[test]
    fn test_identifier_sanitizing() {
        assert_eq!(identifier("3f-1"), "_3f_1");
        assert_eq!(identifier("ok_name"), "ok_name");
        assert_eq!(identifier(""), "_");
    }
}
