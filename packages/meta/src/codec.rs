//! Finding, decoding and rewriting `@META` comments.
//!
//! A metadata comment is any comment whose text (after its delimiters)
//! starts with the marker followed by one JSON object:
//! ```text
//! // @META {"id":"a","x":0.0,"y":0.0}
//! /* @META {"id": "b", "x": 10.0, "y": 20.0} */
//! # @META {id: c, x: 0, y: 0}
//! ```
//! All edits go through [`MetaCodec::upsert`] and [`MetaCodec::remove`], which
//! only ever touch the payload or the comment line of a single record.

use crate::error::{CodecError, CodecResult, DecodeError};
use crate::layout::{merge_key_order, JsonLayout};
use crate::model::VisualMeta;
use crate::relaxed;
use duplex_common::{Diagnostic, DiagnosticCode, Language, TextRange};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::{debug, warn};

pub const MARKER: &str = "@META";

/// Marker written by older releases, still accepted on read
pub const LEGACY_MARKER: &str = "@VISUAL_META";

/// One marker found in the buffer
#[derive(Debug, Clone, PartialEq)]
pub struct MetaEntry {
    /// The whole comment, delimiters included
    pub comment: TextRange,
    /// The JSON object inside the comment (empty when missing)
    pub payload: TextRange,
    pub result: Result<VisualMeta, DecodeError>,
    /// Another marker earlier in the buffer has the same id
    pub duplicate: bool,
}

impl MetaEntry {
    pub fn meta(&self) -> Option<&VisualMeta> {
        self.result.as_ref().ok()
    }

    /// Decoded and the first marker for its id
    pub fn is_live(&self) -> bool {
        self.result.is_ok() && !self.duplicate
    }
}

/// Every marker in a buffer plus the problems found reading them
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetaScan {
    pub entries: Vec<MetaEntry>,
    pub diagnostics: Vec<Diagnostic>,
}

impl MetaScan {
    /// Records in source order, first occurrence of each id only
    pub fn metas(&self) -> Vec<VisualMeta> {
        self.live().map(|(_, meta)| meta.clone()).collect()
    }

    pub fn live(&self) -> impl Iterator<Item = (&MetaEntry, &VisualMeta)> {
        self.entries
            .iter()
            .filter(|e| !e.duplicate)
            .filter_map(|e| e.meta().map(|m| (e, m)))
    }

    /// The authoritative entry for `id`
    pub fn find(&self, id: &str) -> Option<&MetaEntry> {
        self.live().find(|(_, m)| m.id == id).map(|(e, _)| e)
    }
}

/// Decode a payload, strictly first and leniently if that fails
pub fn decode(payload: &str) -> Result<VisualMeta, DecodeError> {
    let value = match serde_json::from_str::<Value>(payload) {
        Ok(value) => value,
        Err(strict) => relaxed::parse(payload).ok_or_else(|| DecodeError::Syntax(strict.to_string()))?,
    };

    let Value::Object(map) = &value else {
        return Err(DecodeError::NotAnObject);
    };
    match map.get("id") {
        Some(Value::String(id)) if !id.trim().is_empty() => {}
        None | Some(Value::Null) | Some(Value::String(_)) => return Err(DecodeError::MissingId),
        Some(_) => return Err(DecodeError::InvalidField("id must be a string".to_string())),
    }

    let mut meta: VisualMeta = serde_json::from_value(value).map_err(|e| DecodeError::InvalidField(e.to_string()))?;
    // versions start at 1
    meta.version = meta.version.max(1);
    Ok(meta)
}

/// Reads and writes metadata comments for one language
#[derive(Debug, Clone, Copy)]
pub struct MetaCodec {
    language: Language,
    preserve_formatting: bool,
}

impl MetaCodec {
    pub fn new(language: Language) -> Self {
        Self {
            language,
            preserve_formatting: true,
        }
    }

    /// Keep key order and whitespace of existing payloads on rewrite
    pub fn preserve_formatting(mut self, preserve: bool) -> Self {
        self.preserve_formatting = preserve;
        self
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn scan(&self, text: &str) -> MetaScan {
        let mut scan = MetaScan::default();
        let mut first_seen: HashMap<String, TextRange> = HashMap::new();

        for comment in duplex_parser::comments(text, self.language) {
            let Some(marker) = locate_marker(text, comment) else {
                continue;
            };

            let (payload, result) = match marker.payload {
                Some(range) => (range, decode(&text[range.as_range()])),
                None => (TextRange::empty(marker.end), Err(DecodeError::MissingPayload)),
            };

            let mut duplicate = false;
            match &result {
                Err(err) => {
                    warn!(range = %payload, error = %err, "Skipping malformed metadata comment");
                    scan.diagnostics.push(
                        Diagnostic::warning(
                            DiagnosticCode::MetaDecodeError,
                            format!("skipped metadata comment: {}", err),
                        )
                        .with_range(payload),
                    );
                }
                Ok(meta) => match first_seen.get(&meta.id) {
                    Some(first) => {
                        duplicate = true;
                        scan.diagnostics.push(
                            Diagnostic::error(
                                DiagnosticCode::DuplicateIdError,
                                format!("duplicate metadata id '{}' (first defined at {})", meta.id, first),
                            )
                            .with_range(comment)
                            .with_id(meta.id.clone()),
                        );
                    }
                    None => {
                        first_seen.insert(meta.id.clone(), comment);
                    }
                },
            }

            scan.entries.push(MetaEntry {
                comment,
                payload,
                result,
                duplicate,
            });
        }

        debug!(
            language = %self.language,
            markers = scan.entries.len(),
            problems = scan.diagnostics.len(),
            "Scanned metadata comments"
        );

        scan
    }

    /// Records in source order (first occurrence per id) and the problems found
    pub fn read_all(&self, text: &str) -> (Vec<VisualMeta>, Vec<Diagnostic>) {
        let scan = self.scan(text);
        (scan.metas(), scan.diagnostics)
    }

    /// Write `meta` into `text`
    ///
    /// Rewrites the payload of the first comment carrying `meta.id`. When no
    /// such comment exists a new line comment is inserted on the line before
    /// `near` (indented like that line), or appended at end of file.
    pub fn upsert(&self, text: &str, meta: &VisualMeta, near: Option<TextRange>) -> CodecResult<String> {
        validate(meta)?;
        let scan = self.scan(text);

        if let Some(entry) = scan.find(&meta.id) {
            let payload = self.rewrite_payload(text, entry, meta)?;
            let mut out = String::with_capacity(text.len() + payload.len());
            out.push_str(&text[..entry.payload.start]);
            out.push_str(&payload);
            out.push_str(&text[entry.payload.end..]);
            debug!(id = %meta.id, "Rewrote metadata comment");
            return Ok(out);
        }

        let comment = self.comment_for(meta)?;
        let out = match near {
            Some(range) => insert_before_line(text, range, &comment)?,
            None => append_line(text, &comment),
        };
        debug!(id = %meta.id, "Inserted metadata comment");
        Ok(out)
    }

    /// Delete every comment carrying `id`, together with its line when the
    /// comment is alone on it
    pub fn remove(&self, text: &str, id: &str) -> String {
        let scan = self.scan(text);
        let targets: Vec<TextRange> = scan
            .entries
            .iter()
            .filter(|e| e.meta().map(|m| m.id == id).unwrap_or(false))
            .map(|e| e.comment)
            .collect();

        let mut out = text.to_string();
        for comment in targets.iter().rev() {
            out.replace_range(removal_span(text, *comment).as_range(), "");
        }

        if !targets.is_empty() {
            debug!(id = %id, removed = targets.len(), "Removed metadata comment");
        }
        out
    }

    /// Canonical compact payload
    pub fn encode(&self, meta: &VisualMeta) -> CodecResult<String> {
        validate(meta)?;
        let map = to_map(meta)?;
        JsonLayout::Compact
            .write(&Value::Object(map))
            .map_err(|e| encode_error(meta, e))
    }

    /// A complete line comment for `meta`, without indentation or newline
    pub fn comment_for(&self, meta: &VisualMeta) -> CodecResult<String> {
        let payload = self.encode(meta)?;
        Ok(format!("{} {} {}", self.language.comment_syntax().line, MARKER, payload))
    }

    fn rewrite_payload(&self, text: &str, entry: &MetaEntry, meta: &VisualMeta) -> CodecResult<String> {
        let original = &text[entry.payload.as_range()];
        let mut map = to_map(meta)?;

        let layout = if self.preserve_formatting {
            if let Some(Value::Object(original_map)) = parse_any(original) {
                map = merge_key_order(&original_map, map);
            }
            JsonLayout::detect(original)
        } else {
            JsonLayout::Compact
        };

        let payload = layout
            .write(&Value::Object(map))
            .map_err(|e| encode_error(meta, e))?;

        let in_block_comment = self
            .language
            .comment_syntax()
            .block
            .map(|(open, _)| text[entry.comment.as_range()].starts_with(open))
            .unwrap_or(false);

        Ok(if in_block_comment {
            payload.replace("*/", "*\\/")
        } else {
            payload
        })
    }
}

pub fn scan(text: &str, language: Language) -> MetaScan {
    MetaCodec::new(language).scan(text)
}

pub fn read_all(text: &str, language: Language) -> (Vec<VisualMeta>, Vec<Diagnostic>) {
    MetaCodec::new(language).read_all(text)
}

pub fn upsert(text: &str, language: Language, meta: &VisualMeta) -> CodecResult<String> {
    MetaCodec::new(language).upsert(text, meta, None)
}

pub fn remove(text: &str, language: Language, id: &str) -> String {
    MetaCodec::new(language).remove(text, id)
}

fn validate(meta: &VisualMeta) -> CodecResult<()> {
    if meta.id.trim().is_empty() {
        return Err(CodecError::EmptyId);
    }
    if !meta.has_finite_position() {
        return Err(CodecError::NonFiniteCoordinates {
            id: meta.id.clone(),
            x: meta.x,
            y: meta.y,
        });
    }
    Ok(())
}

fn to_map(meta: &VisualMeta) -> CodecResult<Map<String, Value>> {
    match serde_json::to_value(meta) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(CodecError::Encode {
            id: meta.id.clone(),
            message: "record did not serialize to an object".to_string(),
        }),
        Err(e) => Err(encode_error(meta, e)),
    }
}

fn encode_error(meta: &VisualMeta, error: serde_json::Error) -> CodecError {
    CodecError::Encode {
        id: meta.id.clone(),
        message: error.to_string(),
    }
}

fn parse_any(payload: &str) -> Option<Value> {
    serde_json::from_str(payload)
        .ok()
        .or_else(|| relaxed::parse(payload))
}

struct Marker {
    /// Offset just past the marker word
    end: usize,
    payload: Option<TextRange>,
}

/// Find the marker at the start of a comment and the object that follows it
fn locate_marker(text: &str, comment: TextRange) -> Option<Marker> {
    let body = &text[comment.as_range()];
    let lead = body
        .find(|c: char| !matches!(c, '/' | '*' | '#' | '!' | ' ' | '\t'))
        .unwrap_or(body.len());
    let rest = &body[lead..];

    let marker_len = [LEGACY_MARKER, MARKER]
        .iter()
        .find(|m| rest.starts_with(**m))
        .map(|m| m.len())?;

    let after = &rest[marker_len..];
    if !after.is_empty() && !after.starts_with(|c: char| c.is_whitespace() || c == '{') {
        return None;
    }

    let end = comment.start + lead + marker_len;
    let open = after.find(|c: char| !c.is_whitespace());
    let payload = open
        .filter(|&i| after[i..].starts_with('{'))
        .map(|i| {
            let start = end + i;
            let len = matching_brace(&text[start..comment.end]).unwrap_or_else(|| {
                // unterminated object: hand everything to the decoder
                body_end(text, comment) - start
            });
            TextRange::new(start, start + len)
        });

    Some(Marker { end, payload })
}

/// Length of the `{ ... }` object at the start of `s`, braces included
fn matching_brace(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (i, c) in s.char_indices() {
        if let Some(q) = quote {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                c if c == q => quote = None,
                _ => {}
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }

    None
}

/// End of a comment's content, before a closing `*/`
fn body_end(text: &str, comment: TextRange) -> usize {
    let body = &text[comment.as_range()];
    if body.starts_with("/*") && body.ends_with("*/") && body.len() >= 4 {
        comment.end - 2
    } else {
        comment.end
    }
}

/// Leading whitespace of the line containing `offset`
fn line_indent(text: &str, line_start: usize, offset: usize) -> &str {
    let line = &text[line_start..offset];
    &line[..line.len() - line.trim_start().len()]
}

fn insert_before_line(text: &str, range: TextRange, comment: &str) -> CodecResult<String> {
    if range.start > text.len() || !text.is_char_boundary(range.start) {
        return Err(CodecError::RangeOutOfBounds { range });
    }

    let line_start = text[..range.start].rfind('\n').map(|p| p + 1).unwrap_or(0);
    let indent = line_indent(text, line_start, range.start);

    let mut out = String::with_capacity(text.len() + comment.len() + indent.len() + 1);
    out.push_str(&text[..line_start]);
    out.push_str(indent);
    out.push_str(comment);
    out.push('\n');
    out.push_str(&text[line_start..]);
    Ok(out)
}

fn append_line(text: &str, comment: &str) -> String {
    let mut out = String::with_capacity(text.len() + comment.len() + 2);
    out.push_str(text);
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(comment);
    out.push('\n');
    out
}

/// What to cut when deleting `comment`: its whole line when nothing else is
/// on it, otherwise the comment and the spaces before it
pub fn removal_span(text: &str, comment: TextRange) -> TextRange {
    let line_start = text[..comment.start].rfind('\n').map(|p| p + 1).unwrap_or(0);
    let line_end = text[comment.end..]
        .find('\n')
        .map(|p| comment.end + p)
        .unwrap_or(text.len());

    let before = &text[line_start..comment.start];
    let after = &text[comment.end..line_end];

    if before.trim().is_empty() && after.trim().is_empty() {
        let end = if line_end < text.len() { line_end + 1 } else { line_end };
        TextRange::new(line_start, end)
    } else {
        let start = comment.start - (before.len() - before.trim_end().len());
        TextRange::new(start, comment.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn rust() -> MetaCodec {
        MetaCodec::new(Language::Rust)
    }

    #[test]
    fn test_decode_strict_and_relaxed() {
        let strict = decode(r#"{"id":"a","x":1.5,"y":2}"#).unwrap();
        assert_eq!((strict.id.as_str(), strict.x, strict.y), ("a", 1.5, 2.0));

        let relaxed = decode("{id:a,x:0,y:0}").unwrap();
        assert_eq!(relaxed.id, "a");
        assert_eq!(relaxed.version, 1);
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(decode("{\"id\":"), Err(DecodeError::Syntax(_))));
        assert_eq!(decode("[1, 2]"), Err(DecodeError::NotAnObject));
        assert_eq!(decode(r#"{"x": 1}"#), Err(DecodeError::MissingId));
        assert_eq!(decode(r#"{"id": ""}"#), Err(DecodeError::MissingId));
        assert!(matches!(decode(r#"{"id": 7}"#), Err(DecodeError::InvalidField(_))));
        assert!(matches!(
            decode(r#"{"id": "a", "x": "far"}"#),
            Err(DecodeError::InvalidField(_))
        ));
    }

    #[test]
    fn test_scan_finds_markers_in_all_comment_forms() {
        let text = "// @META {\"id\":\"a\"}\n/* @META {\"id\":\"b\"} */\n/// @VISUAL_META {id: c}\n// @METADATA is not a marker\nfn f() {}\n";
        let scan = rust().scan(text);
        let ids: Vec<String> = scan.metas().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert!(scan.diagnostics.is_empty());
        assert_eq!(&text[scan.entries[1].payload.as_range()], "{\"id\":\"b\"}");
    }

    #[test]
    fn test_markers_inside_strings_are_ignored() {
        let text = "let s = \"// @META {\\\"id\\\":\\\"a\\\"}\";\n";
        assert!(rust().scan(text).entries.is_empty());
    }

    #[test]
    fn test_malformed_payload_is_a_warning() {
        let text = "// @META {\"id\": \n// @META\n// @META {\"id\":\"ok\"}\n";
        let (metas, diagnostics) = rust().read_all(text);
        assert_eq!(metas.len(), 1);
        assert_eq!(diagnostics.len(), 2);
        assert!(diagnostics
            .iter()
            .all(|d| d.code == DiagnosticCode::MetaDecodeError && !d.is_error()));
    }

    #[test]
    fn test_upsert_preserves_compact_layout_and_key_order() {
        let text = "// @META {\"y\":0.0,\"id\":\"a\",\"x\":0.0}\nfn f() {}\n";
        let meta = VisualMeta::new("a", 5.0, 6.0).with_tag("hot");
        let out = rust().upsert(text, &meta, None).unwrap();
        assert_eq!(
            out,
            "// @META {\"y\":6.0,\"id\":\"a\",\"x\":5.0,\"version\":1,\"tags\":[\"hot\"],\"updated_at\":\"1970-01-01T00:00:00Z\"}\nfn f() {}\n"
        );
    }

    #[test]
    fn test_upsert_preserves_spaced_layout() {
        let text = "/* @META {\"id\": \"a\", \"x\": 0.0, \"y\": 0.0} */";
        let meta = VisualMeta::new("a", 1.0, 2.0);
        let out = rust().upsert(text, &meta, None).unwrap();
        assert!(out.starts_with("/* @META {\"id\": \"a\", \"x\": 1.0, \"y\": 2.0, \"version\": 1"));
        assert!(out.ends_with("} */"));
    }

    #[test]
    fn test_upsert_preserves_pretty_layout() {
        let text = "fn f() {\n    /* @META {\n      \"id\": \"a\",\n      \"x\": 0.0\n    } */\n}\n";
        let meta = VisualMeta::new("a", 3.0, 0.0);
        let out = rust().upsert(text, &meta, None).unwrap();
        assert!(out.contains("{\n      \"id\": \"a\",\n      \"x\": 3.0,\n      \"version\": 1,"));
        assert!(out.contains("\n    } */\n}\n"));
        assert_eq!(rust().read_all(&out).0, vec![meta]);
    }

    #[test]
    fn test_upsert_without_preservation_is_canonical() {
        let text = "# @META {id: a, x: 0, y: 0, extra: yes}\n";
        let codec = MetaCodec::new(Language::Python).preserve_formatting(false);
        let mut meta = codec.read_all(text).0.remove(0);
        meta.x = 1.0;
        let out = codec.upsert(text, &meta, None).unwrap();
        assert_eq!(
            out,
            "# @META {\"version\":1,\"id\":\"a\",\"x\":1.0,\"y\":0.0,\"updated_at\":\"1970-01-01T00:00:00Z\",\"extra\":\"yes\"}\n"
        );
    }

    #[test]
    fn test_upsert_escapes_block_comment_terminator() {
        let text = "/* @META {\"id\":\"a\"} */\nfn f() {}\n";
        let meta = VisualMeta::new("a", 0.0, 0.0).with_tag("a*/b");
        let out = rust().upsert(text, &meta, None).unwrap();
        assert!(out.contains("a*\\/b"));
        let (metas, diagnostics) = rust().read_all(&out);
        assert!(diagnostics.is_empty());
        assert!(metas[0].tags.contains("a*/b"));
    }

    #[test]
    fn test_upsert_appends_at_end_of_file() {
        let meta = VisualMeta::new("new", 0.0, 0.0)
            .with_updated_at(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let out = rust().upsert("fn f() {}", &meta, None).unwrap();
        assert_eq!(
            out,
            "fn f() {}\n// @META {\"version\":1,\"id\":\"new\",\"x\":0.0,\"y\":0.0,\"updated_at\":\"2024-01-01T00:00:00Z\"}\n"
        );
    }

    #[test]
    fn test_upsert_inserts_before_range_with_indent() {
        let text = "impl A {\n    fn f() {}\n}\n";
        let start = text.find("fn").unwrap();
        let range = TextRange::new(start, start + 10);
        let out = rust()
            .upsert(text, &VisualMeta::new("f", 0.0, 0.0), Some(range))
            .unwrap();
        assert!(out.starts_with("impl A {\n    // @META {\"version\":1,\"id\":\"f\""));
        assert!(out.ends_with("}\n    fn f() {}\n}\n"));
    }

    #[test]
    fn test_upsert_never_creates_second_match() {
        let text = "// @META {\"id\":\"a\",\"x\":0}\n// @META {\"id\":\"a\",\"x\":9}\n";
        let out = rust().upsert(text, &VisualMeta::new("a", 1.0, 0.0), None).unwrap();
        let scan = rust().scan(&out);
        assert_eq!(scan.entries.len(), 2);
        assert_eq!(scan.metas()[0].x, 1.0);
        assert!(out.ends_with("// @META {\"id\":\"a\",\"x\":9}\n"));
    }

    #[test]
    fn test_upsert_rejects_invalid_records() {
        assert_eq!(
            rust().upsert("", &VisualMeta::new(" ", 0.0, 0.0), None),
            Err(CodecError::EmptyId)
        );
        assert!(matches!(
            rust().upsert("", &VisualMeta::new("a", f64::NAN, 0.0), None),
            Err(CodecError::NonFiniteCoordinates { .. })
        ));
        assert!(matches!(
            rust().upsert("x", &VisualMeta::new("a", 0.0, 0.0), Some(TextRange::new(5, 6))),
            Err(CodecError::RangeOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_remove_whole_line_and_trailing_comment() {
        let text = "// @META {\"id\":\"a\"}\nfn f() {} // @META {\"id\":\"b\"}\nfn g() {}\n";
        let without_a = rust().remove(text, "a");
        assert_eq!(without_a, "fn f() {} // @META {\"id\":\"b\"}\nfn g() {}\n");
        assert_eq!(rust().remove(&without_a, "b"), "fn f() {}\nfn g() {}\n");
        assert_eq!(rust().remove(text, "missing"), text);
    }
}
