//! Reproducing the whitespace style of an existing payload.

use serde::Serialize;
use serde_json::ser::{CompactFormatter, Formatter, PrettyFormatter};
use serde_json::{Map, Value};
use std::io;

/// Whitespace style of a JSON payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JsonLayout {
    /// `{"a":1,"b":2}`
    Compact,
    /// `{"a": 1, "b": 2}`
    Spaced,
    /// One key per line. `base` is the indentation of the closing brace line,
    /// `indent` the extra indentation per nesting level.
    Pretty { indent: String, base: String },
}

impl JsonLayout {
    pub fn detect(payload: &str) -> Self {
        if payload.contains('\n') {
            let lines: Vec<&str> = payload.lines().collect();
            let base = lines.last().map(|l| leading_whitespace(l)).unwrap_or("");
            let first_entry = lines
                .iter()
                .skip(1)
                .find(|l| !l.trim().is_empty())
                .map(|l| leading_whitespace(l))
                .unwrap_or("");
            let indent = first_entry.strip_prefix(base).unwrap_or(first_entry);
            let indent = if indent.is_empty() { "  " } else { indent };
            return JsonLayout::Pretty {
                indent: indent.to_string(),
                base: base.to_string(),
            };
        }

        if colon_followed_by_space(payload) {
            JsonLayout::Spaced
        } else {
            JsonLayout::Compact
        }
    }

    pub fn write(&self, value: &Value) -> serde_json::Result<String> {
        match self {
            JsonLayout::Compact => to_string_with(value, CompactFormatter),
            JsonLayout::Spaced => to_string_with(value, SpacedFormatter),
            JsonLayout::Pretty { indent, base } => {
                let pretty = to_string_with(value, PrettyFormatter::with_indent(indent.as_bytes()))?;
                Ok(pretty.replace('\n', &format!("\n{}", base)))
            }
        }
    }
}

fn leading_whitespace(line: &str) -> &str {
    &line[..line.len() - line.trim_start().len()]
}

/// True when some `:` outside strings is followed by a space
fn colon_followed_by_space(payload: &str) -> bool {
    let mut in_string = false;
    let mut escaped = false;
    let mut chars = payload.chars().peekable();

    while let Some(c) = chars.next() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            ':' if chars.peek() == Some(&' ') => return true,
            _ => {}
        }
    }

    false
}

fn to_string_with<F: Formatter>(value: &Value, formatter: F) -> serde_json::Result<String> {
    let mut out = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    value.serialize(&mut serializer)?;
    // serde_json only writes valid UTF-8
    Ok(String::from_utf8_lossy(&out).into_owned())
}

/// Single-line output with a space after `:` and `,`
struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}

/// Rebuild `updated` with the key order of `original`
///
/// Keys present in both keep their original position, keys only in
/// `updated` are appended in their own order, keys only in `original` are
/// dropped.
pub fn merge_key_order(original: &Map<String, Value>, updated: Map<String, Value>) -> Map<String, Value> {
    let mut updated = updated;
    let mut merged = Map::new();

    for key in original.keys() {
        if let Some(value) = updated.remove(key) {
            merged.insert(key.clone(), value);
        }
    }
    for (key, value) in updated {
        merged.insert(key, value);
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_detect() {
        assert_eq!(JsonLayout::detect(r#"{"id":"a","x":0}"#), JsonLayout::Compact);
        assert_eq!(JsonLayout::detect(r#"{"id": "a", "x": 0}"#), JsonLayout::Spaced);
        assert_eq!(JsonLayout::detect(r#"{"id":"a: b"}"#), JsonLayout::Compact);
        assert_eq!(
            JsonLayout::detect("{\n      \"id\": \"a\"\n    }"),
            JsonLayout::Pretty {
                indent: "  ".to_string(),
                base: "    ".to_string()
            }
        );
    }

    #[test]
    fn test_write_spaced() {
        let value = json!({"id": "a", "tags": ["x", "y"], "ai": {"hints": []}});
        assert_eq!(
            JsonLayout::Spaced.write(&value).unwrap(),
            r#"{"id": "a", "tags": ["x", "y"], "ai": {"hints": []}}"#
        );
    }

    #[test]
    fn test_write_pretty_with_base_indent() {
        let layout = JsonLayout::Pretty {
            indent: "    ".to_string(),
            base: "  ".to_string(),
        };
        let value = json!({"id": "a", "x": 1});
        assert_eq!(
            layout.write(&value).unwrap(),
            "{\n      \"id\": \"a\",\n      \"x\": 1\n  }"
        );
    }

    #[test]
    fn test_merge_key_order() {
        let original = json!({"y": 0, "id": "a", "stale": true});
        let updated = json!({"id": "a", "x": 5, "y": 1});
        let merged = merge_key_order(
            original.as_object().unwrap(),
            updated.as_object().unwrap().clone(),
        );
        let keys: Vec<&str> = merged.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["y", "id", "x"]);
    }
}
