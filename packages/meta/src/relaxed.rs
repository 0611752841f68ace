//! Lenient reader for hand-written payloads.
//!
//! Accepts what people type into comments but strict JSON rejects:
//! ```text
//! {id: a, x: 0, y: 0, tags: [demo, 'two words'],}
//! ```
//! Object entries and array items are split on commas at nesting depth zero,
//! then each value is sniffed: nested object, array, quoted string, literal,
//! number, and finally a bare word taken as a string.

use serde_json::{Map, Number, Value};

/// Parse a relaxed payload, `None` if it is not even loosely an object/value
pub fn parse(input: &str) -> Option<Value> {
    parse_value(input.trim())
}

fn parse_value(s: &str) -> Option<Value> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if let Some(inner) = s.strip_prefix('{').and_then(|r| r.strip_suffix('}')) {
        return parse_object(inner);
    }

    if let Some(inner) = s.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
        let items = split_at_depth_zero(inner, ',')?
            .iter()
            .filter(|item| !item.is_empty())
            .map(|item| parse_value(item))
            .collect::<Option<Vec<_>>>()?;
        return Some(Value::Array(items));
    }

    if let Some(text) = unquote(s) {
        return Some(Value::String(text?));
    }

    match s {
        "true" => return Some(Value::Bool(true)),
        "false" => return Some(Value::Bool(false)),
        "null" => return Some(Value::Null),
        _ => {}
    }

    if let Ok(n) = s.parse::<i64>() {
        return Some(Value::Number(n.into()));
    }
    if let Ok(n) = s.parse::<f64>() {
        if let Some(n) = Number::from_f64(n) {
            return Some(Value::Number(n));
        }
    }

    // Bare words may not contain structure
    if s.contains(|c: char| matches!(c, '{' | '}' | '[' | ']' | '"' | '\'' | ',')) {
        return None;
    }
    Some(Value::String(s.to_string()))
}

fn parse_object(inner: &str) -> Option<Value> {
    let mut map = Map::new();

    for entry in split_at_depth_zero(inner, ',')? {
        if entry.is_empty() {
            continue;
        }
        let (key, value) = split_key(&entry)?;
        let key = match unquote(key) {
            Some(key) => key?,
            None if is_bare_key(key) => key.to_string(),
            None => return None,
        };
        map.insert(key, parse_value(value)?);
    }

    Some(Value::Object(map))
}

fn is_bare_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == '$')
}

/// `Some(Some(text))` for a well-formed quoted string, `Some(None)` for a
/// malformed one, `None` when `s` is not quoted at all
fn unquote(s: &str) -> Option<Option<String>> {
    let quote = s.chars().next()?;
    if !(quote == '"' || quote == '\'') {
        return None;
    }
    if s.len() < 2 || !s.ends_with(quote) {
        return Some(None);
    }

    if quote == '"' {
        return Some(serde_json::from_str::<String>(s).ok());
    }

    let mut out = String::new();
    let mut chars = s[1..s.len() - 1].chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some(other) => out.push(other),
                None => return Some(None),
            }
        } else {
            out.push(c);
        }
    }
    Some(Some(out))
}

/// Split `key: value` at the first colon outside quotes and brackets
fn split_key(entry: &str) -> Option<(&str, &str)> {
    let at = scan_depth_zero(entry, ':')?.into_iter().next()?;
    Some((entry[..at].trim(), entry[at + 1..].trim()))
}

/// Split a string by a delimiter, but only at bracket depth 0 and outside
/// quotes. `None` when brackets or quotes are unbalanced.
fn split_at_depth_zero(s: &str, delimiter: char) -> Option<Vec<String>> {
    let cuts = scan_depth_zero(s, delimiter)?;
    let mut parts = Vec::with_capacity(cuts.len() + 1);
    let mut start = 0;
    for cut in cuts {
        parts.push(s[start..cut].trim().to_string());
        start = cut + delimiter.len_utf8();
    }
    parts.push(s[start..].trim().to_string());
    Some(parts)
}

/// Byte offsets of `delimiter` at depth zero
fn scan_depth_zero(s: &str, delimiter: char) -> Option<Vec<usize>> {
    let mut cuts = Vec::new();
    let mut depth: i32 = 0;
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
            '{' | '[' | '(' => depth += 1,
            '}' | ']' | ')' => {
                depth -= 1;
                if depth < 0 {
                    return None;
                }
            }
            c if c == delimiter && depth == 0 => cuts.push(i),
            _ => {}
        }
    }

    (depth == 0 && quote.is_none()).then_some(cuts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unquoted_keys_and_bare_words() {
        assert_eq!(
            parse("{id:a,x:0,y:0}"),
            Some(json!({"id": "a", "x": 0, "y": 0}))
        );
    }

    #[test]
    fn test_nested_values() {
        let value = parse("{ id: node-1, tags: [demo, 'two words'], ai: {hints: []}, x: -1.5, }");
        assert_eq!(
            value,
            Some(json!({
                "id": "node-1",
                "tags": ["demo", "two words"],
                "ai": {"hints": []},
                "x": -1.5
            }))
        );
    }

    #[test]
    fn test_timestamps_keep_their_colons() {
        let value = parse("{updated_at: 2024-01-01T00:00:00Z, ok: true, gone: null}");
        assert_eq!(
            value,
            Some(json!({"updated_at": "2024-01-01T00:00:00Z", "ok": true, "gone": null}))
        );
    }

    #[test]
    fn test_quoted_strings_protect_delimiters() {
        assert_eq!(
            parse(r#"{"label": "a, b: {c}", 'k': 'it\'s'}"#),
            Some(json!({"label": "a, b: {c}", "k": "it's"}))
        );
    }

    #[test]
    fn test_split_key_at_first_colon() {
        assert_eq!(split_key("a: b"), Some(("a", "b")));
        assert_eq!(split_key("'k:1': {x: 1}"), Some(("'k:1'", "{x: 1}")));
        assert_eq!(split_key("no colon"), None);
        assert_eq!(split_key("k: [open"), None);
    }

    #[test]
    fn test_rejects_broken_input() {
        assert_eq!(parse("{id: a"), None);
        assert_eq!(parse("{id: [1, 2}"), None);
        assert_eq!(parse("{id: \"open}"), None);
        assert_eq!(parse("{: a}"), None);
        assert_eq!(parse(""), None);
    }
}
