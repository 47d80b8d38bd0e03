//! Last-resort extraction of individual operation objects.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{json, Map, Value};
use tracing::debug;

use super::escape::unescape;
use super::scan::{balanced_end, escape_control_chars};

static OBJECT_ANCHOR: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"\{\s*"path"\s*:"#).ok());

static STRING_FIELD: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r#""(path|action)"\s*:\s*"((?:[^"\\]|\\.)*)""#).ok()
});

static CONTENT_START: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#""content"\s*:\s*"#).ok());

static NEXT_KEY: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"^\s*,\s*"(?:path|action|content)"\s*:"#).ok());

/// Candidate objects found by scanning for `{"path"` anchors.
#[derive(Debug, Default)]
pub(crate) struct Extraction {
    /// Objects recovered, in text order
    pub objects: Vec<Value>,
    /// Anchors whose object never closed or could not be read
    pub skipped: usize,
}

/// Scan `text` for operation objects and recover each independently.
pub(crate) fn extract_objects(text: &str) -> Extraction {
    let mut extraction = Extraction::default();
    let Some(anchor) = OBJECT_ANCHOR.as_ref() else {
        return extraction;
    };

    let mut consumed = 0usize;
    for found in anchor.find_iter(text) {
        let start = found.start();
        if start < consumed {
            continue;
        }
        let Some(end) = balanced_end(text, start) else {
            debug!("Object at offset {} never closes, skipping", start);
            extraction.skipped += 1;
            continue;
        };
        consumed = end + 1;

        let candidate = &text[start..=end];
        match parse_object(candidate) {
            Some(value) => extraction.objects.push(value),
            None => {
                debug!("Object at offset {} could not be read, skipping", start);
                extraction.skipped += 1;
            }
        }
    }
    extraction
}

fn parse_object(candidate: &str) -> Option<Value> {
    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(candidate) {
        return Some(value);
    }
    if let Some(repaired) = escape_control_chars(candidate) {
        if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(&repaired) {
            return Some(value);
        }
    }
    extract_fields(candidate)
}

/// Field-level extraction for objects that are not valid JSON, typically
/// because content holds unescaped quotes.
fn extract_fields(candidate: &str) -> Option<Value> {
    let fields = STRING_FIELD.as_ref()?;
    let mut object = Map::new();

    for caps in fields.captures_iter(candidate) {
        let key = caps.get(1)?.as_str();
        if object.contains_key(key) {
            continue;
        }
        let value = unescape(caps.get(2)?.as_str());
        object.insert(key.to_string(), Value::String(value));
    }
    if !object.contains_key("path") || !object.contains_key("action") {
        return None;
    }

    if let Some(content) = extract_content(candidate) {
        object.insert("content".to_string(), content);
    }
    Some(Value::Object(object))
}

/// Read the `content` value using an end-quote heuristic: the content ends
/// at the first quote followed by the closing brace or by another known key.
fn extract_content(candidate: &str) -> Option<Value> {
    let start = CONTENT_START.as_ref()?.find(candidate)?.end();
    let rest = &candidate[start..];
    if rest.starts_with("null") {
        return Some(Value::Null);
    }
    let body = rest.strip_prefix('"')?;
    let next_key = NEXT_KEY.as_ref()?;

    for (i, _) in body.match_indices('"') {
        let after = &body[i + 1..];
        let closes_object = after.trim_start().strip_prefix('}').is_some_and(|tail| tail.trim().is_empty());
        if closes_object || next_key.is_match(after) {
            return Some(json!(unescape(&body[..i])));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_objects_around_garbage() {
        let text = r#"Sure! {"path":"a.txt","action":"create","content":"A"} blah
            {"path":"b.txt","action":"delete","content":null} and a broken {"path":"c"#;
        let extraction = extract_objects(text);
        assert_eq!(extraction.objects.len(), 2);
        assert_eq!(extraction.objects[0]["path"], "a.txt");
        assert_eq!(extraction.objects[1]["action"], "delete");
        assert_eq!(extraction.skipped, 1);
    }

    #[test]
    fn test_unescaped_quotes_fall_back_to_field_extraction() {
        let text = r#"[{"path":"a.js","action":"create","content":"console.log("hi")"}]"#;
        let extraction = extract_objects(text);
        assert_eq!(extraction.objects.len(), 1);
        assert_eq!(extraction.objects[0]["content"], r#"console.log("hi")"#);
    }

    #[test]
    fn test_field_extraction_unescapes_content() {
        let candidate = r#"{"path":"x.py","content":"print("a")\nprint(\"b\")","action":"update"}"#;
        let value = extract_fields(candidate).unwrap();
        assert_eq!(value["path"], "x.py");
        assert_eq!(value["action"], "update");
        assert_eq!(value["content"], "print(\"a\")\nprint(\"b\")");
    }

    #[test]
    fn test_nested_anchor_inside_content_is_skipped() {
        let text = r#"[{"path":"a.json","action":"create","content":"{\"path\": 1}"}]"#;
        let extraction = extract_objects(text);
        assert_eq!(extraction.objects.len(), 1);
        assert_eq!(extraction.objects[0]["content"], r#"{"path": 1}"#);
    }
}
