//! String-aware scanning over JSON-ish text.
//!
//! Every scanner here tracks whether it is inside a string literal
//! (respecting backslash escapes) so brackets and control characters in
//! file content never affect structure.

/// Tracks string-literal state one character at a time.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct StringTracker {
    in_string: bool,
    escaped: bool,
}

impl StringTracker {
    /// Feed one character. Returns true when `c` is structural, i.e. outside
    /// any string literal and not a quote.
    pub(crate) fn feed(&mut self, c: char) -> bool {
        if self.in_string {
            if self.escaped {
                self.escaped = false;
            } else if c == '\\' {
                self.escaped = true;
            } else if c == '"' {
                self.in_string = false;
            }
            false
        } else if c == '"' {
            self.in_string = true;
            false
        } else {
            true
        }
    }

    pub(crate) const fn in_string(&self) -> bool {
        self.in_string
    }
}

/// Remove surrounding whitespace and markdown code-fence markers.
pub(crate) fn strip_fences(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```") {
        // Drop the info string ("json", "JSON", ...) up to the first newline
        text = match rest.find('\n') {
            Some(newline) if !rest[..newline].contains(['[', '{']) => &rest[newline + 1..],
            _ => rest,
        };
    }
    if let Some(rest) = text.trim_end().strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

/// End index (inclusive) of the bracketed value opening at `start`, if it
/// closes before the end of `text`.
pub(crate) fn balanced_end(text: &str, start: usize) -> Option<usize> {
    let mut tracker = StringTracker::default();
    let mut depth = 0usize;
    for (i, c) in text[start..].char_indices() {
        if !tracker.feed(c) {
            continue;
        }
        match c {
            '[' | '{' => depth += 1,
            ']' | '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(start + i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Isolate the candidate operations array.
///
/// Prefers the first `[` that opens an array of objects (or an empty
/// array), skipping bracketed prose before it. Returns the balanced extent,
/// or everything to the end of the text when the array never closes.
pub(crate) fn isolate_array(text: &str) -> Option<&str> {
    let opens_array = |i: usize| {
        text[i + 1..]
            .trim_start()
            .starts_with(|c: char| c == '{' || c == ']')
    };
    let start = text
        .match_indices('[')
        .map(|(i, _)| i)
        .find(|&i| opens_array(i))
        .or_else(|| text.find('['))?;

    Some(match balanced_end(text, start) {
        Some(end) => &text[start..=end],
        None => &text[start..],
    })
}

/// Escape literal control characters that appear inside string literals.
///
/// Returns `None` when nothing needed escaping. Characters outside string
/// literals are never touched.
pub(crate) fn escape_control_chars(text: &str) -> Option<String> {
    let mut tracker = StringTracker::default();
    let mut out = String::with_capacity(text.len() + 16);
    let mut changed = false;

    for c in text.chars() {
        let inside = tracker.in_string();
        tracker.feed(c);
        if inside && c.is_control() {
            changed = true;
            match c {
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                other => out.push_str(&format!("\\u{:04x}", u32::from(other))),
            }
        } else {
            out.push(c);
        }
    }

    changed.then_some(out)
}

/// Byte offsets just past each complete top-level element of an array,
/// limited to offsets at or before `limit`.
pub(crate) fn element_boundaries(text: &str, limit: usize) -> Vec<usize> {
    let mut tracker = StringTracker::default();
    let mut depth = 0usize;
    let mut boundaries = Vec::new();

    for (i, c) in text.char_indices() {
        if i >= limit {
            break;
        }
        if !tracker.feed(c) {
            continue;
        }
        match c {
            '[' | '{' => depth += 1,
            ']' | '}' => {
                depth = depth.saturating_sub(1);
                if depth == 1 {
                    boundaries.push(i + c.len_utf8());
                }
            }
            _ => {}
        }
    }
    boundaries
}

/// Convert a 1-based line/column parser position into a byte offset.
pub(crate) fn byte_offset(text: &str, line: usize, column: usize) -> usize {
    let line_start = if line <= 1 {
        0
    } else {
        text.match_indices('\n')
            .nth(line - 2)
            .map_or(text.len(), |(i, _)| i + 1)
    };
    (line_start + column).min(text.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_fences() {
        assert_eq!(strip_fences("```json\n[1]\n```"), "[1]");
        assert_eq!(strip_fences("```\n[1]\n```  "), "[1]");
        assert_eq!(strip_fences("```[1]```"), "[1]");
        assert_eq!(strip_fences("  [1]  "), "[1]");
    }

    #[test]
    fn test_isolate_array_skips_bracketed_prose() {
        let text = r#"Here [as requested] you go: [{"path":"a"}] done"#;
        assert_eq!(isolate_array(text), Some(r#"[{"path":"a"}]"#));
    }

    #[test]
    fn test_isolate_array_ignores_brackets_in_strings() {
        let text = r#"[{"content":"arr[0] = ']'"}] trailing"#;
        assert_eq!(isolate_array(text), Some(r#"[{"content":"arr[0] = ']'"}]"#));
    }

    #[test]
    fn test_isolate_array_returns_unclosed_tail() {
        let text = r#"[{"path":"a"},{"pa"#;
        assert_eq!(isolate_array(text), Some(text));
        assert_eq!(isolate_array("no array here"), None);
    }

    #[test]
    fn test_escape_control_chars_only_inside_strings() {
        let text = "[\n{\"c\":\"a\nb\tc\"}\n]";
        let escaped = escape_control_chars(text).unwrap();
        assert_eq!(escaped, "[\n{\"c\":\"a\\nb\\tc\"}\n]");
        assert_eq!(escape_control_chars("[\n{\"c\":\"ab\"}\n]"), None);
    }

    #[test]
    fn test_escape_respects_escaped_quotes() {
        let text = "[{\"c\":\"say \\\"hi\nthere\\\"\"}]";
        let escaped = escape_control_chars(text).unwrap();
        assert_eq!(escaped, "[{\"c\":\"say \\\"hi\\nthere\\\"\"}]");
    }

    #[test]
    fn test_element_boundaries() {
        let text = r#"[{"a":{"b":1}},{"c":"}"},{"d"#;
        let boundaries = element_boundaries(text, text.len());
        assert_eq!(boundaries, vec![14, 24]);
        assert_eq!(&text[..14], r#"[{"a":{"b":1}}"#);
    }

    #[test]
    fn test_byte_offset() {
        let text = "ab\ncd\nef";
        assert_eq!(byte_offset(text, 1, 1), 1);
        assert_eq!(byte_offset(text, 2, 1), 4);
        assert_eq!(byte_offset(text, 9, 9), text.len());
    }
}
