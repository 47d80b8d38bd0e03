//! Content escaping normalization.

/// Undo one level of JSON string escaping for `\n`, `\t`, `\r`, `\"` and
/// `\\`. Any other backslash sequence is kept verbatim.
pub(crate) fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.peek().copied() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            _ => {
                out.push('\\');
                continue;
            }
        }
        chars.next();
    }
    out
}

/// Whether content looks double-escaped: it holds literal backslash
/// sequences but no real line break.
///
/// This misfires on single-line content that legitimately contains a
/// two-character `\n` (for example a one-line source file printing a
/// newline); such content gets one extra unescape pass.
pub(crate) fn looks_double_escaped(content: &str) -> bool {
    !content.contains('\n')
        && ["\\n", "\\t", "\\\"", "\\\\"]
            .iter()
            .any(|seq| content.contains(seq))
}

/// Normalize content to literal text, unescaping once if it looks
/// double-escaped. Returns `None` when the content is already literal.
pub(crate) fn normalize_content(content: &str) -> Option<String> {
    looks_double_escaped(content).then(|| unescape(content))
}
