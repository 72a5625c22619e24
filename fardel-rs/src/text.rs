//! Text utilities shared by the transform stages and the emitter.
//!
//! Provides helpers for processing source text: BOM stripping, comment
//! removal, string-literal escaping, and JSON-to-JavaScript module
//! wrapping.

/// Strips the UTF-8 BOM (byte order mark) from the beginning of text if present.
///
/// The BOM is U+FEFF (0xEF 0xBB 0xBF in UTF-8) and is sometimes present at the
/// start of files.
pub fn strip_bom(text: &str) -> &str {
    text.strip_prefix('\u{FEFF}').unwrap_or(text)
}

/// Wraps JSON source in a JavaScript module that exports the parsed value.
///
/// This allows JSON files to be imported as ES modules by wrapping the JSON
/// content in `export default JSON.parse("...")`.
pub fn json_module(source: &str) -> String {
    format!("export default JSON.parse(\"{}\");", escape_js_string(source))
}

/// Escapes a string for safe embedding in a JavaScript string literal.
///
/// Handles special characters like quotes, backslashes, and control characters.
pub fn escape_js_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => result.push_str("\\\""),
            '\\' => result.push_str("\\\\"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\t' => result.push_str("\\t"),
            // Control characters (U+0000 to U+001F)
            c if c < '\x20' => {
                result.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => result.push(c),
        }
    }
    result
}

/// Drops every line whose first non-whitespace characters are `marker`.
///
/// Trailing comments on code lines are left alone; reliably separating those
/// from markers inside string literals needs a real lexer, which belongs to
/// an external compiler collaborator.
pub fn strip_comment_lines(source: &str, marker: &str) -> String {
    let mut out = String::with_capacity(source.len());
    for line in source.lines() {
        if !line.trim_start().starts_with(marker) {
            out.push_str(line);
            out.push('\n');
        }
    }
    out
}

/// Removes `/* ... */` block comments with a naive forward scan.
pub fn strip_block_comments(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut rest = source;
    while let Some(start) = rest.find("/*") {
        out.push_str(&rest[..start]);
        match rest[start + 2..].find("*/") {
            Some(end) => rest = &rest[start + 2 + end + 2..],
            None => {
                // Unterminated comment swallows the remainder
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Removes blank lines and trailing whitespace from each line.
pub fn collapse_blank_lines(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    for line in source.lines() {
        let trimmed = line.trim_end();
        if !trimmed.is_empty() {
            out.push_str(trimmed);
            out.push('\n');
        }
    }
    out
}
