//! In-place member edits for JSON-with-comments documents.
//!
//! Editor settings files allow `//` and `/* */` comments and trailing
//! commas. Only the top-level object is scanned: member spans are located
//! and the members being set are rewritten in place, so the rest of the
//! file is kept byte for byte.

use std::cmp::Reverse;
use std::ops::Range;

use serde_json::Value;

const DEFAULT_INDENT: &str = "  ";

/// Why a document could not be edited.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason} at byte {offset}")]
pub(crate) struct JsoncError {
    pub offset: usize,
    pub reason: &'static str,
}

fn malformed(offset: usize, reason: &'static str) -> JsoncError {
    JsoncError { offset, reason }
}

/// One top-level `"key": value` member.
#[derive(Debug)]
struct Member {
    key: String,
    /// Offset of the key's opening quote.
    key_start: usize,
    value: Range<usize>,
}

#[derive(Debug)]
struct TopLevel {
    open: usize,
    close: usize,
    members: Vec<Member>,
    trailing_comma: bool,
}

// ---------------------------------------------------------------------------
// Scanning
// ---------------------------------------------------------------------------

/// Skip whitespace and comments. An unterminated block comment runs to the end.
fn skip_trivia(bytes: &[u8], mut i: usize) -> usize {
    loop {
        while bytes.get(i).is_some_and(u8::is_ascii_whitespace) {
            i += 1;
        }
        if bytes[i..].starts_with(b"//") {
            while bytes.get(i).is_some_and(|b| *b != b'\n') {
                i += 1;
            }
        } else if bytes[i..].starts_with(b"/*") {
            i = bytes[i + 2..]
                .windows(2)
                .position(|w| w == b"*/")
                .map_or(bytes.len(), |p| i + 2 + p + 2);
        } else {
            return i;
        }
    }
}

fn skip_string(bytes: &[u8], start: usize) -> Result<usize, JsoncError> {
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'"' => return Ok(i + 1),
            _ => i += 1,
        }
    }
    Err(malformed(start, "unterminated string"))
}

fn skip_value(bytes: &[u8], start: usize) -> Result<usize, JsoncError> {
    match bytes.get(start) {
        None => Err(malformed(start, "expected a value")),
        Some(b'"') => skip_string(bytes, start),
        Some(b'{' | b'[') => {
            let mut depth = 0usize;
            let mut i = start;
            while i < bytes.len() {
                match bytes[i] {
                    b'"' => {
                        i = skip_string(bytes, i)?;
                        continue;
                    }
                    b'/' if matches!(bytes.get(i + 1), Some(b'/' | b'*')) => {
                        i = skip_trivia(bytes, i);
                        continue;
                    }
                    b'{' | b'[' => depth += 1,
                    b'}' | b']' => {
                        depth -= 1;
                        if depth == 0 {
                            return Ok(i + 1);
                        }
                    }
                    _ => {}
                }
                i += 1;
            }
            Err(malformed(start, "unbalanced brackets"))
        }
        Some(_) => {
            let mut i = start;
            while bytes
                .get(i)
                .is_some_and(|b| !b.is_ascii_whitespace() && !matches!(*b, b',' | b'}' | b']' | b'/'))
            {
                i += 1;
            }
            if i == start {
                Err(malformed(start, "expected a value"))
            } else {
                Ok(i)
            }
        }
    }
}

fn top_level(text: &str) -> Result<TopLevel, JsoncError> {
    let bytes = text.as_bytes();
    let start = if text.starts_with('\u{feff}') { 3 } else { 0 };
    let open = skip_trivia(bytes, start);
    if bytes.get(open) != Some(&b'{') {
        return Err(malformed(open, "expected a top-level object"));
    }

    let mut members = Vec::new();
    let mut trailing_comma = false;
    let mut i = open + 1;
    loop {
        i = skip_trivia(bytes, i);
        match bytes.get(i) {
            Some(b'}') => {
                return Ok(TopLevel {
                    open,
                    close: i,
                    members,
                    trailing_comma,
                })
            }
            Some(b'"') => trailing_comma = false,
            _ => return Err(malformed(i, "expected a member name")),
        }

        let key_start = i;
        let key_end = skip_string(bytes, key_start)?;
        let raw = &text[key_start..key_end];
        let key = serde_json::from_str::<String>(raw)
            .unwrap_or_else(|_| raw[1..raw.len() - 1].to_string());

        i = skip_trivia(bytes, key_end);
        if bytes.get(i) != Some(&b':') {
            return Err(malformed(i, "expected ':'"));
        }
        let value_start = skip_trivia(bytes, i + 1);
        let value_end = skip_value(bytes, value_start)?;
        members.push(Member {
            key,
            key_start,
            value: value_start..value_end,
        });

        i = skip_trivia(bytes, value_end);
        match bytes.get(i) {
            Some(b',') => {
                trailing_comma = true;
                i += 1;
            }
            Some(b'}') => {}
            _ => return Err(malformed(i, "expected ',' or '}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Editing
// ---------------------------------------------------------------------------

/// Leading whitespace of the line holding `pos`, when only whitespace precedes it.
fn line_indent(text: &str, pos: usize) -> Option<&str> {
    let line_start = text[..pos].rfind('\n').map_or(0, |n| n + 1);
    let prefix = &text[line_start..pos];
    prefix
        .chars()
        .all(|c| c == ' ' || c == '\t')
        .then_some(prefix)
}

fn render(value: &Value, indent: &str) -> String {
    serde_json::to_string_pretty(value)
        .unwrap_or_else(|_| value.to_string())
        .replace('\n', &format!("\n{indent}"))
}

/// Set top-level `members` in `text`: existing values are replaced where they
/// stand, new members go before the closing brace. Blank input is treated as
/// an empty object.
pub(crate) fn set_members(text: &str, members: &[(String, Value)]) -> Result<String, JsoncError> {
    let source = if text.trim().is_empty() { "{}\n" } else { text };
    let doc = top_level(source)?;
    let indent = doc
        .members
        .first()
        .and_then(|m| line_indent(source, m.key_start))
        .unwrap_or(DEFAULT_INDENT);

    let mut edits: Vec<(Range<usize>, String)> = Vec::new();
    let mut missing = Vec::new();
    for (key, value) in members {
        let mut found = false;
        for member in doc.members.iter().filter(|m| &m.key == key) {
            let own_indent = line_indent(source, member.key_start).unwrap_or(indent);
            edits.push((member.value.clone(), render(value, own_indent)));
            found = true;
        }
        if !found {
            missing.push(format!(
                "{indent}{}: {}",
                Value::String(key.clone()),
                render(value, indent)
            ));
        }
    }

    if !missing.is_empty() {
        let mut block = missing.join(",\n");
        if doc.trailing_comma {
            block.push(',');
        }
        block.push('\n');
        if let Some(last) = doc.members.last() {
            if !doc.trailing_comma {
                edits.push((last.value.end..last.value.end, ",".to_string()));
            }
        }
        let close_line = source[..doc.close].rfind('\n').map_or(0, |n| n + 1);
        let at = if close_line > doc.open && source[close_line..doc.close].trim().is_empty() {
            close_line
        } else {
            block.insert(0, '\n');
            source[..doc.close].trim_end_matches([' ', '\t']).len()
        };
        edits.push((at..doc.close, block));
    }

    // Back to front; among edits at one offset the later one lands first.
    edits.reverse();
    edits.sort_by_key(|(range, _)| Reverse(range.start));
    let mut out = source.to_string();
    for (range, replacement) in edits {
        out.replace_range(range, &replacement);
    }
    Ok(out)
}
