//! Helpers shared by several dialect body grammars: balanced-bracket
//! scanning for JSON tool bodies and a small comma/keyword splitter for the
//! non-JSON, Python-call-style bodies.

/// Scans `buf` starting at `open_at` (the index of the opening `{` or `[`)
/// for the matching close, honoring string literals and `\`-escapes so a
/// brace inside a quoted string never counts.
///
/// Returns the index one past the matching close byte, or `None` if the
/// buffer doesn't yet contain a balanced close (more bytes are needed).
pub fn find_balanced_end(buf: &[u8], open_at: usize) -> Option<usize> {
    let open = buf[open_at];
    let close = match open {
        b'{' => b'}',
        b'[' => b']',
        _ => return None,
    };

    let mut depth: i32 = 0;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in buf[open_at..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }

        match byte {
            b'"' => in_string = true,
            b if b == open => depth += 1,
            b if b == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(open_at + offset + 1);
                }
            }
            _ => {}
        }
    }

    None
}

/// Finds the first unescaped, unquoted occurrence of `target` in `buf`
/// starting at `from`, skipping over balanced `{}`/`[]` spans and quoted
/// strings. Used by comma/keyword splitters that must not split inside a
/// nested value.
pub fn find_top_level(buf: &[u8], from: usize, target: u8) -> Option<usize> {
    let mut depth: i32 = 0;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in buf[from..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' || byte == b'\'' {
                in_string = false;
            }
            continue;
        }

        match byte {
            b'"' | b'\'' => in_string = true,
            b'{' | b'[' | b'(' => depth += 1,
            b'}' | b']' | b')' => depth -= 1,
            b if b == target && depth == 0 => return Some(from + offset),
            _ => {}
        }
    }

    None
}

/// Splits `s` on top-level occurrences of `delim` (respecting `{}`/`[]`/`()`
/// nesting and quoted strings), returning the trimmed, non-empty pieces.
/// Used by the Python-call-style dialects (Olmo-3, LFM2, FunctionGemma) to
/// break a call list or argument list apart without splitting inside a
/// nested value.
pub fn split_top_level(s: &str, delim: u8) -> Vec<&str> {
    let bytes = s.as_bytes();
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut from = 0;
    while let Some(pos) = find_top_level(bytes, from, delim) {
        let piece = s[start..pos].trim();
        if !piece.is_empty() {
            pieces.push(piece);
        }
        start = pos + 1;
        from = start;
    }
    let tail = s[start..].trim();
    if !tail.is_empty() {
        pieces.push(tail);
    }
    pieces
}

/// Strips one layer of matching single or double quotes from `s`, if
/// present. Used for Python-call-style string arguments (`command='ls'`),
/// which may be single- or double-quoted unlike strict JSON.
pub fn unquote(s: &str) -> String {
    let bytes = s.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'"' || first == b'\'') && first == last {
            return s[1..s.len() - 1].to_string();
        }
    }
    s.to_string()
}

/// Parses one `name(key=value, key2=value2, ...)` Python-call-style
/// invocation. Argument values are unquoted if quoted; unquoted tokens
/// (numbers, `true`/`false`, bare words) are returned as-is for the caller's
/// coercion ladder to interpret.
///
/// Returns `None` if `s` doesn't contain a balanced `(...)` call form.
pub fn parse_single_call(s: &str) -> Option<(String, Vec<(String, String)>)> {
    let s = s.trim();
    let open = s.find('(')?;
    if !s.ends_with(')') {
        return None;
    }
    let name = s[..open].trim().to_string();
    let inner = &s[open + 1..s.len() - 1];

    let mut args = Vec::new();
    for piece in split_top_level(inner, b',') {
        let Some(eq) = find_top_level(piece.as_bytes(), 0, b'=') else {
            continue;
        };
        let key = piece[..eq].trim().to_string();
        let value = unquote(piece[eq + 1..].trim());
        args.push((key, value));
    }

    Some((name, args))
}

/// Infers a [`crate::dialect::value::Value`] from a bare lexeme's own
/// lexical form, without consulting a schema: quoted strings, `true`/`false`,
/// `null`/`none`, integers, and floats are recognized natively; everything
/// else is a string. Used to type the leaves of nested literal structures
/// (FunctionGemma's `{k:v}` bodies) where no per-field schema exists to drive
/// the ordinary coercion ladder.
pub fn infer_native(raw: &str) -> crate::dialect::value::Value {
    use crate::dialect::value::Value;

    let raw = raw.trim();
    if raw.len() >= 2 {
        let bytes = raw.as_bytes();
        if (bytes[0] == b'"' || bytes[0] == b'\'') && bytes[0] == bytes[raw.len() - 1] {
            return Value::String(unquote(raw));
        }
    }
    if raw.eq_ignore_ascii_case("null") || raw.eq_ignore_ascii_case("none") {
        return Value::Null;
    }
    if raw.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if raw.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Value::Int64(i);
    }
    if let Ok(f) = raw.parse::<f64>() {
        return Value::Float64(f);
    }
    Value::String(raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balanced_end_skips_braces_in_strings() {
        let buf = br#"{"a": "}"}rest"#;
        let end = find_balanced_end(buf, 0).unwrap();
        assert_eq!(&buf[..end], br#"{"a": "}"}"#);
    }

    #[test]
    fn balanced_end_none_when_incomplete() {
        let buf = br#"{"a": 1"#;
        assert_eq!(find_balanced_end(buf, 0), None);
    }

    #[test]
    fn find_top_level_skips_nested_commas() {
        let buf = br#"a(1,2),b(3)"#;
        let pos = find_top_level(buf, 0, b',').unwrap();
        assert_eq!(pos, 6);
    }
}
