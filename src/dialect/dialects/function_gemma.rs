//! FunctionGemma dialect: `call:NAME{k:v,k:v}` body syntax with
//! `<escape>…<escape>` literal spans that suspend structural parsing (no
//! comma/brace significance inside an escape span) and arbitrarily nested
//! `{}`/`[]` composite values.

use crate::dialect::buffer::{scan_channel, ScanResult};
use crate::dialect::dialects::common::infer_native;
use crate::dialect::event::{AddOutput, Event, ThinkSetting};
use crate::dialect::schema::{ToolSchemaSet, TypeSet};
use crate::dialect::value::{coerce, OrderedMap, Value};
use crate::dialect::toolcall::ToolCall;

const START: &[u8] = b"<start_function_call>";
const END: &[u8] = b"<end_function_call>";
const ESCAPE: &str = "<escape>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Content,
    ToolBody,
}

#[derive(Debug, Clone)]
pub struct FunctionGemmaParser {
    buffer: Vec<u8>,
    state: State,
    schemas: ToolSchemaSet,
}

impl Default for FunctionGemmaParser {
    fn default() -> Self {
        Self {
            buffer: Vec::new(),
            state: State::Content,
            schemas: ToolSchemaSet::default(),
        }
    }
}

impl FunctionGemmaParser {
    pub fn tool_support() -> bool {
        true
    }

    pub fn thinking_support() -> bool {
        false
    }

    pub fn init(
        &mut self,
        tools: &ToolSchemaSet,
        _last_message_prefill: bool,
        _think_setting: ThinkSetting,
    ) -> ToolSchemaSet {
        self.schemas = tools.clone();
        tools.clone()
    }

    /// Current buffered byte count, used by transport adapters to
    /// enforce a resource ceiling on pathological streams.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn add(&mut self, fragment: &[u8], done: bool) -> AddOutput {
        self.buffer.extend_from_slice(fragment);
        let mut out = AddOutput::default();

        while self.step(&mut out) {}

        if done {
            match self.state {
                State::Content => {
                    let text = String::from_utf8_lossy(&self.buffer).into_owned();
                    if !text.is_empty() {
                        Event::Content(text).fold_into(&mut out);
                    }
                }
                State::ToolBody => {
                    log::warn!(
                        "function_gemma: unterminated tool call at stream end, discarding"
                    );
                }
            }
            self.buffer.clear();
        }

        out
    }

    fn step(&mut self, out: &mut AddOutput) -> bool {
        match self.state {
            State::Content => match scan_channel(&self.buffer, &[START]) {
                ScanResult::SentinelFound { emit, rest, .. } => {
                    if !emit.is_empty() {
                        Event::Content(emit).fold_into(out);
                    }
                    self.buffer = rest;
                    self.state = State::ToolBody;
                    true
                }
                ScanResult::Pending { emit, hold } => {
                    if !emit.is_empty() {
                        Event::Content(emit).fold_into(out);
                    }
                    self.buffer = hold;
                    false
                }
            },
            State::ToolBody => {
                let Some(end_at) = find_subslice(&self.buffer, END) else {
                    return false;
                };
                let body = String::from_utf8_lossy(&self.buffer[..end_at]).into_owned();
                let rest = self.buffer[end_at + END.len()..].to_vec();

                match parse_call_body(&body, &self.schemas) {
                    Some(call) => Event::ToolCall(call).fold_into(out),
                    None => log::warn!(
                        "function_gemma: failed to decode tool call body, discarding"
                    ),
                }

                self.buffer = rest;
                self.state = State::Content;
                true
            }
        }
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Parses `call:NAME{k:v,k2:v2}`, where each value may itself be a nested
/// `{...}`/`[...]` composite or an `<escape>...<escape>`-wrapped literal.
fn parse_call_body(body: &str, schemas: &ToolSchemaSet) -> Option<ToolCall> {
    let body = body.trim();
    let body = body.strip_prefix("call:")?;
    let brace_at = body.find('{')?;
    let name = body[..brace_at].trim().to_string();
    let end = find_matching_brace(body, brace_at)?;
    let inner = &body[brace_at + 1..end - 1];

    let mut raw_pairs = Vec::new();
    for piece in split_top_level_escaped(inner, ',') {
        if let Some(colon) = find_first_top_level(piece, ':') {
            let key = piece[..colon].trim().to_string();
            let value = piece[colon + 1..].trim().to_string();
            raw_pairs.push((key, value));
        }
    }

    Some(build_call(name, raw_pairs, schemas))
}

fn build_call(name: String, raw_pairs: Vec<(String, String)>, schemas: &ToolSchemaSet) -> ToolCall {
    let schema = schemas.find(&name);
    let mut arguments = OrderedMap::new();
    for (key, raw) in raw_pairs {
        let trimmed = raw.trim();
        let value = if trimmed.starts_with('{') || trimmed.starts_with('[') || trimmed.starts_with(ESCAPE) {
            parse_value_leaf(trimmed)
        } else {
            let types = schema
                .map(|s| s.property_types(&key))
                .unwrap_or_else(TypeSet::empty);
            coerce(&raw, &types)
        };
        arguments.insert(key, value);
    }
    ToolCall { name, arguments }
}

fn parse_value_leaf(raw: &str) -> Value {
    let t = raw.trim();
    if let Some(rest) = t.strip_prefix(ESCAPE) {
        let literal = rest.strip_suffix(ESCAPE).unwrap_or(rest);
        return Value::String(literal.to_string());
    }
    if t.starts_with('{') || t.starts_with('[') {
        parse_composite(t)
    } else {
        infer_native(t)
    }
}

fn parse_composite(s: &str) -> Value {
    let s = s.trim();
    if let Some(inner) = s.strip_prefix('{').and_then(|r| r.strip_suffix('}')) {
        let mut map = OrderedMap::new();
        for piece in split_top_level_escaped(inner, ',') {
            if let Some(colon) = find_first_top_level(piece, ':') {
                let key = piece[..colon].trim().trim_matches('"').to_string();
                let value = parse_value_leaf(piece[colon + 1..].trim());
                map.insert(key, value);
            }
        }
        Value::Object(map)
    } else if let Some(inner) = s.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
        let items = split_top_level_escaped(inner, ',')
            .into_iter()
            .map(parse_value_leaf)
            .collect();
        Value::Array(items)
    } else {
        infer_native(s)
    }
}

/// Finds the `{`/`[`-matching close of the brace opened at `open_at`,
/// treating any `<escape>...<escape>` span as opaque (no depth tracking
/// inside it).
fn find_matching_brace(s: &str, open_at: usize) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut depth: i32 = 0;
    let mut i = open_at;
    while i < bytes.len() {
        if s[i..].starts_with(ESCAPE) {
            let after = i + ESCAPE.len();
            match s[after..].find(ESCAPE) {
                Some(rel) => {
                    i = after + rel + ESCAPE.len();
                    continue;
                }
                None => return None,
            }
        }
        match bytes[i] {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Splits `s` on top-level `delim` occurrences, tracking `{}`/`[]` depth and
/// skipping over `<escape>...<escape>` spans entirely.
fn split_top_level_escaped(s: &str, delim: char) -> Vec<&str> {
    let bytes = s.as_bytes();
    let mut depth: i32 = 0;
    let mut start = 0;
    let mut pieces = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if s[i..].starts_with(ESCAPE) {
            let after = i + ESCAPE.len();
            match s[after..].find(ESCAPE) {
                Some(rel) => {
                    i = after + rel + ESCAPE.len();
                    continue;
                }
                None => break,
            }
        }
        let ch = bytes[i] as char;
        if ch == '{' || ch == '[' {
            depth += 1;
        } else if ch == '}' || ch == ']' {
            depth -= 1;
        } else if ch == delim && depth == 0 {
            pieces.push(s[start..i].trim());
            start = i + 1;
        }
        i += 1;
    }
    let tail = s[start..].trim();
    if !tail.is_empty() {
        pieces.push(tail);
    }
    pieces.retain(|p| !p.is_empty());
    pieces
}

/// Finds the first top-level `delim` occurrence (not inside `{}`/`[]` or an
/// escape span).
fn find_first_top_level(s: &str, delim: char) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut depth: i32 = 0;
    let mut i = 0;
    while i < bytes.len() {
        if s[i..].starts_with(ESCAPE) {
            let after = i + ESCAPE.len();
            match s[after..].find(ESCAPE) {
                Some(rel) => {
                    i = after + rel + ESCAPE.len();
                    continue;
                }
                None => break,
            }
        }
        let ch = bytes[i] as char;
        if ch == '{' || ch == '[' {
            depth += 1;
        } else if ch == '}' || ch == ']' {
            depth -= 1;
        } else if ch == delim && depth == 0 {
            return Some(i);
        }
        i += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_object_with_typed_leaves() {
        let mut p = FunctionGemmaParser::default();
        let schemas = ToolSchemaSet::default();
        p.init(&schemas, false, ThinkSetting::On);

        let input = b"<start_function_call>call:set_opts{mode:debug,cfg:{flag:true,count:3}}<end_function_call>";
        let out = p.add(input, true);

        assert_eq!(out.tool_calls.len(), 1);
        let call = &out.tool_calls[0];
        assert_eq!(call.name, "set_opts");
        assert_eq!(call.arguments.get("mode"), Some(&Value::String("debug".to_string())));

        let cfg = call.arguments.get("cfg").unwrap();
        match cfg {
            Value::Object(map) => {
                assert_eq!(map.get("flag"), Some(&Value::Bool(true)));
                assert_eq!(map.get("count"), Some(&Value::Int64(3)));
            }
            other => panic!("expected object, got {other:?}"),
        }
    }

    #[test]
    fn escape_span_protects_literal_commas_and_braces() {
        let input =
            "<start_function_call>call:note{text:<escape>a, {weird} text<escape>}<end_function_call>";
        let mut p = FunctionGemmaParser::default();
        let schemas = ToolSchemaSet::default();
        p.init(&schemas, false, ThinkSetting::On);
        let out = p.add(input.as_bytes(), true);

        assert_eq!(out.tool_calls.len(), 1);
        assert_eq!(
            out.tool_calls[0].arguments.get("text"),
            Some(&Value::String("a, {weird} text".to_string()))
        );
    }
}
