//! GLM-4.6 dialect: optional `<think>` block, then content, then
//! `<tool_call>` bodies carrying a bare function name followed by
//! `<arg_key>`/`<arg_value>` pairs in document order.

use crate::dialect::buffer::{scan_channel, ScanResult};
use crate::dialect::event::{AddOutput, Event, ThinkSetting};
use crate::dialect::schema::ToolSchemaSet;
use crate::dialect::toolcall::{build_tool_call, ToolCall};

const THINK_OPEN: &[u8] = b"<think>";
const THINK_CLOSE: &[u8] = b"</think>";
const TOOL_OPEN: &[u8] = b"<tool_call>";
const TOOL_CLOSE: &[u8] = b"</tool_call>";
const ARG_KEY_OPEN: &str = "<arg_key>";
const ARG_KEY_CLOSE: &str = "</arg_key>";
const ARG_VALUE_OPEN: &str = "<arg_value>";
const ARG_VALUE_CLOSE: &str = "</arg_value>";

/// `Start` only ever looks for an opening `<think>`; once resolved the
/// machine never returns to it, matching the reference handler's
/// once-only thinking detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    Thinking,
    Content,
    ToolBody,
}

#[derive(Debug, Clone)]
pub struct Glm46Parser {
    buffer: Vec<u8>,
    state: State,
    schemas: ToolSchemaSet,
}

impl Default for Glm46Parser {
    fn default() -> Self {
        Self {
            buffer: Vec::new(),
            state: State::Start,
            schemas: ToolSchemaSet::default(),
        }
    }
}

impl Glm46Parser {
    pub fn tool_support() -> bool {
        true
    }

    pub fn thinking_support() -> bool {
        true
    }

    pub fn init(
        &mut self,
        tools: &ToolSchemaSet,
        last_message_prefill: bool,
        think_setting: ThinkSetting,
    ) -> ToolSchemaSet {
        self.schemas = tools.clone();
        self.state = if last_message_prefill || think_setting == ThinkSetting::Off {
            State::Content
        } else {
            State::Start
        };
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
                State::Start | State::Content => {
                    let text = String::from_utf8_lossy(&self.buffer).into_owned();
                    if !text.is_empty() {
                        Event::Content(text).fold_into(&mut out);
                    }
                }
                State::Thinking => {
                    let text = String::from_utf8_lossy(&self.buffer).into_owned();
                    if !text.is_empty() {
                        Event::Thinking(text).fold_into(&mut out);
                    }
                }
                State::ToolBody => {
                    log::warn!("glm4.6: unterminated tool call body at stream end, discarding");
                }
            }
            self.buffer.clear();
        }

        out
    }

    fn step(&mut self, out: &mut AddOutput) -> bool {
        match self.state {
            State::Start => match scan_channel(&self.buffer, &[THINK_OPEN, TOOL_OPEN]) {
                ScanResult::SentinelFound {
                    emit,
                    sentinel_index,
                    rest,
                } => {
                    if !emit.is_empty() {
                        Event::Content(emit).fold_into(out);
                    }
                    self.buffer = crate::dialect::buffer::ltrim_whitespace(&rest).to_vec();
                    self.state = if sentinel_index == 0 {
                        State::Thinking
                    } else {
                        State::ToolBody
                    };
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
            State::Thinking => match scan_channel(&self.buffer, &[THINK_CLOSE]) {
                ScanResult::SentinelFound { emit, rest, .. } => {
                    if !emit.is_empty() {
                        Event::Thinking(emit).fold_into(out);
                    }
                    self.buffer = crate::dialect::buffer::ltrim_whitespace(&rest).to_vec();
                    self.state = State::Content;
                    true
                }
                ScanResult::Pending { emit, hold } => {
                    if !emit.is_empty() {
                        Event::Thinking(emit).fold_into(out);
                    }
                    self.buffer = hold;
                    false
                }
            },
            State::Content => match scan_channel(&self.buffer, &[TOOL_OPEN]) {
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
                let Some(close_at) = find_subslice(&self.buffer, TOOL_CLOSE) else {
                    return false;
                };
                let inner = self.buffer[..close_at].to_vec();
                let rest = self.buffer[close_at + TOOL_CLOSE.len()..].to_vec();

                if let Some(call) = parse_tool_body(&inner, &self.schemas) {
                    Event::ToolCall(call).fold_into(out);
                } else {
                    log::warn!("glm4.6: failed to decode tool call body, discarding");
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

/// Parses a `<tool_call>` body: a bare function name, followed by zero or
/// more `<arg_key>KEY</arg_key><arg_value>VALUE</arg_value>` pairs paired in
/// document order.
fn parse_tool_body(body: &[u8], schemas: &ToolSchemaSet) -> Option<ToolCall> {
    let text = String::from_utf8_lossy(body);
    let name_end = text.find(ARG_KEY_OPEN).unwrap_or(text.len());
    let name = text[..name_end].trim().to_string();
    if name.is_empty() {
        return None;
    }

    let mut args = Vec::new();
    let mut cursor = &text[name_end..];
    while let Some(k_start) = cursor.find(ARG_KEY_OPEN) {
        let after_key = &cursor[k_start + ARG_KEY_OPEN.len()..];
        let k_end = after_key.find(ARG_KEY_CLOSE)?;
        let key = after_key[..k_end].trim().to_string();

        let after_key_close = &after_key[k_end + ARG_KEY_CLOSE.len()..];
        let v_start = after_key_close.find(ARG_VALUE_OPEN)?;
        let after_value = &after_key_close[v_start + ARG_VALUE_OPEN.len()..];
        let v_end = after_value.find(ARG_VALUE_CLOSE)?;
        let value = after_value[..v_end].to_string();

        args.push((key, value));
        cursor = &after_value[v_end + ARG_VALUE_CLOSE.len()..];
    }

    Some(build_tool_call(name, args, schemas))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::schema::ToolSchema;
    use crate::dialect::value::Value;

    fn search_schema() -> ToolSchemaSet {
        let schema = ToolSchema::from_json_schema(
            "search",
            &serde_json::json!({"properties": {"q": {"type": "string"}}}),
        );
        ToolSchemaSet::new(vec![schema])
    }

    #[test]
    fn thinking_then_content_then_tool() {
        let mut p = Glm46Parser::default();
        let schemas = search_schema();
        p.init(&schemas, false, ThinkSetting::On);

        let input = b"<think>\nI should look this up.\n</think>\n\nLet me check.\n<tool_call>search\n<arg_key>q</arg_key><arg_value>rust ownership</arg_value>\n</tool_call>";
        let out = p.add(input, true);

        assert_eq!(out.thinking, "I should look this up.");
        assert_eq!(out.content, "Let me check.");
        assert_eq!(out.tool_calls.len(), 1);
        assert_eq!(out.tool_calls[0].name, "search");
        assert_eq!(
            out.tool_calls[0].arguments.get("q"),
            Some(&Value::String("rust ownership".to_string()))
        );
    }

    #[test]
    fn no_opening_think_tag_goes_straight_to_content() {
        let mut p = Glm46Parser::default();
        let schemas = ToolSchemaSet::default();
        p.init(&schemas, false, ThinkSetting::On);
        let out = p.add(b"hello there", true);
        assert_eq!(out.content, "hello there");
        assert!(out.thinking.is_empty());
    }

    #[test]
    fn chunk_invariance_byte_by_byte() {
        let schemas = search_schema();
        let input = b"<think>\nhmm\n</think>\nok\n<tool_call>search\n<arg_key>q</arg_key><arg_value>x</arg_value>\n</tool_call>";

        let mut one_shot = Glm46Parser::default();
        one_shot.init(&schemas, false, ThinkSetting::On);
        let whole = one_shot.add(input, true);

        let mut chunked = Glm46Parser::default();
        chunked.init(&schemas, false, ThinkSetting::On);
        let mut content = String::new();
        let mut thinking = String::new();
        let mut calls = Vec::new();
        for (i, byte) in input.iter().enumerate() {
            let done = i == input.len() - 1;
            let out = chunked.add(&[*byte], done);
            content.push_str(&out.content);
            thinking.push_str(&out.thinking);
            calls.extend(out.tool_calls);
        }

        assert_eq!(content, whole.content);
        assert_eq!(thinking, whole.thinking);
        assert_eq!(calls, whole.tool_calls);
    }
}
