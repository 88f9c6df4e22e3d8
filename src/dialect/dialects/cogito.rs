//! Cogito dialect: DeepSeek-family Unicode-bracketed tool sentinels. The
//! stream always opens in the thinking state — there is no opening
//! `<think>` tag, only a closing one, so a tool-call sentinel encountered
//! before `</think>` is literal text, not a control tag (see DESIGN.md for
//! the open question this resolves).

use crate::dialect::buffer::{scan_channel, ScanResult};
use crate::dialect::event::{AddOutput, Event, ThinkSetting};
use crate::dialect::schema::ToolSchemaSet;
use crate::dialect::toolcall::{build_tool_call_from_json, ToolCall};

const THINK_CLOSE: &[u8] = "</think>".as_bytes();
const TOOL_CALLS_BEGIN: &[u8] = "<｜tool▁calls▁begin｜>".as_bytes();
const TOOL_CALLS_END: &[u8] = "<｜tool▁calls▁end｜>".as_bytes();
const TOOL_CALL_BEGIN: &str = "<｜tool▁call▁begin｜>";
const TOOL_CALL_END: &str = "<｜tool▁call▁end｜>";
const TOOL_SEP: &str = "<｜tool▁sep｜>";
const TOOL_OUTPUTS_BEGIN: &[u8] = "<｜tool▁outputs▁begin｜>".as_bytes();
const TOOL_OUTPUTS_END: &[u8] = "<｜tool▁outputs▁end｜>".as_bytes();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Thinking,
    Content,
    ToolCalls,
    ToolOutput,
}

#[derive(Debug, Clone)]
pub struct CogitoParser {
    buffer: Vec<u8>,
    state: State,
    schemas: ToolSchemaSet,
}

impl Default for CogitoParser {
    fn default() -> Self {
        Self {
            buffer: Vec::new(),
            state: State::Thinking,
            schemas: ToolSchemaSet::default(),
        }
    }
}

impl CogitoParser {
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
            State::Thinking
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
            let text = String::from_utf8_lossy(&self.buffer).into_owned();
            match self.state {
                State::Thinking => {
                    if !text.is_empty() {
                        Event::Thinking(text).fold_into(&mut out);
                    }
                }
                State::Content | State::ToolOutput => {
                    if !text.is_empty() {
                        Event::Content(text).fold_into(&mut out);
                    }
                }
                State::ToolCalls => {
                    log::warn!("cogito: unterminated tool calls block at stream end, discarding");
                }
            }
            self.buffer.clear();
        }

        out
    }

    fn step(&mut self, out: &mut AddOutput) -> bool {
        match self.state {
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
            State::Content => {
                match scan_channel(&self.buffer, &[TOOL_CALLS_BEGIN, TOOL_OUTPUTS_BEGIN]) {
                    ScanResult::SentinelFound {
                        emit,
                        sentinel_index,
                        rest,
                    } => {
                        if !emit.is_empty() {
                            Event::Content(emit).fold_into(out);
                        }
                        self.buffer = rest;
                        self.state = if sentinel_index == 0 {
                            State::ToolCalls
                        } else {
                            State::ToolOutput
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
                }
            }
            State::ToolOutput => match find_subslice(&self.buffer, TOOL_OUTPUTS_END) {
                Some(end_at) => {
                    let text =
                        String::from_utf8_lossy(&self.buffer[..end_at]).into_owned();
                    if !text.is_empty() {
                        Event::Content(text).fold_into(out);
                    }
                    self.buffer = self.buffer[end_at + TOOL_OUTPUTS_END.len()..].to_vec();
                    self.state = State::Content;
                    true
                }
                None => false,
            },
            State::ToolCalls => match find_subslice(&self.buffer, TOOL_CALLS_END) {
                Some(end_at) => {
                    let inner = self.buffer[..end_at].to_vec();
                    let rest = self.buffer[end_at + TOOL_CALLS_END.len()..].to_vec();
                    for call in parse_tool_calls(&inner, &self.schemas) {
                        Event::ToolCall(call).fold_into(out);
                    }
                    self.buffer = rest;
                    self.state = State::Content;
                    true
                }
                None => false,
            },
        }
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Parses zero or more `<｜tool▁call▁begin｜>…<｜tool▁call▁end｜>` segments,
/// each body shaped `function<｜tool▁sep｜>NAME\n```json\n{…}\n```".
fn parse_tool_calls(body: &[u8], schemas: &ToolSchemaSet) -> Vec<ToolCall> {
    let text = String::from_utf8_lossy(body);
    let mut calls = Vec::new();
    let mut rest = text.as_ref();

    while let Some(start) = rest.find(TOOL_CALL_BEGIN) {
        let after_start = &rest[start + TOOL_CALL_BEGIN.len()..];
        let Some(end) = after_start.find(TOOL_CALL_END) else {
            break;
        };
        let segment = &after_start[..end];
        if let Some(call) = parse_one_call(segment, schemas) {
            calls.push(call);
        } else {
            log::warn!("cogito: failed to decode tool call segment, discarding");
        }
        rest = &after_start[end + TOOL_CALL_END.len()..];
    }

    calls
}

fn parse_one_call(segment: &str, schemas: &ToolSchemaSet) -> Option<ToolCall> {
    let segment = segment.trim();
    let segment = segment.strip_prefix("function")?;
    let segment = segment.trim_start_matches(TOOL_SEP);
    let name_end = segment.find('\n')?;
    let name = segment[..name_end].trim().to_string();

    let rest = &segment[name_end..];
    let fence_start = rest.find("```json")?;
    let after_fence = &rest[fence_start + "```json".len()..];
    let fence_end = after_fence.rfind("```")?;
    let json_text = after_fence[..fence_end].trim();

    let value: serde_json::Value = serde_json::from_str(json_text).ok()?;
    Some(build_tool_call_from_json(name, value, schemas))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::schema::ToolSchema;
    use crate::dialect::value::Value;

    fn weather_schema() -> ToolSchemaSet {
        let schema = ToolSchema::from_json_schema(
            "get_weather",
            &serde_json::json!({"properties": {"city": {"type": "string"}}}),
        );
        ToolSchemaSet::new(vec![schema])
    }

    #[test]
    fn thinking_then_tool_call() {
        let mut p = CogitoParser::default();
        let schemas = weather_schema();
        p.init(&schemas, false, ThinkSetting::On);

        let input = format!(
            "thinking about it\n</think>\nHere you go.\n{}{}function{}get_weather\n```json\n{{\"city\": \"Paris\"}}\n```\n{}{}",
            TOOL_CALLS_BEGIN_STR, TOOL_CALL_BEGIN, TOOL_SEP, TOOL_CALL_END, TOOL_CALLS_END_STR
        );
        let out = p.add(input.as_bytes(), true);

        assert_eq!(out.thinking, "thinking about it");
        assert_eq!(out.content, "Here you go.");
        assert_eq!(out.tool_calls.len(), 1);
        assert_eq!(out.tool_calls[0].name, "get_weather");
        assert_eq!(
            out.tool_calls[0].arguments.get("city"),
            Some(&Value::String("Paris".to_string()))
        );
    }

    const TOOL_CALLS_BEGIN_STR: &str = "<｜tool▁calls▁begin｜>";
    const TOOL_CALLS_END_STR: &str = "<｜tool▁calls▁end｜>";

    #[test]
    fn starts_in_thinking_state_by_default() {
        let mut p = CogitoParser::default();
        let schemas = ToolSchemaSet::default();
        p.init(&schemas, false, ThinkSetting::On);
        let out = p.add(b"still deciding</think>done", true);
        assert_eq!(out.thinking, "still deciding");
        assert_eq!(out.content, "done");
    }
}
