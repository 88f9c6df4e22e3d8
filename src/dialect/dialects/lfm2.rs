//! LFM2 dialect: optional `<think>` block, then content, then
//! `<|tool_call_start|>` bodies shaped either as a single JSON object
//! (`{"name":…,"arguments":…}`) or a Python-style call list
//! (`[fn(k='v'), fn2(...)]`).

use crate::dialect::buffer::{scan_channel, ScanResult};
use crate::dialect::dialects::common::{parse_single_call, split_top_level};
use crate::dialect::event::{AddOutput, Event, ThinkSetting};
use crate::dialect::schema::ToolSchemaSet;
use crate::dialect::toolcall::{build_tool_call, build_tool_call_from_json, ToolCall};

const THINK_OPEN: &[u8] = b"<think>";
const THINK_CLOSE: &[u8] = b"</think>";
const TOOL_START: &[u8] = b"<|tool_call_start|>";
const TOOL_END: &[u8] = b"<|tool_call_end|>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    Thinking,
    Content,
    ToolBody,
}

#[derive(Debug, Clone)]
pub struct Lfm2Parser {
    buffer: Vec<u8>,
    state: State,
    schemas: ToolSchemaSet,
}

impl Default for Lfm2Parser {
    fn default() -> Self {
        Self {
            buffer: Vec::new(),
            state: State::Start,
            schemas: ToolSchemaSet::default(),
        }
    }
}

impl Lfm2Parser {
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
                    log::warn!("lfm2: unterminated tool call at stream end, discarding");
                }
            }
            self.buffer.clear();
        }

        out
    }

    fn step(&mut self, out: &mut AddOutput) -> bool {
        match self.state {
            State::Start => match scan_channel(&self.buffer, &[THINK_OPEN, TOOL_START]) {
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
            State::Content => match scan_channel(&self.buffer, &[TOOL_START]) {
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
                let Some(end_at) = find_subslice(&self.buffer, TOOL_END) else {
                    return false;
                };
                let body = String::from_utf8_lossy(&self.buffer[..end_at]).into_owned();
                let rest = self.buffer[end_at + TOOL_END.len()..].to_vec();

                for call in parse_body(&body, &self.schemas) {
                    Event::ToolCall(call).fold_into(out);
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

fn parse_body(body: &str, schemas: &ToolSchemaSet) -> Vec<ToolCall> {
    let trimmed = body.trim();

    if trimmed.starts_with('{') {
        return match serde_json::from_str::<serde_json::Value>(trimmed) {
            Ok(json) => {
                let name = json
                    .get("name")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                let args = json
                    .get("arguments")
                    .cloned()
                    .unwrap_or(serde_json::Value::Object(Default::default()));
                vec![build_tool_call_from_json(name, args, schemas)]
            }
            Err(_) => {
                log::warn!("lfm2: failed to decode JSON tool call body, discarding");
                Vec::new()
            }
        };
    }

    if let Some(inner) = trimmed.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
        return split_top_level(inner, b',')
            .into_iter()
            .filter_map(parse_single_call)
            .map(|(name, args)| build_tool_call(name, args, schemas))
            .collect();
    }

    log::warn!("lfm2: unrecognized tool call body shape, discarding");
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::value::Value;

    #[test]
    fn python_style_list_of_calls() {
        let mut p = Lfm2Parser::default();
        let schemas = ToolSchemaSet::default();
        p.init(&schemas, false, ThinkSetting::On);

        let input = b"<|tool_call_start|>[bash(command='ls -la'),bash(command='pwd')]<|tool_call_end|>";
        let out = p.add(input, true);

        assert_eq!(out.tool_calls.len(), 2);
        assert_eq!(out.tool_calls[0].name, "bash");
        assert_eq!(
            out.tool_calls[0].arguments.get("command"),
            Some(&Value::String("ls -la".to_string()))
        );
        assert_eq!(
            out.tool_calls[1].arguments.get("command"),
            Some(&Value::String("pwd".to_string()))
        );
    }

    #[test]
    fn json_object_form() {
        let mut p = Lfm2Parser::default();
        let schemas = ToolSchemaSet::default();
        p.init(&schemas, false, ThinkSetting::On);

        let input = br#"<|tool_call_start|>{"name": "bash", "arguments": {"command": "ls"}}<|tool_call_end|>"#;
        let out = p.add(input, true);

        assert_eq!(out.tool_calls.len(), 1);
        assert_eq!(out.tool_calls[0].name, "bash");
        assert_eq!(
            out.tool_calls[0].arguments.get("command"),
            Some(&Value::String("ls".to_string()))
        );
    }
}
