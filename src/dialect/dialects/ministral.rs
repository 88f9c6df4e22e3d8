//! Ministral dialect: bracketed-keyword sentinels with a bare tool name
//! before `[ARGS]` and a single JSON object as the argument body, whose end
//! is found by a balanced-brace scan rather than a closing sentinel.

use crate::dialect::buffer::{scan_channel, ScanResult};
use crate::dialect::dialects::common::find_balanced_end;
use crate::dialect::event::{AddOutput, Event, ThinkSetting};
use crate::dialect::schema::ToolSchemaSet;
use crate::dialect::toolcall::build_tool_call_from_json;

const TOOL_CALLS: &[u8] = b"[TOOL_CALLS]";
const ARGS: &[u8] = b"[ARGS]";
const THINK_OPEN: &[u8] = b"[THINK]";
const THINK_CLOSE: &[u8] = b"[/THINK]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Content,
    Thinking,
    ToolName,
    ToolArgs,
}

#[derive(Debug, Clone)]
pub struct MinistralParser {
    buffer: Vec<u8>,
    state: State,
    schemas: ToolSchemaSet,
    pending_name: Option<String>,
}

impl Default for MinistralParser {
    fn default() -> Self {
        Self {
            buffer: Vec::new(),
            state: State::Content,
            schemas: ToolSchemaSet::default(),
            pending_name: None,
        }
    }
}

impl MinistralParser {
    pub fn tool_support() -> bool {
        true
    }

    pub fn thinking_support() -> bool {
        true
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
                State::Thinking => {
                    let text = String::from_utf8_lossy(&self.buffer).into_owned();
                    if !text.is_empty() {
                        Event::Thinking(text).fold_into(&mut out);
                    }
                }
                State::ToolName | State::ToolArgs => {
                    log::warn!("ministral: unterminated tool call at stream end, discarding");
                }
            }
            self.buffer.clear();
            self.pending_name = None;
        }

        out
    }

    fn step(&mut self, out: &mut AddOutput) -> bool {
        match self.state {
            State::Content => match scan_channel(&self.buffer, &[THINK_OPEN, TOOL_CALLS]) {
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
                        State::Thinking
                    } else {
                        State::ToolName
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
                    self.buffer = rest;
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
            State::ToolName => match find_subslice(&self.buffer, ARGS) {
                Some(at) => {
                    let name = String::from_utf8_lossy(&self.buffer[..at]).trim().to_string();
                    self.pending_name = Some(name);
                    self.buffer = self.buffer[at + ARGS.len()..].to_vec();
                    self.state = State::ToolArgs;
                    true
                }
                None => false,
            },
            State::ToolArgs => {
                let Some(brace_at) = self.buffer.iter().position(|&b| b == b'{') else {
                    return false;
                };
                match find_balanced_end(&self.buffer, brace_at) {
                    Some(end) => {
                        let json_bytes = &self.buffer[brace_at..end];
                        let rest = self.buffer[end..].to_vec();
                        let name = self.pending_name.take().unwrap_or_default();

                        match serde_json::from_slice::<serde_json::Value>(json_bytes) {
                            Ok(value) => {
                                let call = build_tool_call_from_json(name, value, &self.schemas);
                                Event::ToolCall(call).fold_into(out);
                            }
                            Err(_) => {
                                log::warn!(
                                    "ministral: failed to decode tool call args, discarding"
                                );
                            }
                        }

                        self.buffer = rest;
                        self.state = State::Content;
                        true
                    }
                    None => false,
                }
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
