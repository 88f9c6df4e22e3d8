//! Olmo-3 dialect: `<function_calls>` bodies holding newline-separated
//! Python-style calls (`name(k="v", …)`), no thinking channel.

use crate::dialect::buffer::{scan_channel, ScanResult};
use crate::dialect::dialects::common::parse_single_call;
use crate::dialect::event::{AddOutput, Event, ThinkSetting};
use crate::dialect::schema::ToolSchemaSet;
use crate::dialect::toolcall::{build_tool_call, ToolCall};

const OPEN: &[u8] = b"<function_calls>";
const CLOSE: &[u8] = b"</function_calls>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Content,
    ToolCalls,
}

#[derive(Debug, Clone)]
pub struct Olmo3Parser {
    buffer: Vec<u8>,
    state: State,
    schemas: ToolSchemaSet,
}

impl Default for Olmo3Parser {
    fn default() -> Self {
        Self {
            buffer: Vec::new(),
            state: State::Content,
            schemas: ToolSchemaSet::default(),
        }
    }
}

impl Olmo3Parser {
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
                State::ToolCalls => {
                    log::warn!("olmo3: unterminated function_calls block at stream end, discarding");
                }
            }
            self.buffer.clear();
        }

        out
    }

    fn step(&mut self, out: &mut AddOutput) -> bool {
        match self.state {
            State::Content => match scan_channel(&self.buffer, &[OPEN]) {
                ScanResult::SentinelFound { emit, rest, .. } => {
                    if !emit.is_empty() {
                        Event::Content(emit).fold_into(out);
                    }
                    self.buffer = rest;
                    self.state = State::ToolCalls;
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
            State::ToolCalls => {
                let Some(close_at) = find_subslice(&self.buffer, CLOSE) else {
                    return false;
                };
                let body = String::from_utf8_lossy(&self.buffer[..close_at]).into_owned();
                let rest = self.buffer[close_at + CLOSE.len()..].to_vec();

                for call in parse_calls(&body, &self.schemas) {
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

fn parse_calls(body: &str, schemas: &ToolSchemaSet) -> Vec<ToolCall> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(parse_single_call)
        .map(|(name, args)| build_tool_call(name, args, schemas))
        .collect()
}
