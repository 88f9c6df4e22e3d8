//! Qwen3-Coder dialect: XML-like `<tool_call>` markup with attribute-valued
//! open tags (`<function=NAME>`, `<parameter=NAME>`). No thinking channel.

use crate::dialect::buffer::scan_channel;
use crate::dialect::buffer::ScanResult;
use crate::dialect::event::{AddOutput, Event, ThinkSetting};
use crate::dialect::schema::ToolSchemaSet;
use crate::dialect::toolcall::build_tool_call;

const TOOL_OPEN: &[u8] = b"<tool_call>";
const TOOL_CLOSE: &[u8] = b"</tool_call>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Content,
    ToolBody,
}

#[derive(Debug, Clone)]
pub struct Qwen3CoderParser {
    buffer: Vec<u8>,
    state: State,
    schemas: ToolSchemaSet,
}

impl Default for Qwen3CoderParser {
    fn default() -> Self {
        Self {
            buffer: Vec::new(),
            state: State::Content,
            schemas: ToolSchemaSet::default(),
        }
    }
}

impl Qwen3CoderParser {
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

        loop {
            let progressed = self.step(&mut out);
            if !progressed {
                break;
            }
        }

        if done {
            match self.state {
                State::Content => {
                    let text = String::from_utf8_lossy(&self.buffer).into_owned();
                    if !text.is_empty() {
                        Event::Content(text).fold_into(&mut out);
                    }
                }
                State::ToolBody => {
                    // Unterminated tool body at stream end: discard silently,
                    // per the eager/discard-on-failure post-processing rule.
                }
            }
            self.buffer.clear();
        }

        out
    }

    fn step(&mut self, out: &mut AddOutput) -> bool {
        match self.state {
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

                for call in parse_functions(&inner, &self.schemas) {
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

/// Parses one or more `<function=NAME>...</function>` blocks out of a
/// `<tool_call>` body, each containing zero or more
/// `<parameter=KEY>\nVALUE\n</parameter>` pairs.
fn parse_functions(body: &[u8], schemas: &ToolSchemaSet) -> Vec<crate::dialect::toolcall::ToolCall> {
    let text = String::from_utf8_lossy(body);
    let mut calls = Vec::new();
    let mut rest = text.as_ref();

    while let Some(fn_start) = rest.find("<function=") {
        let after_tag = &rest[fn_start + "<function=".len()..];
        let Some(name_end) = after_tag.find('>') else {
            break;
        };
        let name = &after_tag[..name_end];
        let body_start = &after_tag[name_end + 1..];
        let Some(fn_end) = body_start.find("</function>") else {
            break;
        };
        let fn_body = &body_start[..fn_end];

        let mut args = Vec::new();
        let mut cursor = fn_body;
        while let Some(p_start) = cursor.find("<parameter=") {
            let after_p = &cursor[p_start + "<parameter=".len()..];
            let Some(p_name_end) = after_p.find('>') else {
                break;
            };
            let key = after_p[..p_name_end].to_string();
            let p_body_start = &after_p[p_name_end + 1..];
            let Some(p_end) = p_body_start.find("</parameter>") else {
                break;
            };
            let value = p_body_start[..p_end].to_string();
            args.push((key, value));
            cursor = &p_body_start[p_end + "</parameter>".len()..];
        }

        calls.push(build_tool_call(name, args, schemas));
        rest = &body_start[fn_end + "</function>".len()..];
    }

    calls
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::schema::ToolSchema;

    fn weather_schema() -> ToolSchemaSet {
        let schema = ToolSchema::from_json_schema(
            "get_weather",
            &serde_json::json!({"properties": {"city": {"type": "string"}, "units": {"type": "string"}}}),
        );
        ToolSchemaSet::new(vec![schema])
    }

    #[test]
    fn simple_tool_call() {
        let mut p = Qwen3CoderParser::default();
        let schemas = weather_schema();
        p.init(&schemas, false, ThinkSetting::On);

        let input = b"Sure.\n<tool_call>\n<function=get_weather>\n<parameter=city>\nBerlin\n</parameter>\n<parameter=units>\ncelsius\n</parameter>\n</function>\n</tool_call>";
        let out = p.add(input, true);

        assert_eq!(out.content, "Sure.");
        assert_eq!(out.tool_calls.len(), 1);
        assert_eq!(out.tool_calls[0].name, "get_weather");
        assert_eq!(
            out.tool_calls[0].arguments.get("city"),
            Some(&crate::dialect::value::Value::String("Berlin".to_string()))
        );
    }

    #[test]
    fn chunk_invariance_byte_by_byte() {
        let schemas = weather_schema();
        let input = b"hi<tool_call>\n<function=get_weather>\n<parameter=city>\nNYC\n</parameter>\n</function>\n</tool_call>";

        let mut one_shot = Qwen3CoderParser::default();
        one_shot.init(&schemas, false, ThinkSetting::On);
        let whole = one_shot.add(input, true);

        let mut chunked = Qwen3CoderParser::default();
        chunked.init(&schemas, false, ThinkSetting::On);
        let mut content = String::new();
        let mut calls = Vec::new();
        for (i, byte) in input.iter().enumerate() {
            let done = i == input.len() - 1;
            let out = chunked.add(&[*byte], done);
            content.push_str(&out.content);
            calls.extend(out.tool_calls);
        }

        assert_eq!(content, whole.content);
        assert_eq!(calls, whole.tool_calls);
    }
}
