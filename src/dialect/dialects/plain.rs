//! The pass-through dialect: no markup, no tool calls, no thinking channel.
//! Used for any model identifier the registry doesn't recognize.

use crate::dialect::event::{AddOutput, ThinkSetting};
use crate::dialect::schema::ToolSchemaSet;

#[derive(Debug, Clone, Default)]
pub struct PlainParser {
    buffer: Vec<u8>,
}

impl PlainParser {
    pub fn tool_support() -> bool {
        false
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
        if done {
            out.content = String::from_utf8_lossy(&self.buffer).into_owned();
            self.buffer.clear();
            return out;
        }

        // Only the incomplete tail of a multi-byte UTF-8 sequence is
        // ambiguous in a dialect with no sentinels; everything before it is
        // safe to release immediately.
        match std::str::from_utf8(&self.buffer) {
            Ok(text) => {
                out.content = text.to_string();
                self.buffer.clear();
            }
            Err(e) => {
                let valid_up_to = e.valid_up_to();
                out.content = String::from_utf8_lossy(&self.buffer[..valid_up_to]).into_owned();
                self.buffer.drain(..valid_up_to);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_content_through_verbatim() {
        let mut p = PlainParser::default();
        let schemas = ToolSchemaSet::default();
        p.init(&schemas, false, ThinkSetting::On);
        let out = p.add(b"hello world", false);
        assert_eq!(out.content, "hello world");
        assert!(out.thinking.is_empty());
        assert!(out.tool_calls.is_empty());
    }

    #[test]
    fn drains_on_done() {
        let mut p = PlainParser::default();
        let schemas = ToolSchemaSet::default();
        p.init(&schemas, false, ThinkSetting::On);
        let mut all = String::new();
        all.push_str(&p.add(b"part one", false).content);
        let out = p.add(b" part two", true);
        all.push_str(&out.content);
        assert_eq!(all, "part one part two");
    }
}
