//! The normalized three-channel output produced by every dialect parser.

use crate::dialect::toolcall::ToolCall;

/// Whether the caller wants the thinking channel surfaced at all.
///
/// Combined with a dialect's own `thinking_support()` and the prefill signal
/// to decide a parser's initial state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThinkSetting {
    Off,
    #[default]
    On,
}

/// Accumulated output of one `add()` call: zero or more fragments on each of
/// the three channels, emitted in the order the underlying bytes arrived.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AddOutput {
    pub content: String,
    pub thinking: String,
    pub tool_calls: Vec<ToolCall>,
}

impl AddOutput {
    pub fn is_empty(&self) -> bool {
        self.content.is_empty() && self.thinking.is_empty() && self.tool_calls.is_empty()
    }

    fn push_content(&mut self, text: &str) {
        self.content.push_str(text);
    }

    fn push_thinking(&mut self, text: &str) {
        self.thinking.push_str(text);
    }

    pub fn merge(&mut self, other: AddOutput) {
        self.content.push_str(&other.content);
        self.thinking.push_str(&other.thinking);
        self.tool_calls.extend(other.tool_calls);
    }
}

/// Internal event emitted by one state-machine step, before being folded into
/// an [`AddOutput`].
pub(crate) enum Event {
    Content(String),
    Thinking(String),
    ToolCall(ToolCall),
}

impl Event {
    pub(crate) fn fold_into(self, out: &mut AddOutput) {
        match self {
            Event::Content(text) => out.push_content(&text),
            Event::Thinking(text) => out.push_thinking(&text),
            Event::ToolCall(call) => out.tool_calls.push(call),
        }
    }
}
