//! The streaming incremental parser framework: converts a model's raw,
//! arbitrarily-chunked output bytes into normalized content/thinking/tool-call
//! channels, one dialect state machine per supported model family.
//!
//! [`Parser`] is a closed tagged union over the concrete per-dialect state
//! records rather than a trait object — the set of dialects is small, closed,
//! and grown only by adding a variant here (see DESIGN.md).

pub mod buffer;
pub mod dialects;
pub mod event;
pub mod schema;
pub mod toolcall;
pub mod value;

use dialects::cogito::CogitoParser;
use dialects::function_gemma::FunctionGemmaParser;
use dialects::glm46::Glm46Parser;
use dialects::lfm2::Lfm2Parser;
use dialects::ministral::MinistralParser;
use dialects::olmo3::Olmo3Parser;
use dialects::plain::PlainParser;
use dialects::qwen3_coder::Qwen3CoderParser;

pub use event::ThinkSetting;
pub use event::AddOutput;
pub use schema::{PropertySchema, ToolSchema, ToolSchemaSet, TypeSet};
pub use toolcall::ToolCall;
pub use value::{OrderedMap, Value};

/// The dialect a stream is being parsed with. Selected once at stream start
/// and fixed for the stream's lifetime — see the type's data model note in
/// SPEC_FULL.md §3, "Parser instance".
#[derive(Debug, Clone)]
pub enum Parser {
    Plain(PlainParser),
    Qwen3Coder(Qwen3CoderParser),
    Glm46(Glm46Parser),
    Cogito(CogitoParser),
    Ministral(MinistralParser),
    FunctionGemma(FunctionGemmaParser),
    Lfm2(Lfm2Parser),
    Olmo3(Olmo3Parser),
}

impl Parser {
    /// Whether this dialect can ever emit a tool call.
    pub fn tool_support(&self) -> bool {
        match self {
            Parser::Plain(_) => PlainParser::tool_support(),
            Parser::Qwen3Coder(_) => Qwen3CoderParser::tool_support(),
            Parser::Glm46(_) => Glm46Parser::tool_support(),
            Parser::Cogito(_) => CogitoParser::tool_support(),
            Parser::Ministral(_) => MinistralParser::tool_support(),
            Parser::FunctionGemma(_) => FunctionGemmaParser::tool_support(),
            Parser::Lfm2(_) => Lfm2Parser::tool_support(),
            Parser::Olmo3(_) => Olmo3Parser::tool_support(),
        }
    }

    /// Whether this dialect ever surfaces a thinking channel.
    pub fn thinking_support(&self) -> bool {
        match self {
            Parser::Plain(_) => PlainParser::thinking_support(),
            Parser::Qwen3Coder(_) => Qwen3CoderParser::thinking_support(),
            Parser::Glm46(_) => Glm46Parser::thinking_support(),
            Parser::Cogito(_) => CogitoParser::thinking_support(),
            Parser::Ministral(_) => MinistralParser::thinking_support(),
            Parser::FunctionGemma(_) => FunctionGemmaParser::thinking_support(),
            Parser::Lfm2(_) => Lfm2Parser::thinking_support(),
            Parser::Olmo3(_) => Olmo3Parser::thinking_support(),
        }
    }

    /// Sets initial state for the stream. Returns the tool schema list the
    /// caller should actually advertise to the model (dialects that can't
    /// call tools return it unchanged; this is a hook for future dialects
    /// that filter or augment it).
    pub fn init(
        &mut self,
        tools: &ToolSchemaSet,
        last_message_prefill: bool,
        think_setting: ThinkSetting,
    ) -> ToolSchemaSet {
        match self {
            Parser::Plain(p) => p.init(tools, last_message_prefill, think_setting),
            Parser::Qwen3Coder(p) => p.init(tools, last_message_prefill, think_setting),
            Parser::Glm46(p) => p.init(tools, last_message_prefill, think_setting),
            Parser::Cogito(p) => p.init(tools, last_message_prefill, think_setting),
            Parser::Ministral(p) => p.init(tools, last_message_prefill, think_setting),
            Parser::FunctionGemma(p) => p.init(tools, last_message_prefill, think_setting),
            Parser::Lfm2(p) => p.init(tools, last_message_prefill, think_setting),
            Parser::Olmo3(p) => p.init(tools, last_message_prefill, think_setting),
        }
    }

    /// Appends `fragment` and returns everything now safe to emit. If `done`
    /// is true, drains any state-appropriate residual bytes unconditionally.
    pub fn add(&mut self, fragment: &[u8], done: bool) -> AddOutput {
        match self {
            Parser::Plain(p) => p.add(fragment, done),
            Parser::Qwen3Coder(p) => p.add(fragment, done),
            Parser::Glm46(p) => p.add(fragment, done),
            Parser::Cogito(p) => p.add(fragment, done),
            Parser::Ministral(p) => p.add(fragment, done),
            Parser::FunctionGemma(p) => p.add(fragment, done),
            Parser::Lfm2(p) => p.add(fragment, done),
            Parser::Olmo3(p) => p.add(fragment, done),
        }
    }

    /// Current buffered byte count. Transport adapters poll this after every
    /// `add()` to enforce [`BUFFER_CEILING_BYTES`] against a backend that
    /// never closes a tool body or sentinel.
    pub fn buffered_len(&self) -> usize {
        match self {
            Parser::Plain(p) => p.buffered_len(),
            Parser::Qwen3Coder(p) => p.buffered_len(),
            Parser::Glm46(p) => p.buffered_len(),
            Parser::Cogito(p) => p.buffered_len(),
            Parser::Ministral(p) => p.buffered_len(),
            Parser::FunctionGemma(p) => p.buffered_len(),
            Parser::Lfm2(p) => p.buffered_len(),
            Parser::Olmo3(p) => p.buffered_len(),
        }
    }
}

/// Resource ceiling for a parser's internal buffer (§5 "Resource bounds"):
/// longest sentinel + longest tool body + one streamed content run should
/// never approach this in normal operation. A backend that never emits a
/// closing sentinel would otherwise grow the buffer unboundedly.
pub const BUFFER_CEILING_BYTES: usize = 8 * 1024 * 1024;

/// Builds the default parser instance for a dialect key. Unknown keys (and
/// the empty key) select [`Parser::Plain`], the pass-through dialect.
fn build(key: &str) -> Parser {
    match key {
        "qwen3-coder" => Parser::Qwen3Coder(Qwen3CoderParser::default()),
        "glm-4.6" | "glm4.6" => Parser::Glm46(Glm46Parser::default()),
        "cogito" => Parser::Cogito(CogitoParser::default()),
        "ministral" => Parser::Ministral(MinistralParser::default()),
        "function-gemma" | "functiongemma" => Parser::FunctionGemma(FunctionGemmaParser::default()),
        "lfm2" => Parser::Lfm2(Lfm2Parser::default()),
        "olmo-3" | "olmo3" => Parser::Olmo3(Olmo3Parser::default()),
        _ => Parser::Plain(PlainParser::default()),
    }
}

/// The dialect registry: an init-once, immutable table mapping a dialect key
/// to a constructor. Populated once at startup (the match arms in
/// [`build`]); there is no mutable global registration, matching the "no
/// global state in the core" design note.
///
/// `explicit` (e.g. a user-configured override) wins over inference from
/// `model_id`; inference is a case-insensitive substring match against each
/// known dialect's family name, since model identifiers commonly carry
/// vendor/size suffixes (`qwen3-coder:30b`, `cogito-v2-70b`, ...).
pub fn select_dialect(model_id: &str, explicit: Option<&str>) -> Parser {
    if let Some(key) = explicit {
        return build(&key.to_ascii_lowercase());
    }

    let lower = model_id.to_ascii_lowercase();
    const FAMILIES: &[&str] = &[
        "qwen3-coder",
        "glm-4.6",
        "cogito",
        "ministral",
        "function-gemma",
        "lfm2",
        "olmo-3",
    ];
    for family in FAMILIES {
        if lower.contains(family) {
            return build(family);
        }
    }

    Parser::Plain(PlainParser::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_model_id_selects_plain() {
        let parser = select_dialect("mystery-model", None);
        assert!(matches!(parser, Parser::Plain(_)));
        assert!(!parser.tool_support());
        assert!(!parser.thinking_support());
    }

    #[test]
    fn model_id_substring_selects_dialect() {
        let parser = select_dialect("qwen3-coder:30b-instruct", None);
        assert!(matches!(parser, Parser::Qwen3Coder(_)));
    }

    #[test]
    fn explicit_override_wins_over_model_id() {
        let parser = select_dialect("qwen3-coder:30b", Some("cogito"));
        assert!(matches!(parser, Parser::Cogito(_)));
    }

    #[test]
    fn dispatch_through_enum_matches_direct_call() {
        let mut parser = select_dialect("olmo-3", None);
        let schemas = ToolSchemaSet::default();
        parser.init(&schemas, false, ThinkSetting::On);
        let out = parser.add(b"hello", true);
        assert_eq!(out.content, "hello");
    }
}
