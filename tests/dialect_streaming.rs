//! Cross-cutting integration coverage for the streaming dialect parsers,
//! complementing the per-dialect unit tests in `src/dialect/dialects/*.rs`.
//!
//! Focus: chunk-invariance (feeding a byte string one way yields the same
//! channel output as feeding it any other way it can be split) across the
//! representative end-to-end scenarios from each dialect.

use open_agent::dialect::{self, AddOutput, ThinkSetting, ToolSchema, ToolSchemaSet};
use serde_json::json;

fn schema_set(schemas: Vec<ToolSchema>) -> ToolSchemaSet {
    ToolSchemaSet::new(schemas)
}

/// Feeds `input` through a freshly built parser for `dialect_key`, split at
/// every byte boundary in `splits` (each a byte offset into `input`), and
/// returns the concatenated channel output.
fn run_split(dialect_key: &str, schemas: &ToolSchemaSet, input: &[u8], splits: &[usize]) -> AddOutput {
    let mut parser = dialect::select_dialect("unused", Some(dialect_key));
    parser.init(schemas, false, ThinkSetting::On);

    let mut out = AddOutput::default();
    let mut prev = 0;
    for &split in splits {
        out.merge(parser.add(&input[prev..split], false));
        prev = split;
    }
    out.merge(parser.add(&input[prev..], true));
    out
}

fn all_single_byte_splits(len: usize) -> Vec<usize> {
    (1..len).collect()
}

fn assert_chunk_invariant(dialect_key: &str, schemas: &ToolSchemaSet, input: &[u8]) {
    let whole = run_split(dialect_key, schemas, input, &[]);
    let byte_by_byte = run_split(dialect_key, schemas, input, &all_single_byte_splits(input.len()));
    let midpoint = run_split(dialect_key, schemas, input, &[input.len() / 2]);

    assert_eq!(whole.content, byte_by_byte.content, "{dialect_key}: content mismatch under byte-by-byte split");
    assert_eq!(whole.content, midpoint.content, "{dialect_key}: content mismatch under midpoint split");
    assert_eq!(whole.thinking, byte_by_byte.thinking, "{dialect_key}: thinking mismatch under byte-by-byte split");
    assert_eq!(whole.thinking, midpoint.thinking, "{dialect_key}: thinking mismatch under midpoint split");
    assert_eq!(whole.tool_calls, byte_by_byte.tool_calls, "{dialect_key}: tool_calls mismatch under byte-by-byte split");
    assert_eq!(whole.tool_calls, midpoint.tool_calls, "{dialect_key}: tool_calls mismatch under midpoint split");
}

#[test]
fn qwen3_coder_simple_call_is_chunk_invariant() {
    let schemas = schema_set(vec![ToolSchema::from_json_schema(
        "get_weather",
        &json!({"properties": {"city": {"type": "string"}, "units": {"type": "string"}}}),
    )]);
    let input = b"Sure.\n<tool_call>\n<function=get_weather>\n<parameter=city>\nBerlin\n</parameter>\n<parameter=units>\ncelsius\n</parameter>\n</function>\n</tool_call>";

    assert_chunk_invariant("qwen3-coder", &schemas, input);

    let whole = run_split("qwen3-coder", &schemas, input, &[]);
    assert_eq!(whole.content, "Sure.");
    assert!(whole.thinking.is_empty());
    assert_eq!(whole.tool_calls.len(), 1);
    assert_eq!(whole.tool_calls[0].name, "get_weather");
}

#[test]
fn glm46_thinking_then_content_then_tool_is_chunk_invariant() {
    let schemas = schema_set(vec![ToolSchema::from_json_schema(
        "search",
        &json!({"properties": {"q": {"type": "string"}}}),
    )]);
    let input = b"<think>\nI should look this up.\n</think>\n\nLet me check.\n<tool_call>search\n<arg_key>q</arg_key><arg_value>rust ownership</arg_value>\n</tool_call>";

    assert_chunk_invariant("glm-4.6", &schemas, input);

    let whole = run_split("glm-4.6", &schemas, input, &[]);
    assert_eq!(whole.thinking, "I should look this up.");
    assert_eq!(whole.content, "Let me check.");
    assert_eq!(whole.tool_calls.len(), 1);
    assert_eq!(whole.tool_calls[0].name, "search");
}

#[test]
fn ministral_streamed_one_byte_at_a_time() {
    let schemas = schema_set(vec![ToolSchema::from_json_schema(
        "compute",
        &json!({"properties": {"x": {"type": "number"}, "y": {"type": "number"}}}),
    )]);
    let input = br#"[TOOL_CALLS]compute[ARGS]{"x": 1, "y": 2}"#;

    let whole = run_split("ministral", &schemas, input, &[]);
    let byte_by_byte = run_split("ministral", &schemas, input, &all_single_byte_splits(input.len()));

    assert!(whole.content.is_empty());
    assert!(whole.thinking.is_empty());
    assert_eq!(whole.tool_calls.len(), 1);
    assert_eq!(whole, byte_by_byte);
}

#[test]
fn olmo3_multiple_calls_is_chunk_invariant() {
    let schemas = schema_set(vec![
        ToolSchema::from_json_schema("a", &json!({"properties": {"x": {"type": "number"}}})),
        ToolSchema::from_json_schema(
            "b",
            &json!({"properties": {"y": {"type": "string"}, "z": {"type": "boolean"}}}),
        ),
    ]);
    let input = b"<function_calls>a(x=1)\nb(y=\"hi\", z=true)\n</function_calls>done";

    assert_chunk_invariant("olmo-3", &schemas, input);

    let whole = run_split("olmo-3", &schemas, input, &[]);
    assert_eq!(whole.tool_calls.len(), 2);
    assert_eq!(whole.tool_calls[0].name, "a");
    assert_eq!(whole.tool_calls[1].name, "b");
    assert_eq!(whole.content, "done");
}

#[test]
fn lfm2_python_style_list_form_is_chunk_invariant() {
    let schemas = schema_set(vec![ToolSchema::from_json_schema(
        "bash",
        &json!({"properties": {"command": {"type": "string"}}}),
    )]);
    let input = b"<|tool_call_start|>[bash(command='ls -la'),bash(command='pwd')]<|tool_call_end|>";

    assert_chunk_invariant("lfm2", &schemas, input);

    let whole = run_split("lfm2", &schemas, input, &[]);
    assert_eq!(whole.tool_calls.len(), 2);
    assert!(whole.tool_calls.iter().all(|c| c.name == "bash"));
}

#[test]
fn function_gemma_nested_object_is_chunk_invariant() {
    let schemas = schema_set(vec![ToolSchema::from_json_schema(
        "set_opts",
        &json!({"properties": {"mode": {"type": "string"}, "cfg": {"type": "object"}}}),
    )]);
    let input = b"<start_function_call>call:set_opts{mode:debug,cfg:{flag:true,count:3}}<end_function_call>";

    assert_chunk_invariant("function-gemma", &schemas, input);

    let whole = run_split("function-gemma", &schemas, input, &[]);
    assert_eq!(whole.tool_calls.len(), 1);
    assert_eq!(whole.tool_calls[0].name, "set_opts");
}

#[test]
fn plain_dialect_passes_everything_through_chunk_invariantly() {
    let schemas = ToolSchemaSet::default();
    let input = b"No markup here, just plain streamed text across many chunks.";
    assert_chunk_invariant("plain", &schemas, input);
}

#[test]
fn cogito_thinking_close_wins_over_tool_sentinel_at_same_position() {
    // Resolves the Open Question in SPEC_FULL.md: when a `</think>` close
    // and a tool-call-begin sentinel could both start at the same buffer
    // position, thinking's close always takes precedence.
    let schemas = ToolSchemaSet::default();
    let input = "Thinking text</think>After thinking.".as_bytes();
    let whole = run_split("cogito", &schemas, input, &[]);
    assert_eq!(whole.thinking, "Thinking text");
    assert_eq!(whole.content, "After thinking.");
}

#[test]
fn drain_on_done_empties_the_buffer_for_every_dialect() {
    let schemas = ToolSchemaSet::default();
    for key in [
        "plain",
        "qwen3-coder",
        "glm-4.6",
        "cogito",
        "ministral",
        "function-gemma",
        "lfm2",
        "olmo-3",
    ] {
        let mut parser = dialect::select_dialect("unused", Some(key));
        parser.init(&schemas, false, ThinkSetting::On);
        parser.add(b"partial content with no sentinel", false);
        parser.add(b"", true);
        assert_eq!(parser.buffered_len(), 0, "{key}: buffer not drained on done");
    }
}
