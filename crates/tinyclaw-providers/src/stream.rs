//! Streaming support — SSE framing and tool-call delta reassembly.
//!
//! Streamed completions arrive as server-sent events: `data: <json>` lines
//! terminated by a `data: [DONE]` sentinel. Text lands in
//! `choices[0].delta.content`; tool calls arrive as indexed fragments whose
//! `arguments` text must be concatenated in arrival order and JSON-parsed
//! only at end-of-stream.

use std::collections::BTreeMap;

use serde::Deserialize;
use tinyclaw_core::types::ToolCall;

// ─────────────────────────────────────────────
// Wire DTOs
// ─────────────────────────────────────────────

/// One parsed SSE payload.
#[derive(Debug, Deserialize)]
pub struct StreamChunk {
    #[serde(default)]
    pub choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
pub struct StreamChoice {
    #[serde(default)]
    pub delta: StreamDelta,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StreamDelta {
    pub content: Option<String>,
    pub tool_calls: Option<Vec<ToolCallDelta>>,
}

/// A fragment of a tool call, addressed by `index`.
#[derive(Debug, Deserialize)]
pub struct ToolCallDelta {
    pub index: usize,
    pub id: Option<String>,
    #[serde(default)]
    pub function: FunctionDelta,
}

#[derive(Debug, Default, Deserialize)]
pub struct FunctionDelta {
    pub name: Option<String>,
    pub arguments: Option<String>,
}

// ─────────────────────────────────────────────
// SSE framing
// ─────────────────────────────────────────────

/// Incremental SSE line splitter.
///
/// Network chunks can cut lines anywhere; feed raw bytes in and get back
/// complete `data:` payloads. The `[DONE]` sentinel is passed through so
/// the caller can stop reading.
#[derive(Default)]
pub struct SseParser {
    buffer: String,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a network chunk; returns the complete `data:` payloads it
    /// finished.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));

        let mut payloads = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(data) = line.strip_prefix("data:") {
                let data = data.trim_start();
                if !data.is_empty() {
                    payloads.push(data.to_string());
                }
            }
        }
        payloads
    }
}

/// The `[DONE]` stream terminator.
pub const SSE_DONE: &str = "[DONE]";

// ─────────────────────────────────────────────
// Tool-call reassembly
// ─────────────────────────────────────────────

#[derive(Default)]
struct PartialCall {
    id: String,
    name: String,
    arguments: String,
}

/// Reassembles indexed tool-call deltas into complete [`ToolCall`]s.
#[derive(Default)]
pub struct ToolCallAssembler {
    calls: BTreeMap<usize, PartialCall>,
}

impl ToolCallAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one delta: id and name stick on first sight, argument text
    /// concatenates in arrival order.
    pub fn push(&mut self, delta: &ToolCallDelta) {
        let slot = self.calls.entry(delta.index).or_default();
        if let Some(id) = &delta.id {
            if slot.id.is_empty() {
                slot.id = id.clone();
            }
        }
        if let Some(name) = &delta.function.name {
            if slot.name.is_empty() {
                slot.name = name.clone();
            }
        }
        if let Some(args) = &delta.function.arguments {
            slot.arguments.push_str(args);
        }
    }

    /// Whether any fragments have been seen.
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Finish the stream: validate each call's argument text as JSON. Text
    /// that fails to parse is preserved under a `raw` key rather than
    /// discarded.
    pub fn finish(self) -> Vec<ToolCall> {
        self.calls
            .into_values()
            .map(|partial| {
                let arguments = if partial.arguments.is_empty() {
                    "{}".to_string()
                } else if serde_json::from_str::<serde_json::Value>(&partial.arguments).is_ok() {
                    partial.arguments
                } else {
                    serde_json::json!({ "raw": partial.arguments }).to_string()
                };
                ToolCall::new(partial.id, partial.name, arguments)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(
        index: usize,
        id: Option<&str>,
        name: Option<&str>,
        args: Option<&str>,
    ) -> ToolCallDelta {
        ToolCallDelta {
            index,
            id: id.map(String::from),
            function: FunctionDelta {
                name: name.map(String::from),
                arguments: args.map(String::from),
            },
        }
    }

    // ── SseParser ──

    #[test]
    fn test_sse_complete_lines() {
        let mut parser = SseParser::new();
        let payloads = parser.push(b"data: {\"a\":1}\n\ndata: [DONE]\n");
        assert_eq!(payloads, vec!["{\"a\":1}", "[DONE]"]);
    }

    #[test]
    fn test_sse_line_split_across_chunks() {
        let mut parser = SseParser::new();
        assert!(parser.push(b"data: {\"con").is_empty());
        let payloads = parser.push(b"tent\":\"hi\"}\n");
        assert_eq!(payloads, vec!["{\"content\":\"hi\"}"]);
    }

    #[test]
    fn test_sse_ignores_non_data_lines() {
        let mut parser = SseParser::new();
        let payloads = parser.push(b": keep-alive\n\nevent: ping\ndata: x\n");
        assert_eq!(payloads, vec!["x"]);
    }

    #[test]
    fn test_sse_crlf_lines() {
        let mut parser = SseParser::new();
        let payloads = parser.push(b"data: one\r\ndata: two\r\n");
        assert_eq!(payloads, vec!["one", "two"]);
    }

    // ── ToolCallAssembler ──

    #[test]
    fn test_assemble_single_call_across_deltas() {
        let mut asm = ToolCallAssembler::new();
        asm.push(&delta(0, Some("call_1"), Some("read_file"), None));
        asm.push(&delta(0, None, None, Some("{\"path\":")));
        asm.push(&delta(0, None, None, Some("\"a.txt\"}")));

        let calls = asm.finish();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call_1");
        assert_eq!(calls[0].function.name, "read_file");
        assert_eq!(calls[0].function.arguments, "{\"path\":\"a.txt\"}");
    }

    #[test]
    fn test_assemble_interleaved_indices() {
        let mut asm = ToolCallAssembler::new();
        asm.push(&delta(1, Some("b"), Some("second"), Some("{}")));
        asm.push(&delta(0, Some("a"), Some("first"), Some("{}")));

        let calls = asm.finish();
        // Ordered by index, not by arrival.
        assert_eq!(calls[0].function.name, "first");
        assert_eq!(calls[1].function.name, "second");
    }

    #[test]
    fn test_unparsable_arguments_preserved_raw() {
        let mut asm = ToolCallAssembler::new();
        asm.push(&delta(0, Some("c"), Some("exec"), Some("{\"cmd\": trunca")));

        let calls = asm.finish();
        let parsed: serde_json::Value =
            serde_json::from_str(&calls[0].function.arguments).unwrap();
        assert_eq!(parsed["raw"], "{\"cmd\": trunca");
    }

    #[test]
    fn test_empty_arguments_become_object() {
        let mut asm = ToolCallAssembler::new();
        asm.push(&delta(0, Some("c"), Some("noop"), None));
        assert_eq!(asm.finish()[0].function.arguments, "{}");
    }

    #[test]
    fn test_id_and_name_stick_on_first_sight() {
        let mut asm = ToolCallAssembler::new();
        asm.push(&delta(0, Some("keep"), Some("keep_name"), None));
        asm.push(&delta(0, Some("ignored"), Some("ignored_name"), Some("{}")));

        let calls = asm.finish();
        assert_eq!(calls[0].id, "keep");
        assert_eq!(calls[0].function.name, "keep_name");
    }

    #[test]
    fn test_chunk_deserialization() {
        let json = r#"{"choices":[{"delta":{"content":"Hel","tool_calls":null},"finish_reason":null}]}"#;
        let chunk: StreamChunk = serde_json::from_str(json).unwrap();
        assert_eq!(chunk.choices[0].delta.content.as_deref(), Some("Hel"));
    }

    #[test]
    fn test_chunk_with_tool_call_delta() {
        let json = r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"c1","function":{"name":"echo","arguments":""}}]},"finish_reason":null}]}"#;
        let chunk: StreamChunk = serde_json::from_str(json).unwrap();
        let deltas = chunk.choices[0].delta.tool_calls.as_ref().unwrap();
        assert_eq!(deltas[0].index, 0);
        assert_eq!(deltas[0].id.as_deref(), Some("c1"));
    }
}
