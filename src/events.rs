//! The streaming event contract: every state transition the agent loop makes
//! is narrated to the SSE client as one of these, in the order described in
//! `agent.rs`'s phase sequence. `AgentEvent` is the single shape that both
//! the HTTP layer and the loop's unit tests speak — the loop never touches
//! an `axum::response::sse::Event` directly, matching the Design Notes'
//! "model the event flow as a producer/consumer channel" guidance.

use serde::Serialize;
use serde_json::Value;

use crate::types::ToolCallRecord;

/// A tool call as reported in the final `done` event: just enough to show
/// what was invoked, without repeating the (possibly large) result.
#[derive(Debug, Clone, Serialize)]
pub struct DoneToolCall {
    pub tool: String,
    pub args: Value,
}

impl From<&ToolCallRecord> for DoneToolCall {
    fn from(record: &ToolCallRecord) -> Self {
        Self {
            tool: record.name.clone(),
            args: record.arguments.clone(),
        }
    }
}

/// One frame of the `POST /api/chat` SSE stream.
///
/// Serializes with an adjacently-untagged `type` discriminator so the wire
/// shape matches §6 of the design exactly, e.g. `{"type":"tool_start",
/// "tool":"web_search","args":{...}}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    Thinking {
        message: String,
    },
    ToolStart {
        tool: String,
        args: Value,
    },
    ToolEnd {
        tool: String,
        result: String,
        duration_ms: u64,
    },
    ToolError {
        tool: String,
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        duration_ms: Option<u64>,
    },
    ToolLimit {
        reason: String,
    },
    AnswerStart,
    AnswerChunk {
        chunk: String,
    },
    Done {
        answer: String,
        iterations: usize,
        tool_calls: Vec<DoneToolCall>,
    },
}
