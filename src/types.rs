//! Core type definitions for messages, content blocks, and tool-call traces.
//!
//! History is modeled as a tagged variant rather than a library message-object
//! graph, so the loop stays testable without a live provider: `Message` carries
//! a `MessageRole` plus either plain text, a tool-call trace, or a tool result,
//! and the LLM Adapter is the only place that knows how to translate this to
//! and from the provider's wire shape.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Role of a message participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

/// A single tool call emitted by the model, and (once resolved) its outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl ToolCallRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
            result: None,
            error: None,
            duration_ms: 0,
        }
    }
}

/// A single message in conversation history.
///
/// Invariant enforced by the agent loop (not by this type): an `Assistant`
/// message never has both non-empty `content` and non-empty `tool_calls`
/// populated by the loop itself in the same step — history replay may still
/// contain either shape depending on what the model did on a given turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    pub timestamp: u64,
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: Some(text.into()),
            tool_calls: None,
            tool_call_id: None,
            timestamp: now_millis(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: Some(text.into()),
            tool_calls: None,
            tool_call_id: None,
            timestamp: now_millis(),
        }
    }

    /// An assistant turn with final text and no tool calls.
    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: Some(text.into()),
            tool_calls: None,
            tool_call_id: None,
            timestamp: now_millis(),
        }
    }

    /// An assistant turn that only requested tool calls (content may be empty
    /// narration text that preceded the calls).
    pub fn assistant_tool_calls(text: impl Into<String>, tool_calls: Vec<ToolCallRecord>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: Some(text.into()),
            tool_calls: Some(tool_calls),
            tool_call_id: None,
            timestamp: now_millis(),
        }
    }

    /// A tool-result message replying to a specific tool call.
    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Tool,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(call_id.into()),
            timestamp: now_millis(),
        }
    }

    pub fn is_tool_call_only(&self) -> bool {
        self.role == MessageRole::Assistant
            && self.tool_calls.as_ref().is_some_and(|t| !t.is_empty())
            && self.content.as_deref().unwrap_or("").is_empty()
    }
}
