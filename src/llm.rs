//! LLM Adapter: translates internal `Message` history and `ToolSpec`
//! definitions to and from an OpenAI-compatible chat completions wire
//! format.
//!
//! Two operations, matching how the agent loop uses the provider
//! differently in its two phases: `complete` is a single non-streaming
//! round trip used while reasoning/acting (the response is either final
//! text or a batch of tool calls, never meaningfully both), and
//! `stream_answer` is a streaming, tool-free call used only once the loop
//! has committed to producing its final answer. The streaming SSE parsing
//! and the tool-call delta accumulator are carried over nearly verbatim
//! from an OpenAI provider implementation in the example pack:
//! `OpenAIStreamChunk`/`OpenAIStreamDelta`/`OpenAIStreamToolCall` mirror the
//! upstream shape field-for-field, and `ToolUseState` is the same
//! "accumulate by index, emit on `id`/`name`/finish_reason" state machine -
//! kept here because a provider may still stream tool-call deltas even when
//! none were requested, and the loop should tolerate that without crashing.

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::retry::{with_retry, RetryConfig};
use crate::tools::ToolSpec;
use crate::types::{Message, MessageRole, ToolCallRecord};

/// The result of one `complete` round trip: either final assistant text, a
/// batch of tool calls to execute, or (rarely) both when the model emits
/// narration ahead of its tool calls.
#[derive(Debug, Clone, Default)]
pub struct CompletionResult {
    pub text: Option<String>,
    pub tool_calls: Vec<ToolCallRecord>,
}

impl CompletionResult {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall<'a>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<&'a str>,
}

#[derive(Serialize)]
struct WireToolCall<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    call_type: &'static str,
    function: WireFunctionCall<'a>,
}

#[derive(Serialize)]
struct WireFunctionCall<'a> {
    name: &'a str,
    arguments: String,
}

fn role_str(role: MessageRole) -> &'static str {
    match role {
        MessageRole::System => "system",
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
        MessageRole::Tool => "tool",
    }
}

fn to_wire_messages(messages: &[Message]) -> Vec<WireMessage<'_>> {
    messages
        .iter()
        .map(|m| WireMessage {
            role: role_str(m.role),
            content: m.content.as_deref(),
            tool_calls: m.tool_calls.as_ref().map(|calls| {
                calls
                    .iter()
                    .map(|c| WireToolCall {
                        id: &c.id,
                        call_type: "function",
                        function: WireFunctionCall {
                            name: &c.name,
                            arguments: c.arguments.to_string(),
                        },
                    })
                    .collect()
            }),
            tool_call_id: m.tool_call_id.as_deref(),
        })
        .collect()
}

fn to_wire_tools(tools: &[ToolSpec]) -> Vec<Value> {
    tools
        .iter()
        .map(|t| {
            json!({
                "type": "function",
                "function": {
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.parameters,
                }
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Non-streaming `complete`
// ---------------------------------------------------------------------------

#[derive(Deserialize, Debug)]
struct OpenAIChatResponse {
    choices: Vec<OpenAIChatChoice>,
}

#[derive(Deserialize, Debug)]
struct OpenAIChatChoice {
    message: OpenAIChatMessage,
}

#[derive(Deserialize, Debug)]
struct OpenAIChatMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<OpenAIResponseToolCall>>,
}

#[derive(Deserialize, Debug)]
struct OpenAIResponseToolCall {
    id: String,
    function: OpenAIResponseFunctionCall,
}

#[derive(Deserialize, Debug)]
struct OpenAIResponseFunctionCall {
    name: String,
    arguments: String,
}

fn parse_completion(body: &str) -> Result<CompletionResult> {
    let response: OpenAIChatResponse =
        serde_json::from_str(body).map_err(|e| Error::LlmError(format!("malformed completion response: {e}")))?;

    let Some(choice) = response.choices.into_iter().next() else {
        return Err(Error::LlmError("provider returned no choices".to_string()));
    };

    let text = choice.message.content.filter(|s| !s.is_empty());
    let tool_calls = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tc| {
            let arguments = serde_json::from_str(&tc.function.arguments).unwrap_or(json!({}));
            ToolCallRecord::new(tc.id, tc.function.name, arguments)
        })
        .collect();

    Ok(CompletionResult { text, tool_calls })
}

// ---------------------------------------------------------------------------
// Streaming `stream_answer`
// ---------------------------------------------------------------------------

/// One event surfaced while streaming the final answer.
#[derive(Debug, Clone)]
pub enum StreamChunk {
    Text(String),
    ToolUseStart { index: usize, id: String, name: String },
    ToolUseInputDelta { index: usize, partial_json: String },
    ToolUseComplete { index: usize, call: ToolCallRecord },
    Done { stop_reason: String },
}

#[derive(Debug, Default)]
struct ToolUseState {
    id: String,
    name: String,
    arguments_buffer: String,
    started: bool,
}

#[derive(Deserialize, Debug)]
struct OpenAIStreamChunk {
    choices: Vec<OpenAIStreamChoice>,
}

#[derive(Deserialize, Debug)]
struct OpenAIStreamChoice {
    delta: OpenAIStreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
struct OpenAIStreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<OpenAIStreamToolCall>>,
}

#[derive(Deserialize, Debug)]
struct OpenAIStreamToolCall {
    #[serde(default)]
    index: Option<usize>,
    #[serde(default)]
    id: Option<String>,
    function: OpenAIStreamFunction,
}

#[derive(Deserialize, Debug, Default)]
struct OpenAIStreamFunction {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: String,
}

/// Parse one already-extracted SSE `data:` payload (or the literal `[DONE]`
/// sentinel) into zero or more `StreamChunk`s, updating `tool_states` for
/// any deltas that span multiple payloads.
fn parse_event(data: &str, tool_states: &mut HashMap<usize, ToolUseState>) -> Result<Vec<StreamChunk>> {
    let mut out = Vec::new();

    if data == "[DONE]" {
        flush_tool_states(tool_states, &mut out);
        out.push(StreamChunk::Done { stop_reason: "end_turn".to_string() });
        return Ok(out);
    }

    let chunk: OpenAIStreamChunk = serde_json::from_str(data)
        .map_err(|e| Error::stream(format!("malformed SSE payload: {e}")))?;

    for choice in &chunk.choices {
        if let Some(content) = &choice.delta.content {
            if !content.is_empty() {
                out.push(StreamChunk::Text(content.clone()));
            }
        }

        if let Some(tool_calls) = &choice.delta.tool_calls {
            for tc in tool_calls {
                let index = tc.index.unwrap_or(0);
                let state = tool_states.entry(index).or_default();

                if let Some(id) = &tc.id {
                    state.id = id.clone();
                }
                if let Some(name) = &tc.function.name {
                    state.name = name.clone();
                    if !state.started {
                        state.started = true;
                        out.push(StreamChunk::ToolUseStart {
                            index,
                            id: state.id.clone(),
                            name: state.name.clone(),
                        });
                    }
                }
                if !tc.function.arguments.is_empty() {
                    state.arguments_buffer.push_str(&tc.function.arguments);
                    out.push(StreamChunk::ToolUseInputDelta {
                        index,
                        partial_json: tc.function.arguments.clone(),
                    });
                }
            }
        }

        if let Some(finish_reason) = &choice.finish_reason {
            flush_tool_states(tool_states, &mut out);
            let stop_reason = match finish_reason.as_str() {
                "tool_calls" => "tool_use",
                "stop" => "end_turn",
                "length" => "max_tokens",
                other => other,
            };
            out.push(StreamChunk::Done { stop_reason: stop_reason.to_string() });
        }
    }

    Ok(out)
}

fn flush_tool_states(tool_states: &mut HashMap<usize, ToolUseState>, out: &mut Vec<StreamChunk>) {
    let mut drained: Vec<(usize, ToolUseState)> = tool_states.drain().collect();
    drained.sort_by_key(|(index, _)| *index);
    for (index, state) in drained {
        if !state.started {
            continue;
        }
        let arguments: Value = serde_json::from_str(&state.arguments_buffer).unwrap_or(json!({}));
        out.push(StreamChunk::ToolUseComplete {
            index,
            call: ToolCallRecord::new(state.id, state.name, arguments),
        });
    }
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

/// An LLM provider capable of both a reasoning/acting round trip and a
/// streamed final answer.
#[async_trait]
pub trait LlmAdapter: Send + Sync {
    async fn complete(&self, messages: &[Message], tools: &[ToolSpec]) -> Result<CompletionResult>;

    async fn stream_answer(
        &self,
        messages: &[Message],
        on_chunk: &mut (dyn FnMut(String) -> Result<()> + Send),
    ) -> Result<()>;
}

/// OpenAI-compatible chat completions client.
pub struct OpenAiAdapter {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    retry_config: RetryConfig,
}

impl OpenAiAdapter {
    pub fn new(client: reqwest::Client, api_key: impl Into<String>, base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into(),
            model: model.into(),
            retry_config: RetryConfig::default(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    async fn connect(&self, body: &Value) -> Result<reqwest::Response> {
        with_retry(&self.retry_config, || async {
            let response = self
                .client
                .post(self.endpoint())
                .bearer_auth(&self.api_key)
                .json(body)
                .send()
                .await?;

            let status = response.status();
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                return Err(Error::LlmRateLimit(format!("{status}")));
            }
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(Error::LlmError(format!("{status}: {text}")));
            }
            Ok(response)
        })
        .await
    }
}

#[async_trait]
impl LlmAdapter for OpenAiAdapter {
    async fn complete(&self, messages: &[Message], tools: &[ToolSpec]) -> Result<CompletionResult> {
        let mut body = json!({
            "model": self.model,
            "messages": to_wire_messages(messages),
            "stream": false,
        });
        if !tools.is_empty() {
            body["tools"] = Value::Array(to_wire_tools(tools));
            body["tool_choice"] = json!("auto");
        }

        let response = self.connect(&body).await?;
        let text = response.text().await?;
        parse_completion(&text)
    }

    async fn stream_answer(
        &self,
        messages: &[Message],
        on_chunk: &mut (dyn FnMut(String) -> Result<()> + Send),
    ) -> Result<()> {
        let body = json!({
            "model": self.model,
            "messages": to_wire_messages(messages),
            "stream": true,
        });

        let response = self.connect(&body).await?;
        let mut stream = response.bytes_stream().eventsource();
        let mut tool_states: HashMap<usize, ToolUseState> = HashMap::new();

        while let Some(event) = stream.next().await {
            let event = event.map_err(|e| Error::stream(e.to_string()))?;
            if event.data.is_empty() {
                continue;
            }
            for chunk in parse_event(&event.data, &mut tool_states)? {
                if let StreamChunk::Text(text) = chunk {
                    on_chunk(text)?;
                }
            }
        }

        Ok(())
    }
}
