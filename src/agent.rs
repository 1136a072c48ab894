//! Agent Loop: the reasoning/acting/answering state machine that turns one
//! user query into a sequence of `AgentEvent`s and a final transcript.
//!
//! Orchestrates every other component: it reads history from the Session
//! Store, recalls facts from the Memory Index, asks the Tool Registry to run
//! whatever the LLM Adapter requests, renders results through the Tool
//! Context Store, and narrates all of it onto an `AgentEvent` channel the
//! HTTP layer turns into SSE. None of the leaf stores know about each other;
//! this is the only module that does.
//!
//! Cancellation is a plain `tokio::sync::watch<bool>` rather than
//! `tokio-util`'s `CancellationToken` - nothing else in this codebase's
//! lineage pulls in `tokio-util`, and `watch` already gives every cooperating
//! `tokio::select!` branch a "has this been set" check with no missed-wakeup
//! hazard, which is all a single in-flight query needs.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, watch};

use crate::config::Config;
use crate::context::{is_approaching_limit, truncate_messages};
use crate::error::{Error, Result};
use crate::events::{AgentEvent, DoneToolCall};
use crate::llm::LlmAdapter;
use crate::memory::MemoryIndex;
use crate::scratchpad::{Scratchpad, Step};
use crate::session::SessionStore;
use crate::tool_context::ToolContextStore;
use crate::tools::ToolRegistry;
use crate::types::{Message, ToolCallRecord};

const PERSONA: &str = "You are a helpful autonomous agent. Use the available tools when \
they help answer the user's question, explain your reasoning briefly before acting, and \
answer directly, without further tool calls, once you have enough information.";

const MEMORY_RECALL_LIMIT: usize = 3;

/// A cooperative, single-query cancellation signal. Cheap to clone; every
/// clone observes the same underlying flag.
#[derive(Clone)]
pub struct Cancellation {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}

impl Cancellation {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx: Arc::new(tx), rx }
    }

    /// Signal cancellation. Idempotent.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once `cancel()` has been called (immediately, if it already
    /// was).
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// The shared, long-lived components the loop reads and writes on every run.
/// One `AgentDeps` is built at startup and handed to every query.
pub struct AgentDeps {
    pub sessions: Arc<SessionStore>,
    pub tool_context: Arc<ToolContextStore>,
    pub memory: Arc<MemoryIndex>,
    pub tools: Arc<ToolRegistry>,
    pub llm: Arc<dyn LlmAdapter>,
    pub config: Config,
}

/// What a completed (or cancelled) run produced.
#[derive(Debug, Clone)]
pub struct LoopOutcome {
    pub answer: String,
    pub iterations: usize,
    pub tool_calls: Vec<ToolCallRecord>,
    pub cancelled: bool,
}

impl LoopOutcome {
    fn cancelled_at(iterations: usize, tool_calls: Vec<ToolCallRecord>) -> Self {
        Self {
            answer: String::new(),
            iterations,
            tool_calls,
            cancelled: false,
        }
        .into_cancelled()
    }

    fn into_cancelled(mut self) -> Self {
        self.cancelled = true;
        self
    }
}

/// Send an event without blocking; a channel the SSE consumer has stopped
/// draining (closed, or persistently full) ends the run the same way a
/// client disconnect would.
fn emit(tx: &mpsc::Sender<AgentEvent>, event: AgentEvent) -> Result<()> {
    use mpsc::error::TrySendError;
    tx.try_send(event).map_err(|e| match e {
        TrySendError::Full(_) => Error::stream("SSE client is not keeping up with the event stream"),
        TrySendError::Closed(_) => Error::Cancelled,
    })
}

fn category_of<'a>(tools: &'a ToolRegistry, name: &str) -> &'a str {
    tools.get(name).map(|t| t.category.as_str()).unwrap_or(name)
}

fn truncate_for_display(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let mut s: String = text.chars().take(max_chars).collect();
        s.push('\u{2026}');
        s
    }
}

fn build_system_message(deps: &AgentDeps, memory_lines: &[String]) -> Message {
    let mut text = String::from(PERSONA);

    let specs = deps.tools.list();
    if !specs.is_empty() {
        text.push_str("\n\n## Available tools\n");
        for spec in &specs {
            text.push_str(&format!("- {}: {}\n", spec.name, spec.description));
        }
    }

    if !memory_lines.is_empty() {
        text.push_str("\n## Relevant memory from earlier sessions\n");
        for line in memory_lines {
            text.push_str(&format!("- {line}\n"));
        }
    }

    Message::system(text)
}

fn build_prompt(base_messages: &[Message], scratchpad: &Scratchpad) -> Vec<Message> {
    let mut prompt = base_messages.to_vec();
    if !scratchpad.is_empty() {
        prompt.push(Message::system(format!(
            "Scratchpad of this query so far:\n{}",
            scratchpad.render()
        )));
    }
    prompt
}

fn apologetic_answer(err: &Error) -> String {
    format!(
        "I'm sorry, I ran into a problem while working on that: {}",
        err.user_message()
    )
}

/// The Agent Loop: one `run` per user query.
pub struct AgentLoop {
    deps: Arc<AgentDeps>,
}

impl AgentLoop {
    pub fn new(deps: Arc<AgentDeps>) -> Self {
        Self { deps }
    }

    /// Run one query to completion (or cancellation), narrating every step
    /// onto `tx` and persisting the final transcript to the Session Store
    /// and Memory Index.
    ///
    /// `session_key` should already be normalized (see
    /// `session::normalize_session_key`); this method does not re-normalize
    /// it, since the HTTP layer owns the single source of truth for a
    /// session's on-disk key.
    pub async fn run(
        &self,
        session_key: &str,
        user_query: &str,
        cancellation: Cancellation,
        tx: mpsc::Sender<AgentEvent>,
    ) -> Result<LoopOutcome> {
        let deps = &self.deps;

        let history = deps.sessions.list(session_key).await?;
        let history = if is_approaching_limit(&history, deps.config.history_token_limit, 0) {
            truncate_messages(&history, deps.config.history_keep_turns, true)
        } else {
            history
        };

        let now = chrono::Utc::now().timestamp_millis();
        let recall = deps.memory.recall(session_key, user_query, MEMORY_RECALL_LIMIT, now).await?;
        let memory_lines: Vec<String> = recall.into_iter().map(|hit| hit.entry.text).collect();

        let system_message = build_system_message(deps, &memory_lines);
        let mut base_messages = vec![system_message];
        base_messages.extend(history);
        base_messages.push(Message::user(user_query));

        deps.sessions.append(session_key, &Message::user(user_query)).await?;

        let tool_specs: Vec<crate::tools::ToolSpec> = deps.tools.list().into_iter().cloned().collect();

        let mut scratchpad = Scratchpad::new();
        let mut all_tool_calls: Vec<ToolCallRecord> = Vec::new();
        let mut final_text: Option<String> = None;
        let mut iterations = 0usize;

        for i in 0..deps.config.n_iter {
            iterations = i + 1;

            if cancellation.is_cancelled() {
                return Ok(LoopOutcome::cancelled_at(iterations, all_tool_calls));
            }

            let prompt = build_prompt(&base_messages, &scratchpad);
            let completion = tokio::select! {
                res = deps.llm.complete(&prompt, &tool_specs) => res,
                _ = cancellation.cancelled() => return Ok(LoopOutcome::cancelled_at(iterations, all_tool_calls)),
            };

            let completion = match completion {
                Ok(c) => c,
                Err(err) => {
                    log::error!("reasoning round failed on session '{session_key}': {err}");
                    let answer = apologetic_answer(&err);
                    emit(&tx, AgentEvent::AnswerStart)?;
                    emit(&tx, AgentEvent::AnswerChunk { chunk: answer.clone() })?;
                    emit(
                        &tx,
                        AgentEvent::Done {
                            answer: answer.clone(),
                            iterations,
                            tool_calls: all_tool_calls.iter().map(DoneToolCall::from).collect(),
                        },
                    )?;
                    deps.sessions.append(session_key, &Message::assistant_text(&answer)).await?;
                    return Ok(LoopOutcome {
                        answer,
                        iterations,
                        tool_calls: all_tool_calls,
                        cancelled: false,
                    });
                }
            };

            if !completion.has_tool_calls() {
                final_text = completion.text;
                break;
            }

            if let Some(text) = completion.text.filter(|t| !t.trim().is_empty()) {
                emit(&tx, AgentEvent::Thinking { message: text.clone() })?;
                scratchpad.push(Step::Thought(text));
            }

            let call_records = self
                .run_tool_calls(session_key, completion.tool_calls, &mut scratchpad, &cancellation, &tx)
                .await?;

            match call_records {
                Some(records) => {
                    self.persist_tool_round(session_key, &records).await?;
                    all_tool_calls.extend(records);
                }
                None => return Ok(LoopOutcome::cancelled_at(iterations, all_tool_calls)),
            }
        }

        if final_text.is_none() {
            let reason = format!(
                "reached the iteration cap ({}) without a final answer; answering with what's gathered so far",
                deps.config.n_iter
            );
            emit(&tx, AgentEvent::ToolLimit { reason: reason.clone() })?;
            scratchpad.push(Step::LimitNotice(reason));
        }

        emit(&tx, AgentEvent::AnswerStart)?;
        let stream_result = self.stream_final_answer(&base_messages, &scratchpad, &cancellation, &tx).await;

        let answer = match stream_result {
            StreamOutcome::Cancelled => return Ok(LoopOutcome::cancelled_at(iterations, all_tool_calls)),
            StreamOutcome::Text(text) => text,
        };

        emit(
            &tx,
            AgentEvent::Done {
                answer: answer.clone(),
                iterations,
                tool_calls: all_tool_calls.iter().map(DoneToolCall::from).collect(),
            },
        )?;

        deps.sessions.append(session_key, &Message::assistant_text(&answer)).await?;
        let summary = format!(
            "Q: {} | A: {}",
            truncate_for_display(user_query, 200),
            truncate_for_display(&answer, 200)
        );
        deps.memory.record(session_key, &summary, now).await?;

        Ok(LoopOutcome {
            answer,
            iterations,
            tool_calls: all_tool_calls,
            cancelled: false,
        })
    }

    /// Run one model turn's tool calls sequentially (see Design Notes: a
    /// batch MAY run concurrently, but must serialize deterministically, and
    /// sequential trivially satisfies that). Returns `None` if cancellation
    /// was observed partway through.
    async fn run_tool_calls(
        &self,
        session_key: &str,
        calls: Vec<ToolCallRecord>,
        scratchpad: &mut Scratchpad,
        cancellation: &Cancellation,
        tx: &mpsc::Sender<AgentEvent>,
    ) -> Result<Option<Vec<ToolCallRecord>>> {
        let deps = &self.deps;
        let mut records = Vec::with_capacity(calls.len());

        for mut call in calls {
            if cancellation.is_cancelled() {
                return Ok(None);
            }

            emit(tx, AgentEvent::ToolStart { tool: call.name.clone(), args: call.arguments.clone() })?;
            scratchpad.push(Step::Act {
                call_id: call.id.clone(),
                tool: call.name.clone(),
                arguments: call.arguments.clone(),
            });

            let start = Instant::now();
            let invocation = tokio::select! {
                res = deps.tools.invoke(&call.name, call.arguments.clone(), deps.config.tool_timeout) => res,
                _ = cancellation.cancelled() => Err(Error::Cancelled),
            };
            let duration_ms = start.elapsed().as_millis() as u64;

            match invocation {
                Ok(result_text) => {
                    let rendered = deps.tool_context.render(
                        &call.name,
                        &call.arguments,
                        &result_text,
                        deps.config.max_inline_chars,
                    )?;
                    let rendered_text = rendered.as_scratchpad_text().to_string();
                    call.result = Some(rendered_text.clone());
                    call.duration_ms = duration_ms;

                    emit(
                        tx,
                        AgentEvent::ToolEnd {
                            tool: call.name.clone(),
                            result: rendered_text.clone(),
                            duration_ms,
                        },
                    )?;
                    scratchpad.push(Step::Observe {
                        call_id: call.id.clone(),
                        tool: call.name.clone(),
                        rendered: rendered_text,
                    });
                }
                Err(Error::Cancelled) => return Ok(None),
                Err(err) => {
                    call.error = Some(err.user_message());
                    call.duration_ms = duration_ms;

                    emit(
                        tx,
                        AgentEvent::ToolError {
                            tool: call.name.clone(),
                            error: err.user_message(),
                            duration_ms: Some(duration_ms),
                        },
                    )?;
                    scratchpad.push(Step::Observe {
                        call_id: call.id.clone(),
                        tool: call.name.clone(),
                        rendered: format!("error: {}", err.user_message()),
                    });
                }
            }

            self.check_soft_limits(scratchpad, &call.name, tx)?;
            records.push(call);
        }

        log::debug!("session '{session_key}' ran {} tool call(s) this turn", records.len());
        Ok(Some(records))
    }

    fn check_soft_limits(&self, scratchpad: &mut Scratchpad, tool_name: &str, tx: &mpsc::Sender<AgentEvent>) -> Result<()> {
        let config = &self.deps.config;
        let tools = &self.deps.tools;

        if scratchpad.total_tool_call_count() > config.soft_limit_total {
            let reason = format!(
                "total tool-call soft limit ({}) exceeded for this query; wrap up soon",
                config.soft_limit_total
            );
            emit(tx, AgentEvent::ToolLimit { reason: reason.clone() })?;
            scratchpad.push(Step::LimitNotice(reason));
            return Ok(());
        }

        let category = category_of(tools, tool_name).to_string();
        let count = scratchpad.tool_call_count_in_category(&category, |name| category_of(tools, name));
        if count > config.soft_limit_category {
            let reason = format!("'{category}' soft limit ({}) exceeded for this query; wrap up soon", config.soft_limit_category);
            emit(tx, AgentEvent::ToolLimit { reason: reason.clone() })?;
            scratchpad.push(Step::LimitNotice(reason));
        }

        Ok(())
    }

    async fn persist_tool_round(&self, session_key: &str, records: &[ToolCallRecord]) -> Result<()> {
        let thought = String::new();
        self.deps
            .sessions
            .append(session_key, &Message::assistant_tool_calls(thought, records.to_vec()))
            .await?;
        for call in records {
            let content = call
                .result
                .clone()
                .unwrap_or_else(|| format!("error: {}", call.error.clone().unwrap_or_default()));
            self.deps.sessions.append(session_key, &Message::tool_result(call.id.clone(), content)).await?;
        }
        Ok(())
    }

    /// Phase 3: stream the final answer from the model over the prompt
    /// built from the (possibly limit-annotated) scratchpad. No tools are
    /// exposed to this call.
    async fn stream_final_answer(
        &self,
        base_messages: &[Message],
        scratchpad: &Scratchpad,
        cancellation: &Cancellation,
        tx: &mpsc::Sender<AgentEvent>,
    ) -> StreamOutcome {
        let prompt = build_prompt(base_messages, scratchpad);
        let mut answer_buf = String::new();

        let mut on_chunk = |chunk: String| -> Result<()> {
            answer_buf.push_str(&chunk);
            emit(tx, AgentEvent::AnswerChunk { chunk })
        };

        let result = tokio::select! {
            res = self.deps.llm.stream_answer(&prompt, &mut on_chunk) => res,
            _ = cancellation.cancelled() => Err(Error::Cancelled),
        };

        match result {
            Ok(()) => StreamOutcome::Text(answer_buf),
            Err(Error::Cancelled) => StreamOutcome::Cancelled,
            Err(err) => {
                log::error!("answer stream failed: {err}");
                let fallback = apologetic_answer(&err);
                if answer_buf.is_empty() {
                    let _ = emit(tx, AgentEvent::AnswerChunk { chunk: fallback.clone() });
                    StreamOutcome::Text(fallback)
                } else {
                    StreamOutcome::Text(answer_buf)
                }
            }
        }
    }
}

enum StreamOutcome {
    Text(String),
    Cancelled,
}

/// Counts per tool across a completed run, keyed by name, for callers that
/// want a summary without walking `tool_calls` themselves (e.g. the
/// `GET /api/sessions/{key}` read path).
pub fn tool_call_summary(tool_calls: &[ToolCallRecord]) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for call in tool_calls {
        *counts.entry(call.name.clone()).or_insert(0) += 1;
    }
    counts
}
