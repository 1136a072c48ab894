//! # mini-agent-server
//!
//! A long-lived agent runtime: a reason/act loop over a tool-calling LLM,
//! exposed as an HTTP+SSE server.
//!
//! ## Overview
//!
//! A client posts a message to a session; the server loads that session's
//! history, lets the model reason and call tools across a bounded number of
//! iterations, and streams back `thinking` / `tool_start` / `tool_end` /
//! `answer_chunk` / `done` events over Server-Sent Events while persisting
//! the resulting turns to disk.
//!
//! ## Key Features
//!
//! - **Durable sessions**: conversation history lives on disk, keyed by a
//!   normalized session key, independent of any single HTTP connection.
//! - **Tool calling**: a JSON-Schema-described tool registry the loop
//!   dispatches into, with per-category soft limits and a timeout per call.
//! - **Context management**: token-estimated history truncation keeps a
//!   long-lived session's prompt bounded.
//! - **Tool-context pointers**: oversized tool results are stored once and
//!   referenced by a short pointer id instead of repeated in full.
//! - **Cross-session memory**: prior turns are indexed and recalled into new
//!   queries as contextual hints.
//! - **Skills**: Markdown-with-frontmatter capability bundles loaded from
//!   three precedence tiers and matched against the user's prompt.
//! - **Cancellation**: a client disconnecting the SSE stream cancels the
//!   in-flight loop promptly rather than running it to completion unheard.
//!
//! ## Example
//!
//! ```rust,no_run
//! use mini_agent::{AgentDeps, AgentLoop, Config, MemoryIndex, OpenAiAdapter, SessionStore, ToolContextStore, ToolRegistry};
//! use std::sync::Arc;
//!
//! # async fn run() -> mini_agent::Result<()> {
//! let config = Config::from_env()?;
//! let deps = Arc::new(AgentDeps {
//!     sessions: Arc::new(SessionStore::new(&config.storage_root)),
//!     tool_context: Arc::new(ToolContextStore::new(&config.storage_root)),
//!     memory: Arc::new(MemoryIndex::new(&config.storage_root)),
//!     tools: Arc::new(ToolRegistry::new()),
//!     llm: Arc::new(OpenAiAdapter::new(
//!         reqwest::Client::new(),
//!         config.openai_api_key.clone(),
//!         config.openai_base_url.clone(),
//!         config.openai_model.clone(),
//!     )),
//!     config,
//! });
//! let agent_loop = AgentLoop::new(deps);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **agent**: the reason/act/answer loop and its cancellation primitive.
//! - **config**: process-wide configuration, read once from the environment.
//! - **context**: token estimation and history truncation utilities.
//! - **error**: the `Error` enum and `Result<T>` alias used throughout.
//! - **events**: the `AgentEvent` wire contract streamed over SSE.
//! - **http**: the axum router — the SSE chat endpoint and the read-only API.
//! - **llm**: the `LlmAdapter` trait and its OpenAI-compatible implementation.
//! - **memory**: cross-session recall of prior turns.
//! - **retry**: exponential backoff with jitter for transient provider errors.
//! - **scratchpad**: the in-memory record of one query's reasoning steps.
//! - **session**: durable, append-only conversation history per session key.
//! - **skills**: the Markdown skill loader and registry.
//! - **tool_context**: the pointer store for oversized tool results.
//! - **tools**: tool definition, schema validation, and dispatch.
//! - **types**: message and tool-call-record data structures.

pub mod agent;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod http;
pub mod llm;
pub mod memory;
pub mod retry;
pub mod scratchpad;
pub mod session;
pub mod skills;
pub mod tool_context;
pub mod tools;
pub mod types;

// --- Agent Loop ---

pub use agent::{AgentDeps, AgentLoop, Cancellation, LoopOutcome};

// --- Configuration ---

pub use config::Config;

// --- Context Management ---

pub use context::{estimate_tokens, is_approaching_limit, truncate_messages};

// --- Error Handling ---

pub use error::{Error, Result};

// --- Streaming Events ---

pub use events::{AgentEvent, DoneToolCall};

// --- LLM Adapter ---

pub use llm::{CompletionResult, LlmAdapter, OpenAiAdapter};

// --- Cross-Session Memory ---

pub use memory::{MemoryEntry, MemoryIndex, RecallHit};

// --- Scratchpad ---

pub use scratchpad::{Scratchpad, Step};

// --- Session Store ---

pub use session::{normalize_session_key, SessionMetadata, SessionStore, SessionSummary};

// --- Skills ---

pub use skills::{MatchResult, Skill, SkillLoader, SkillRegistry, SkillTier};

// --- Tool Context Store ---

pub use tool_context::{RenderedContent, StoredContent, ToolContextStore};

// --- Tool System ---

pub use tools::{
    browser_tool, read_file_tool, read_pointer_tool, skill_tool, tool, web_search_tool,
    list_dir_tool, ToolBuilder, ToolHandler, ToolRegistry, ToolSpec,
};

// --- Core Types ---

pub use types::{Message, MessageRole, ToolCallRecord};

// ============================================================================
// CONVENIENCE PRELUDE
// ============================================================================

/// The most commonly used types and functions for embedding this runtime.
/// Import with `use mini_agent::prelude::*;`.
pub mod prelude {
    pub use crate::{
        tool, AgentDeps, AgentLoop, Config, Error, LlmAdapter, Message, MessageRole,
        MemoryIndex, OpenAiAdapter, Result, Scratchpad, SessionStore, SkillLoader, SkillRegistry,
        ToolContextStore, ToolRegistry, ToolSpec,
    };
}
