//! Process-wide configuration, read once at startup from the environment.
//!
//! Generalizes the teacher SDK's provider-endpoint helpers ("pick an
//! LMStudio/Ollama base URL") into the full set of knobs this server needs:
//! provider credentials, storage location, and the agent loop's iteration and
//! soft-limit thresholds. Built with the same builder discipline as
//! `AgentOptionsBuilder` — required fields are checked once, at `build()`, not
//! scattered across call sites.

use crate::error::{Error, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Default number of reasoning/acting iterations before the loop force-answers.
pub const DEFAULT_N_ITER: usize = 8;
/// Default per-tool invocation timeout.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(60);
/// Default soft limit on tool calls within a single category (e.g. "search").
pub const DEFAULT_SOFT_LIMIT_CATEGORY: usize = 4;
/// Default soft limit on total tool calls across a query.
pub const DEFAULT_SOFT_LIMIT_TOTAL: usize = 8;
/// Default bytes inlined from a tool result before it's replaced by a pointer.
pub const DEFAULT_MAX_INLINE_CHARS: usize = 2048;
/// Default estimated-token budget a session's history may occupy before
/// older turns are truncated out of the prompt.
pub const DEFAULT_HISTORY_TOKEN_LIMIT: usize = 6000;
/// Default number of trailing user/assistant turns kept when truncating.
pub const DEFAULT_HISTORY_KEEP_TURNS: usize = 40;
/// Default chat-completions model when `OPENAI_MODEL` is unset.
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

/// Fully resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub openai_model: String,
    pub tavily_api_key: Option<String>,
    pub browser_runtime_enabled: bool,
    pub storage_root: PathBuf,
    pub bind_addr: String,
    pub n_iter: usize,
    pub tool_timeout: Duration,
    pub soft_limit_category: usize,
    pub soft_limit_total: usize,
    pub max_inline_chars: usize,
    pub history_token_limit: usize,
    pub history_keep_turns: usize,
}

impl Config {
    /// Build configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if `OPENAI_API_KEY` is unset.
    pub fn from_env() -> Result<Self> {
        let openai_api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| Error::config("OPENAI_API_KEY is required"))?;
        if openai_api_key.trim().is_empty() {
            return Err(Error::config("OPENAI_API_KEY must not be empty"));
        }

        let openai_base_url = std::env::var("OPENAI_BASE_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        let openai_model = std::env::var("OPENAI_MODEL")
            .unwrap_or_else(|_| DEFAULT_OPENAI_MODEL.to_string());
        let tavily_api_key = std::env::var("TAVILY_API_KEY").ok().filter(|s| !s.is_empty());
        let browser_runtime_enabled = std::env::var("BROWSER_RUNTIME").is_ok();
        let storage_root = std::env::var("MINI_AGENT_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(".mini-agent"));
        let bind_addr =
            std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());

        Ok(Self {
            openai_api_key,
            openai_base_url,
            openai_model,
            tavily_api_key,
            browser_runtime_enabled,
            storage_root,
            bind_addr,
            n_iter: DEFAULT_N_ITER,
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
            soft_limit_category: DEFAULT_SOFT_LIMIT_CATEGORY,
            soft_limit_total: DEFAULT_SOFT_LIMIT_TOTAL,
            max_inline_chars: DEFAULT_MAX_INLINE_CHARS,
            history_token_limit: DEFAULT_HISTORY_TOKEN_LIMIT,
            history_keep_turns: DEFAULT_HISTORY_KEEP_TURNS,
        })
    }

    /// Start a builder for tests and embedders that don't want to touch the
    /// real process environment.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for `Config`, primarily used by tests that need deterministic
/// configuration without environment variables.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    openai_api_key: Option<String>,
    openai_base_url: Option<String>,
    openai_model: Option<String>,
    tavily_api_key: Option<String>,
    browser_runtime_enabled: bool,
    storage_root: Option<PathBuf>,
    bind_addr: Option<String>,
    n_iter: Option<usize>,
    tool_timeout: Option<Duration>,
    soft_limit_category: Option<usize>,
    soft_limit_total: Option<usize>,
    max_inline_chars: Option<usize>,
    history_token_limit: Option<usize>,
    history_keep_turns: Option<usize>,
}

impl ConfigBuilder {
    pub fn openai_api_key(mut self, key: impl Into<String>) -> Self {
        self.openai_api_key = Some(key.into());
        self
    }

    pub fn openai_base_url(mut self, url: impl Into<String>) -> Self {
        self.openai_base_url = Some(url.into());
        self
    }

    pub fn openai_model(mut self, model: impl Into<String>) -> Self {
        self.openai_model = Some(model.into());
        self
    }

    pub fn tavily_api_key(mut self, key: impl Into<String>) -> Self {
        self.tavily_api_key = Some(key.into());
        self
    }

    pub fn browser_runtime_enabled(mut self, enabled: bool) -> Self {
        self.browser_runtime_enabled = enabled;
        self
    }

    pub fn storage_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage_root = Some(path.into());
        self
    }

    pub fn bind_addr(mut self, addr: impl Into<String>) -> Self {
        self.bind_addr = Some(addr.into());
        self
    }

    pub fn n_iter(mut self, n: usize) -> Self {
        self.n_iter = Some(n);
        self
    }

    pub fn tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = Some(timeout);
        self
    }

    pub fn soft_limit_category(mut self, limit: usize) -> Self {
        self.soft_limit_category = Some(limit);
        self
    }

    pub fn soft_limit_total(mut self, limit: usize) -> Self {
        self.soft_limit_total = Some(limit);
        self
    }

    pub fn max_inline_chars(mut self, chars: usize) -> Self {
        self.max_inline_chars = Some(chars);
        self
    }

    pub fn history_token_limit(mut self, limit: usize) -> Self {
        self.history_token_limit = Some(limit);
        self
    }

    pub fn history_keep_turns(mut self, turns: usize) -> Self {
        self.history_keep_turns = Some(turns);
        self
    }

    /// # Errors
    ///
    /// Returns `Error::Config` if `openai_api_key` was never set.
    pub fn build(self) -> Result<Config> {
        let openai_api_key = self
            .openai_api_key
            .ok_or_else(|| Error::config("openai_api_key is required"))?;

        Ok(Config {
            openai_api_key,
            openai_base_url: self
                .openai_base_url
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            openai_model: self.openai_model.unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            tavily_api_key: self.tavily_api_key,
            browser_runtime_enabled: self.browser_runtime_enabled,
            storage_root: self.storage_root.unwrap_or_else(|| PathBuf::from(".mini-agent")),
            bind_addr: self.bind_addr.unwrap_or_else(|| "127.0.0.1:8080".to_string()),
            n_iter: self.n_iter.unwrap_or(DEFAULT_N_ITER),
            tool_timeout: self.tool_timeout.unwrap_or(DEFAULT_TOOL_TIMEOUT),
            soft_limit_category: self.soft_limit_category.unwrap_or(DEFAULT_SOFT_LIMIT_CATEGORY),
            soft_limit_total: self.soft_limit_total.unwrap_or(DEFAULT_SOFT_LIMIT_TOTAL),
            max_inline_chars: self.max_inline_chars.unwrap_or(DEFAULT_MAX_INLINE_CHARS),
            history_token_limit: self.history_token_limit.unwrap_or(DEFAULT_HISTORY_TOKEN_LIMIT),
            history_keep_turns: self.history_keep_turns.unwrap_or(DEFAULT_HISTORY_KEEP_TURNS),
        })
    }
}
