//! # Error Types for the Agent Runtime
//!
//! This module defines all error types used throughout the runtime, providing
//! comprehensive error handling with detailed context for different failure
//! scenarios.
//!
//! ## Design Philosophy
//!
//! - **Explicit Error Handling**: Uses Rust's `Result<T>` type for all fallible
//!   operations
//! - **No Silent Failures**: All errors are propagated explicitly to the caller
//! - **Rich Context**: Each error variant provides specific information about what
//!   went wrong
//! - **Easy Conversion**: Automatic conversion from common error types (reqwest,
//!   serde_json, io)
//!
//! ## Usage
//!
//! ```ignore
//! use mini_agent::{Error, Result};
//!
//! fn example() -> Result<()> {
//!     if some_condition {
//!         return Err(Error::config("Invalid model name"));
//!     }
//!
//!     let response = http_client.get(url).send().await?; // Auto-converts to Error::Http
//!     let json = serde_json::from_str(data)?; // Auto-converts to Error::Json
//!
//!     Ok(())
//! }
//! ```

use thiserror::Error;

// ============================================================================
// TYPE ALIASES
// ============================================================================

/// Type alias for `Result<T, Error>` used throughout the runtime.
pub type Result<T> = std::result::Result<T, Error>;

// ============================================================================
// ERROR ENUM
// ============================================================================

/// Comprehensive error type covering all failure modes in the runtime.
///
/// ## Error Categories
///
/// - **HTTP**: Network communication failures (connection errors, timeouts, etc.)
/// - **JSON**: Serialization/deserialization failures
/// - **Io**: Filesystem failures in the session/context/memory stores
/// - **Config**: Invalid or missing configuration
/// - **BadArguments**: Tool arguments failed schema validation
/// - **NotFound**: A session, pointer, tool or skill lookup failed
/// - **ToolTimeout**: A tool handler exceeded its timeout
/// - **ToolFailed**: A tool handler returned an error
/// - **LlmError**: The provider call failed
/// - **LlmRateLimit**: A retryable subset of `LlmError`
/// - **Cancelled**: The operation was cancelled (client disconnect, shutdown)
/// - **Other**: Catch-all for miscellaneous errors
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed due to network issues, connection problems, or HTTP
    /// errors. Wraps `reqwest::Error`; auto-converted via `?`.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization or deserialization failed. Wraps `serde_json::Error`.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing failed (skill front-matter). Wraps `serde_yaml::Error`.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Filesystem operation failed in a store. Wraps `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or missing configuration detected at startup or in a builder.
    #[error("configuration error: {0}")]
    Config(String),

    /// Error response received from the model server's API (request succeeded,
    /// server rejected it).
    #[error("API error: {0}")]
    Api(String),

    /// Error occurred while processing the streaming response (SSE parsing,
    /// unexpected chunk shape, interrupted stream).
    #[error("streaming error: {0}")]
    Stream(String),

    /// Tool arguments failed schema validation before the handler ran.
    #[error("bad arguments for tool '{tool}': {reason}")]
    BadArguments { tool: String, reason: String },

    /// A session, tool-context pointer, tool, or skill lookup failed.
    #[error("not found: {0}")]
    NotFound(String),

    /// A tool handler exceeded its configured timeout.
    #[error("tool '{0}' timed out")]
    ToolTimeout(String),

    /// A tool handler ran and returned an error.
    #[error("tool '{tool}' failed: {message}")]
    ToolFailed { tool: String, message: String },

    /// The LLM provider call failed (network, auth, malformed response).
    #[error("LLM error: {0}")]
    LlmError(String),

    /// A retryable subset of `LlmError` — rate limiting or transient 5xx.
    #[error("LLM rate limited: {0}")]
    LlmRateLimit(String),

    /// The operation was cancelled (client disconnect or server shutdown).
    #[error("cancelled")]
    Cancelled,

    /// Invalid input provided by the caller (empty prompt, malformed session key).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Miscellaneous error that doesn't fit other categories. Used sparingly.
    #[error("error: {0}")]
    Other(String),
}

// ============================================================================
// CONVENIENCE CONSTRUCTORS
// ============================================================================

impl Error {
    /// Create a new configuration error with a descriptive message.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a new API error with the server's error message.
    pub fn api(msg: impl Into<String>) -> Self {
        Error::Api(msg.into())
    }

    /// Create a new streaming error for SSE parsing or stream processing
    /// failures.
    pub fn stream(msg: impl Into<String>) -> Self {
        Error::Stream(msg.into())
    }

    /// Create a bad-arguments error for a named tool.
    pub fn bad_arguments(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::BadArguments {
            tool: tool.into(),
            reason: reason.into(),
        }
    }

    /// Create a not-found error for the given resource description.
    pub fn not_found(what: impl Into<String>) -> Self {
        Error::NotFound(what.into())
    }

    /// Create a tool-failed error for a named tool.
    pub fn tool_failed(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ToolFailed {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Create a new invalid input error for caller input validation failures.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }

    /// Create a new miscellaneous error for cases that don't fit other
    /// categories.
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// True if this error represents a condition the loop should recover from
    /// locally (tool-scope failure) rather than abort the whole query on.
    pub fn is_tool_scope(&self) -> bool {
        matches!(
            self,
            Error::BadArguments { .. } | Error::ToolTimeout(_) | Error::ToolFailed { .. }
        )
    }

    /// True if retrying the operation that produced this error might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::LlmRateLimit(_))
    }

    /// A short, human-readable string safe to stream to a client as a
    /// `tool_error.error` field. Internal detail (stack traces, inner causes)
    /// is available via `Display`/`log::error!` but not repeated here.
    pub fn user_message(&self) -> String {
        match self {
            Error::BadArguments { reason, .. } => reason.clone(),
            Error::ToolTimeout(tool) => format!("{tool} timed out"),
            Error::ToolFailed { message, .. } => message.clone(),
            Error::Cancelled => "cancelled".to_string(),
            other => other.to_string(),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_config() {
        let err = Error::config("Invalid model");
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(err.to_string(), "configuration error: Invalid model");
    }

    #[test]
    fn test_error_api() {
        let err = Error::api("500 Internal Server Error");
        assert!(matches!(err, Error::Api(_)));
        assert_eq!(err.to_string(), "API error: 500 Internal Server Error");
    }

    #[test]
    fn test_error_stream() {
        let err = Error::stream("Connection lost");
        assert!(matches!(err, Error::Stream(_)));
        assert_eq!(err.to_string(), "streaming error: Connection lost");
    }

    #[test]
    fn test_error_bad_arguments() {
        let err = Error::bad_arguments("web_search", "missing field `q`");
        assert!(matches!(err, Error::BadArguments { .. }));
        assert_eq!(
            err.to_string(),
            "bad arguments for tool 'web_search': missing field `q`"
        );
    }

    #[test]
    fn test_error_not_found() {
        let err = Error::not_found("session 'abc'");
        assert_eq!(err.to_string(), "not found: session 'abc'");
    }

    #[test]
    fn test_error_tool_failed_is_tool_scope() {
        let err = Error::tool_failed("echo", "boom");
        assert!(err.is_tool_scope());
        assert!(!Error::Cancelled.is_tool_scope());
    }

    #[test]
    fn test_error_rate_limit_is_retryable() {
        let err = Error::LlmRateLimit("429".to_string());
        assert!(err.is_retryable());
        assert!(!Error::LlmError("boom".to_string()).is_retryable());
    }

    #[test]
    fn test_error_invalid_input() {
        let err = Error::invalid_input("Missing parameter");
        assert!(matches!(err, Error::InvalidInput(_)));
        assert_eq!(err.to_string(), "invalid input: Missing parameter");
    }

    #[test]
    fn test_error_other() {
        let err = Error::other("Something went wrong");
        assert!(matches!(err, Error::Other(_)));
        assert_eq!(err.to_string(), "error: Something went wrong");
    }

    #[test]
    fn test_error_from_reqwest() {
        fn _test_conversion(_e: reqwest::Error) -> Error {
            Error::Http(_e)
        }
    }

    #[test]
    fn test_error_from_serde_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn test_user_message_hides_tool_prefix() {
        let err = Error::tool_failed("echo", "division by zero");
        assert_eq!(err.user_message(), "division by zero");
    }

    #[test]
    fn test_result_type_alias() {
        fn _returns_result() -> Result<i32> {
            Ok(42)
        }

        fn _returns_error() -> Result<i32> {
            Err(Error::other("boom"))
        }
    }
}
