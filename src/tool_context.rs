//! Tool Context Store: content-addressed storage for oversized tool results.
//!
//! A tool result larger than the inline budget is written once, keyed by an
//! opaque pointer id, and the scratchpad carries the pointer instead of the
//! bytes. `render` is the only way back to content: it inlines results under
//! `max_inline_chars` and otherwise hands back a short pointer reference the
//! model can re-request verbatim through the `read_pointer` tool (see
//! `tools.rs`).

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use uuid::Uuid;

const POINTER_PREFIX: &str = "ptr_";

/// A stored tool result, addressed by `pointer_id`. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredContent {
    pub pointer_id: String,
    pub tool_name: String,
    pub arguments: Value,
    pub full_result_text: String,
    pub created_at: i64,
}

/// Content-addressed pointer store for oversized tool output.
pub struct ToolContextStore {
    root: PathBuf,
}

impl ToolContextStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn dir(&self) -> PathBuf {
        self.root.join("context")
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir().join(format!("{id}.json"))
    }

    /// Store a tool call's full result under a freshly generated pointer id
    /// and return it.
    pub fn put(&self, tool_name: &str, arguments: &Value, full_result_text: &str) -> Result<String> {
        std::fs::create_dir_all(self.dir())?;
        let id = format!("{POINTER_PREFIX}{}", Uuid::new_v4().simple());
        let entry = StoredContent {
            pointer_id: id.clone(),
            tool_name: tool_name.to_string(),
            arguments: arguments.clone(),
            full_result_text: full_result_text.to_string(),
            created_at: chrono::Utc::now().timestamp_millis(),
        };
        std::fs::write(self.path_for(&id), serde_json::to_string(&entry)?)?;
        Ok(id)
    }

    /// Fetch the full entry for a previously stored pointer.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if `id` is not a known pointer.
    pub fn get(&self, id: &str) -> Result<StoredContent> {
        let raw = std::fs::read_to_string(self.path_for(id))
            .map_err(|_| Error::not_found(format!("pointer '{id}'")))?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Render a raw tool result for inclusion in the scratchpad: if it fits
    /// under `max_inline_chars`, the content is returned inline; otherwise it
    /// is persisted (with its originating tool name and arguments) and a
    /// pointer placeholder is returned instead.
    ///
    /// Size is measured in characters (not bytes) to match the model's token
    /// budget, which is roughly proportional to character count.
    pub fn render(
        &self,
        tool_name: &str,
        arguments: &Value,
        content: &str,
        max_inline_chars: usize,
    ) -> Result<RenderedContent> {
        if content.chars().count() <= max_inline_chars {
            return Ok(RenderedContent::Inline(content.to_string()));
        }

        let id = self.put(tool_name, arguments, content)?;
        let preview: String = content.chars().take(200).collect();
        Ok(RenderedContent::Pointer {
            id: id.clone(),
            preview: preview.clone(),
            placeholder: format!(
                "[result too large to inline; {} chars stored as pointer {id}; preview: {preview}...]",
                content.chars().count()
            ),
        })
    }
}

/// Outcome of rendering a tool result for scratchpad inclusion.
#[derive(Debug, Clone)]
pub enum RenderedContent {
    Inline(String),
    Pointer {
        id: String,
        preview: String,
        placeholder: String,
    },
}

impl RenderedContent {
    /// The text that should actually be written into the scratchpad.
    pub fn as_scratchpad_text(&self) -> &str {
        match self {
            RenderedContent::Inline(text) => text,
            RenderedContent::Pointer { placeholder, .. } => placeholder,
        }
    }
}
