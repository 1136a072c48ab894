//! Scratchpad: the per-query working memory the agent loop builds up across
//! iterations and folds into the next prompt.
//!
//! Grounded in the same tagged-step shape the agent loop example uses for
//! its own message history (`Msg::Assistant` / `Msg::ToolCall` /
//! `Msg::ToolResult`), but scoped to a single query rather than a whole
//! session: a `Scratchpad` is discarded once the loop reaches `Done`, while
//! the Session Store keeps the durable record. `render` is deterministic so
//! the same scratchpad always produces the same prompt fragment, which is
//! what lets the iteration-cap and soft-limit tests in `agent_loop.rs`
//! assert on exact prompt content.

use serde_json::Value;
use std::collections::HashMap;

/// One recorded step of a query's reasoning trace.
#[derive(Debug, Clone)]
pub enum Step {
    /// Free-form reasoning text the model produced before acting.
    Thought(String),
    /// A tool call the model requested.
    Act { call_id: String, tool: String, arguments: Value },
    /// The (possibly pointer-inlined) result of a tool call.
    Observe { call_id: String, tool: String, rendered: String },
    /// A soft-limit notice injected by the loop instead of a model turn.
    LimitNotice(String),
}

/// Per-query working memory: an ordered trace of thoughts, actions, and
/// observations, with helpers to bound tool-call volume.
#[derive(Debug, Clone, Default)]
pub struct Scratchpad {
    steps: Vec<Step>,
}

impl Scratchpad {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, step: Step) {
        self.steps.push(step);
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Number of `Act` steps recorded for the given tool name.
    pub fn tool_call_count(&self, tool: &str) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s, Step::Act { tool: t, .. } if t == tool))
            .count()
    }

    /// Number of `Act` steps recorded across all tools whose name maps to
    /// `category` under the given categorizer.
    pub fn tool_call_count_in_category(&self, category: &str, categorize: impl Fn(&str) -> &str) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s, Step::Act { tool, .. } if categorize(tool) == category))
            .count()
    }

    /// Total number of `Act` steps recorded.
    pub fn total_tool_call_count(&self) -> usize {
        self.steps.iter().filter(|s| matches!(s, Step::Act { .. })).count()
    }

    /// Counts per tool name, for diagnostics and the `/api/chat` trace.
    pub fn tool_call_counts(&self) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        for step in &self.steps {
            if let Step::Act { tool, .. } = step {
                *counts.entry(tool.clone()).or_insert(0) += 1;
            }
        }
        counts
    }

    /// Render the scratchpad into a deterministic prompt fragment, one line
    /// per step, in the order recorded.
    pub fn render(&self) -> String {
        let mut lines = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            let line = match step {
                Step::Thought(text) => format!("Thought: {text}"),
                Step::Act { tool, arguments, .. } => format!("Act: {tool}({arguments})"),
                Step::Observe { tool, rendered, .. } => format!("Observe[{tool}]: {rendered}"),
                Step::LimitNotice(text) => format!("LimitNotice: {text}"),
            };
            lines.push(line);
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_is_deterministic_and_ordered() {
        let mut pad = Scratchpad::new();
        pad.push(Step::Thought("need to search".to_string()));
        pad.push(Step::Act {
            call_id: "c1".to_string(),
            tool: "web_search".to_string(),
            arguments: json!({"query": "rust async"}),
        });
        pad.push(Step::Observe {
            call_id: "c1".to_string(),
            tool: "web_search".to_string(),
            rendered: "- result one".to_string(),
        });

        let rendered = pad.render();
        assert_eq!(
            rendered,
            "Thought: need to search\nAct: web_search({\"query\":\"rust async\"})\nObserve[web_search]: - result one"
        );
    }

    #[test]
    fn test_tool_call_count_by_name() {
        let mut pad = Scratchpad::new();
        for _ in 0..3 {
            pad.push(Step::Act {
                call_id: "c".to_string(),
                tool: "web_search".to_string(),
                arguments: json!({}),
            });
        }
        pad.push(Step::Act {
            call_id: "c4".to_string(),
            tool: "read_file".to_string(),
            arguments: json!({}),
        });

        assert_eq!(pad.tool_call_count("web_search"), 3);
        assert_eq!(pad.tool_call_count("read_file"), 1);
        assert_eq!(pad.total_tool_call_count(), 4);
    }

    #[test]
    fn test_tool_call_count_in_category() {
        let mut pad = Scratchpad::new();
        pad.push(Step::Act { call_id: "1".to_string(), tool: "web_search".to_string(), arguments: json!({}) });
        pad.push(Step::Act { call_id: "2".to_string(), tool: "browser".to_string(), arguments: json!({}) });

        let categorize = |tool: &str| match tool {
            "web_search" | "browser" => "search",
            other => other,
        };
        assert_eq!(pad.tool_call_count_in_category("search", categorize), 2);
    }

    #[test]
    fn test_empty_scratchpad_renders_empty_string() {
        let pad = Scratchpad::new();
        assert!(pad.is_empty());
        assert_eq!(pad.render(), "");
    }
}
