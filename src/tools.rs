//! Tool definition and execution: a registry of named, JSON-schema-described
//! capabilities the agent loop can invoke, plus the concrete tools this
//! server ships with.
//!
//! Generalizes the teacher SDK's tool-definition system (`ToolBuilder`,
//! `tool()`) from a type-safe parameter macro into a plain JSON Schema object,
//! since this runtime's tool arguments come back from the wire as
//! `serde_json::Value` and are validated once, centrally, in `invoke`.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};

/// A tool's executable side: given validated arguments, produce a result
/// string (or a tool-scoped error, which the agent loop feeds back to the
/// model as an `Observe` rather than aborting the run).
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, arguments: Value) -> Result<String>;
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

struct FnHandler<F>(F)
where
    F: Fn(Value) -> BoxFuture<'static, Result<String>> + Send + Sync;

#[async_trait]
impl<F> ToolHandler for FnHandler<F>
where
    F: Fn(Value) -> BoxFuture<'static, Result<String>> + Send + Sync,
{
    async fn call(&self, arguments: Value) -> Result<String> {
        (self.0)(arguments).await
    }
}

/// A registered tool: name, description, JSON Schema for its arguments, and
/// its handler.
///
/// `category` groups tools for the agent loop's soft-limit bookkeeping (e.g.
/// `web_search` and `browser` both count against a "search" budget) and
/// defaults to the tool's own name when a tool is a category of one.
#[derive(Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
    pub category: String,
    handler: Arc<dyn ToolHandler>,
}

impl std::fmt::Debug for ToolSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolSpec")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("parameters", &self.parameters)
            .field("category", &self.category)
            .finish()
    }
}

/// Fluent builder for a `ToolSpec`, mirroring the teacher SDK's `tool()` /
/// `ToolBuilder` entry point.
pub struct ToolBuilder {
    name: String,
    description: String,
    properties: serde_json::Map<String, Value>,
    required: Vec<String>,
    category: Option<String>,
    handler: Option<Arc<dyn ToolHandler>>,
}

/// Start building a tool with the given name and description.
pub fn tool(name: impl Into<String>, description: impl Into<String>) -> ToolBuilder {
    ToolBuilder {
        name: name.into(),
        description: description.into(),
        properties: serde_json::Map::new(),
        required: Vec::new(),
        category: None,
        handler: None,
    }
}

impl ToolBuilder {
    /// Declare a string/number/boolean/array/object-typed parameter.
    pub fn param(mut self, name: impl Into<String>, json_type: &str, description: impl Into<String>, required: bool) -> Self {
        let name = name.into();
        self.properties.insert(
            name.clone(),
            json!({ "type": json_type, "description": description.into() }),
        );
        if required {
            self.required.push(name);
        }
        self
    }

    /// Group this tool under a soft-limit category shared with other tools
    /// (e.g. `web_search` and `browser` both under `"search"`). Defaults to
    /// the tool's own name.
    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Set the handler invoked with validated arguments.
    pub fn handler<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String>> + Send + 'static,
    {
        self.handler = Some(Arc::new(FnHandler(move |args| {
            Box::pin(handler(args)) as BoxFuture<'static, Result<String>>
        })));
        self
    }

    /// Finalize the tool.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if no handler was set.
    pub fn build(self) -> Result<ToolSpec> {
        let handler = self
            .handler
            .ok_or_else(|| Error::config(format!("tool '{}' has no handler", self.name)))?;

        Ok(ToolSpec {
            category: self.category.unwrap_or_else(|| self.name.clone()),
            name: self.name,
            description: self.description,
            parameters: json!({
                "type": "object",
                "properties": Value::Object(self.properties),
                "required": self.required,
            }),
            handler,
        })
    }
}

impl ToolSpec {
    fn validate(&self, arguments: &Value) -> Result<()> {
        let Some(required) = self.parameters.get("required").and_then(|r| r.as_array()) else {
            return Ok(());
        };
        let obj = arguments.as_object();
        for key in required {
            let Some(key) = key.as_str() else { continue };
            let present = obj.is_some_and(|o| o.contains_key(key));
            if !present {
                return Err(Error::bad_arguments(&self.name, format!("missing required argument '{key}'")));
            }
        }
        Ok(())
    }
}

/// A registry of tools available to the agent loop, gated at construction
/// time by environment capability (e.g. no `web_search` entry if no Tavily
/// key is configured).
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolSpec>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, spec: ToolSpec) {
        self.tools.insert(spec.name.clone(), spec);
    }

    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.get(name)
    }

    pub fn list(&self) -> Vec<&ToolSpec> {
        let mut specs: Vec<&ToolSpec> = self.tools.values().collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    /// Validate arguments, then run the tool's handler under `timeout`.
    ///
    /// # Errors
    ///
    /// `Error::NotFound` if the tool is unregistered, `Error::BadArguments`
    /// on schema mismatch, `Error::ToolTimeout` if the handler outruns
    /// `timeout`, or whatever the handler itself returns on failure.
    pub async fn invoke(&self, name: &str, arguments: Value, timeout: Duration) -> Result<String> {
        let spec = self
            .get(name)
            .ok_or_else(|| Error::not_found(format!("tool '{name}'")))?;
        spec.validate(&arguments)?;

        match tokio::time::timeout(timeout, spec.handler.call(arguments)).await {
            Ok(result) => result,
            Err(_) => Err(Error::ToolTimeout(name.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Concrete tools
// ---------------------------------------------------------------------------

/// `web_search`: queries the Tavily search API. Only registered when a
/// Tavily API key is configured.
pub fn web_search_tool(client: reqwest::Client, api_key: String) -> Result<ToolSpec> {
    tool("web_search", "Search the web for up-to-date information and return a short list of results.")
        .category("search")
        .param("query", "string", "the search query", true)
        .handler(move |args| {
            let client = client.clone();
            let api_key = api_key.clone();
            async move {
                let query = args
                    .get("query")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| Error::bad_arguments("web_search", "missing 'query' string"))?;

                let response = client
                    .post("https://api.tavily.com/search")
                    .json(&json!({ "api_key": api_key, "query": query, "max_results": 5 }))
                    .send()
                    .await
                    .map_err(|e| Error::tool_failed("web_search", e.to_string()))?;

                if !response.status().is_success() {
                    return Err(Error::tool_failed(
                        "web_search",
                        format!("search provider returned {}", response.status()),
                    ));
                }

                let body: Value = response
                    .json()
                    .await
                    .map_err(|e| Error::tool_failed("web_search", e.to_string()))?;

                let results = body
                    .get("results")
                    .and_then(|r| r.as_array())
                    .cloned()
                    .unwrap_or_default();

                let formatted: Vec<String> = results
                    .iter()
                    .filter_map(|r| {
                        let title = r.get("title")?.as_str()?;
                        let url = r.get("url")?.as_str()?;
                        Some(format!("- {title} ({url})"))
                    })
                    .collect();

                Ok(if formatted.is_empty() {
                    "No results found.".to_string()
                } else {
                    formatted.join("\n")
                })
            }
        })
        .build()
}

/// Reject any requested path, relative or absolute, that resolves outside
/// `root` once `..` segments are collapsed. Unlike `Path::canonicalize`, this
/// works whether or not the target already exists.
fn resolve_sandboxed(root: &Path, requested: &str) -> Result<PathBuf> {
    let mut components: Vec<std::path::Component> = Vec::new();
    for component in Path::new(requested).components() {
        match component {
            std::path::Component::ParentDir => {
                if components.pop().is_none() {
                    return Err(Error::bad_arguments("read_file", "path escapes the sandbox root"));
                }
            }
            std::path::Component::Normal(_) => components.push(component),
            std::path::Component::CurDir => {}
            std::path::Component::RootDir | std::path::Component::Prefix(_) => {}
        }
    }

    let mut resolved = root.to_path_buf();
    for component in components {
        resolved.push(component.as_os_str());
    }
    Ok(resolved)
}

/// `read_file`: reads a UTF-8 file from within a sandboxed root directory.
pub fn read_file_tool(sandbox_root: PathBuf) -> Result<ToolSpec> {
    tool("read_file", "Read the contents of a text file within the sandboxed workspace.")
        .category("filesystem")
        .param("path", "string", "path relative to the workspace root", true)
        .handler(move |args| {
            let root = sandbox_root.clone();
            async move {
                let path = args
                    .get("path")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| Error::bad_arguments("read_file", "missing 'path' string"))?;
                let resolved = resolve_sandboxed(&root, path)?;
                std::fs::read_to_string(&resolved)
                    .map_err(|e| Error::tool_failed("read_file", e.to_string()))
            }
        })
        .build()
}

/// `list_dir`: lists entries of a directory within the sandboxed root.
pub fn list_dir_tool(sandbox_root: PathBuf) -> Result<ToolSpec> {
    tool("list_dir", "List files and directories within the sandboxed workspace.")
        .category("filesystem")
        .param("path", "string", "path relative to the workspace root", false)
        .handler(move |args| {
            let root = sandbox_root.clone();
            async move {
                let path = args.get("path").and_then(|v| v.as_str()).unwrap_or(".");
                let resolved = resolve_sandboxed(&root, path)?;
                let entries = std::fs::read_dir(&resolved)
                    .map_err(|e| Error::tool_failed("list_dir", e.to_string()))?;

                let mut names: Vec<String> = entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect();
                names.sort();
                Ok(names.join("\n"))
            }
        })
        .build()
}

/// `browser`: a navigable browser session. Only a contract stub here - the
/// actual driver (e.g. a CDP client) lives outside this crate's scope and is
/// wired in by the embedder via `BROWSER_RUNTIME`. Unregistered entirely
/// unless that capability flag is set.
pub fn browser_tool() -> Result<ToolSpec> {
    tool("browser", "Navigate to a URL and return the page's visible text. Requires a configured browser runtime.")
        .category("search")
        .param("url", "string", "the URL to navigate to", true)
        .handler(|_args| async move {
            Err(Error::tool_failed(
                "browser",
                "no browser runtime is attached to this server; set BROWSER_RUNTIME and wire a driver",
            ))
        })
        .build()
}

/// `read_pointer`: resolves a Tool Context Store pointer back to its full
/// text, for when the model needs more than the inlined preview it already
/// saw in a prior `Observe` step.
pub fn read_pointer_tool(store: Arc<crate::tool_context::ToolContextStore>) -> Result<ToolSpec> {
    tool("read_pointer", "Fetch the full text behind a tool-context pointer id previously seen in a tool result.")
        .category("read_pointer")
        .param("id", "string", "the pointer id, e.g. 'ptr_...'", true)
        .handler(move |args| {
            let store = store.clone();
            async move {
                let id = args
                    .get("id")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| Error::bad_arguments("read_pointer", "missing 'id' string"))?;
                Ok(store.get(id)?.full_result_text)
            }
        })
        .build()
}

/// `skill`: loads a named skill's instructions into the conversation on
/// demand, for skills the prompt-level trigger match didn't already surface.
/// Returns `Error::NotFound` for an unknown skill name, which the agent loop
/// feeds back to the model as a normal tool-scoped observation.
pub fn skill_tool(registry: Arc<crate::skills::SkillRegistry>) -> Result<ToolSpec> {
    tool("skill", "Load a named skill's instructions. Use this to pull in detailed guidance for a known capability by name.")
        .category("skill")
        .param("name", "string", "the skill's name, as listed in the system prompt's skill catalog", true)
        .handler(move |args| {
            let registry = registry.clone();
            async move {
                let name = args
                    .get("name")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| Error::bad_arguments("skill", "missing 'name' string"))?;
                let skill = registry
                    .get(name)
                    .ok_or_else(|| Error::not_found(format!("skill '{name}'")))?;
                Ok(format!("# {}\n\n{}", skill.name, skill.instructions))
            }
        })
        .build()
}
