//! Binary entry point: wires the configured stores and tools into an
//! `AgentLoop`, mounts the HTTP surface, and serves it until the process is
//! asked to stop.

use std::sync::Arc;

use mini_agent::http::{router, AppState};
use mini_agent::{
    AgentDeps, AgentLoop, Config, MemoryIndex, OpenAiAdapter, SessionStore, SkillLoader,
    SkillRegistry, SkillTier, ToolContextStore, ToolRegistry,
};

#[tokio::main]
async fn main() {
    env_logger::init();

    if let Err(err) = run().await {
        log::error!("fatal error: {err}");
        std::process::exit(1);
    }
}

async fn run() -> mini_agent::Result<()> {
    let config = Config::from_env()?;
    std::fs::create_dir_all(&config.storage_root)?;

    let http_client = reqwest::Client::new();

    let sessions = Arc::new(SessionStore::new(&config.storage_root));
    let tool_context = Arc::new(ToolContextStore::new(&config.storage_root));
    let memory = Arc::new(MemoryIndex::new(&config.storage_root));

    let mut tools = ToolRegistry::new();
    tools.register(mini_agent::read_file_tool(config.storage_root.clone())?);
    tools.register(mini_agent::list_dir_tool(config.storage_root.clone())?);
    tools.register(mini_agent::read_pointer_tool(tool_context.clone())?);

    if let Some(tavily_key) = &config.tavily_api_key {
        tools.register(mini_agent::web_search_tool(http_client.clone(), tavily_key.clone())?);
        log::info!("web_search tool enabled");
    } else {
        log::info!("TAVILY_API_KEY not set, web_search tool disabled");
    }

    if config.browser_runtime_enabled {
        tools.register(mini_agent::browser_tool()?);
        log::info!("browser tool enabled");
    }

    let mut skill_registry = SkillRegistry::new();
    let mut skill_loader = SkillLoader::new().add_path("skills/builtin", SkillTier::Builtin);
    if let Some(home) = dirs_home() {
        skill_loader = skill_loader.add_path(home.join(".mini-agent/skills"), SkillTier::UserGlobal);
    }
    skill_loader = skill_loader.add_path(".mini-agent/skills", SkillTier::ProjectLocal);
    let loaded = skill_registry.load_from(&skill_loader)?;
    log::info!("loaded {loaded} skill(s)");

    let skill_registry = Arc::new(skill_registry);
    tools.register(mini_agent::skill_tool(skill_registry.clone())?);

    let llm = Arc::new(OpenAiAdapter::new(
        http_client,
        config.openai_api_key.clone(),
        config.openai_base_url.clone(),
        config.openai_model.clone(),
    ));

    let bind_addr = config.bind_addr.clone();

    let deps = Arc::new(AgentDeps {
        sessions,
        tool_context,
        memory,
        tools: Arc::new(tools),
        llm,
        config,
    });
    let agent_loop = Arc::new(AgentLoop::new(deps.clone()));

    let state = AppState { deps, skills: skill_registry, agent_loop };
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| mini_agent::Error::other(format!("failed to bind {bind_addr}: {e}")))?;
    log::info!("listening on {bind_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| mini_agent::Error::other(format!("server error: {e}")))?;

    Ok(())
}

/// Best-effort home directory lookup for the user-global skill tier, without
/// pulling in a dedicated directories crate for one path.
fn dirs_home() -> Option<std::path::PathBuf> {
    std::env::var_os("HOME").map(std::path::PathBuf::from)
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => log::info!("received shutdown signal"),
        Err(err) => log::error!("failed to install ctrl-c handler: {err}"),
    }
}
