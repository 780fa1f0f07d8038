//! CLI subcommands.

pub mod ask;
pub mod chat;
pub mod memory;

use mnemos_agent::{DispatchLoop, PersonaInjector, Session, default_system_prompt};
use mnemos_config::AppConfig;
use mnemos_core::memory::Embedder;
use mnemos_core::ModelCall;
use mnemos_memory::{AutoSavePolicy, AutoSaver, open_store};
use mnemos_providers::OpenAiCompatProvider;
use mnemos_tools::trading::YahooPriceSource;
use mnemos_tools::{FetchRenderedPageTool, TradingParams, default_registry};
use std::sync::Arc;
use tracing::info;

/// Print setup help for a missing API key and return the error to bubble up.
pub fn missing_api_key() -> Box<dyn std::error::Error> {
    eprintln!();
    eprintln!("  ERROR: No API key configured!");
    eprintln!();
    eprintln!("  Set one of these environment variables:");
    eprintln!("    export DASHSCOPE_API_KEY='sk-...'   (default endpoint)");
    eprintln!("    export OPENAI_API_KEY='sk-...'      (with MNEMOS_BASE_URL for other endpoints)");
    eprintln!("    export MNEMOS_API_KEY='sk-...'      (generic)");
    eprintln!();
    eprintln!("  Or add it to your config file:");
    eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
    eprintln!("    [provider]");
    eprintln!("    api_key = \"sk-...\"");
    eprintln!();
    "No API key found. See above for setup instructions.".into()
}

/// Wire provider, memory store, tools and dispatch loop into a session.
pub async fn build_session(config: &AppConfig) -> Result<Session, Box<dyn std::error::Error>> {
    if !config.has_api_key() {
        return Err(missing_api_key());
    }

    let provider = Arc::new(OpenAiCompatProvider::from_config(&config.provider)?);
    let embedder: Option<Arc<dyn Embedder>> = if provider.embedding_model().is_empty() {
        None
    } else {
        Some(provider.clone() as Arc<dyn Embedder>)
    };

    let store = open_store(
        &config.memory.resolved_store_path(),
        config.memory.max_items,
        embedder,
    )
    .await;

    let tools = Arc::new(default_registry(
        store.clone(),
        FetchRenderedPageTool::from_config(&config.fetch)?,
        Arc::new(YahooPriceSource::new()?),
        TradingParams::from(&config.trading),
    ));

    let system_prompt = config
        .agent
        .system_prompt
        .clone()
        .unwrap_or_else(|| default_system_prompt(&tools));

    let dispatch = DispatchLoop::from_config(tools.clone(), &config.agent)
        .with_system_prompt(system_prompt)
        .with_prompt_hook(Arc::new(PersonaInjector::new(store.clone())));

    let saver = AutoSaver::new(store.clone(), AutoSavePolicy::from(&config.memory));
    let model: Arc<dyn ModelCall> = provider.clone();

    info!(
        model = %provider.model_name(),
        backend = %store.info().await.backend,
        tools = tools.len(),
        "Session ready"
    );

    Ok(Session::new(dispatch, model, store, saver).with_recall_limit(config.memory.recall_limit))
}
