//! Built-in tool implementations for Mnemos.
//!
//! Tools give the agent its reach beyond the model: read and write the
//! long-term memory store, fetch rendered web pages, and analyze trade
//! exports. Every tool is registered under a fixed, case-sensitive name.

pub mod fetch_page;
pub mod memory_tools;
pub mod trading;

use mnemos_core::memory::MemoryStore;
use mnemos_core::tool::ToolRegistry;
use std::sync::Arc;

pub use fetch_page::{FetchRenderedPageTool, PageRenderer};
pub use memory_tools::{
    ListPersonasTool, LoadMemoryTool, PersistMemoryTool, RecallMemoryTool, SaveMemoryTool,
    SavePersonaTool,
};
pub use trading::{
    AnalyzePortfolioTool, PriceSource, ReadTradingCsvTool, SimulateTradeTool, SuggestActionTool,
    TradingParams,
};

/// Register the memory tools against `store`.
pub fn register_memory_tools(registry: &mut ToolRegistry, store: Arc<dyn MemoryStore>) {
    registry.register(Arc::new(SavePersonaTool::new(store.clone())));
    registry.register(Arc::new(SaveMemoryTool::new(store.clone())));
    registry.register(Arc::new(RecallMemoryTool::new(store.clone())));
    registry.register(Arc::new(ListPersonasTool::new(store.clone())));
    registry.register(Arc::new(PersistMemoryTool::new(store.clone())));
    registry.register(Arc::new(LoadMemoryTool::new(store)));
}

/// Register the portfolio toolset sharing one price source.
pub fn register_trading_tools(
    registry: &mut ToolRegistry,
    prices: Arc<dyn PriceSource>,
    params: TradingParams,
) {
    registry.register(Arc::new(ReadTradingCsvTool));
    registry.register(Arc::new(AnalyzePortfolioTool::new(prices.clone())));
    registry.register(Arc::new(SuggestActionTool::new(prices.clone(), params.clone())));
    registry.register(Arc::new(SimulateTradeTool::new(prices, params)));
}

/// Create the default registry with every built-in tool.
pub fn default_registry(
    store: Arc<dyn MemoryStore>,
    fetch: FetchRenderedPageTool,
    prices: Arc<dyn PriceSource>,
    params: TradingParams,
) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    register_memory_tools(&mut registry, store);
    registry.register(Arc::new(fetch));
    register_trading_tools(&mut registry, prices, params);
    registry
}
