//! Portfolio toolset: read trade exports, value holdings, suggest and
//! simulate trades. Analysis only; no orders are ever sent.

pub mod analysis;
pub mod ingest;
pub mod quotes;

use async_trait::async_trait;
use mnemos_core::error::ToolError;
use mnemos_core::tool::{Tool, ToolOutput};
use mnemos_core::RequestId;
use std::sync::Arc;
use tracing::info;

pub use analysis::{PortfolioSummary, Suggestion, TradeAction, TradingParams};
pub use ingest::{Holding, Snapshot};
pub use quotes::{PriceSource, YahooPriceSource};

#[derive(Debug, thiserror::Error)]
pub enum TradingError {
    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("no rows in input")]
    EmptyInput,

    #[error("unsupported input: {0}")]
    Unsupported(String),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("price unavailable for {0}")]
    PriceUnavailable(String),

    #[error("quote error: {0}")]
    Quote(String),
}

/// A JSON object carrying `holdings` is a snapshot; anything else is a path.
fn resolve_snapshot(arg: &str) -> Result<Snapshot, TradingError> {
    let trimmed = arg.trim();
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if value.get("holdings").is_some() {
            return serde_json::from_value(value)
                .map_err(|e| TradingError::InvalidPayload(e.to_string()));
        }
    }
    ingest::read_trades(trimmed)
}

fn failed(tool: &str, e: TradingError) -> ToolError {
    ToolError::failed(tool, e)
}

/// `ReadTradingCSV`: parse a trade export into a snapshot.
pub struct ReadTradingCsvTool;

#[async_trait]
impl Tool for ReadTradingCsvTool {
    fn name(&self) -> &str {
        "ReadTradingCSV"
    }

    fn description(&self) -> &str {
        "Read a CSV/TSV trade export and aggregate holdings per code. Argument: the file path."
    }

    async fn invoke(&self, arg: &str, request_id: &RequestId) -> Result<ToolOutput, ToolError> {
        let snapshot = ingest::read_trades(arg).map_err(|e| failed(self.name(), e))?;
        info!(request_id = %request_id, trades = snapshot.trades_count, holdings = snapshot.holdings.len(), "trading.read");
        ToolOutput::structured(&snapshot)
    }
}

/// `AnalyzePortfolio`: value a snapshot at current prices.
pub struct AnalyzePortfolioTool {
    prices: Arc<dyn PriceSource>,
}

impl AnalyzePortfolioTool {
    pub fn new(prices: Arc<dyn PriceSource>) -> Self {
        Self { prices }
    }
}

#[async_trait]
impl Tool for AnalyzePortfolioTool {
    fn name(&self) -> &str {
        "AnalyzePortfolio"
    }

    fn description(&self) -> &str {
        "Value a portfolio at current prices. Argument: snapshot JSON (with 'holdings') or a trade export path."
    }

    async fn invoke(&self, arg: &str, _request_id: &RequestId) -> Result<ToolOutput, ToolError> {
        let snapshot = resolve_snapshot(arg).map_err(|e| failed(self.name(), e))?;
        let summary = analysis::analyze_portfolio(&snapshot, self.prices.as_ref()).await;
        ToolOutput::structured(&summary)
    }
}

/// `SuggestAction`: valuation plus rule-based suggestions.
pub struct SuggestActionTool {
    prices: Arc<dyn PriceSource>,
    params: TradingParams,
}

impl SuggestActionTool {
    pub fn new(prices: Arc<dyn PriceSource>, params: TradingParams) -> Self {
        Self { prices, params }
    }
}

#[async_trait]
impl Tool for SuggestActionTool {
    fn name(&self) -> &str {
        "SuggestAction"
    }

    fn description(&self) -> &str {
        "Suggest read-only trading actions (stop loss, take profit, concentration). \
         Argument: snapshot JSON or a trade export path."
    }

    async fn invoke(&self, arg: &str, _request_id: &RequestId) -> Result<ToolOutput, ToolError> {
        let snapshot = resolve_snapshot(arg).map_err(|e| failed(self.name(), e))?;
        let summary = analysis::analyze_portfolio(&snapshot, self.prices.as_ref()).await;
        let suggestions = analysis::suggest_actions(&summary, &self.params);
        ToolOutput::structured(&serde_json::json!({
            "summary": summary,
            "suggestions": suggestions,
        }))
    }
}

/// `SimulateTrade`: simulated fill with slippage and fee.
pub struct SimulateTradeTool {
    prices: Arc<dyn PriceSource>,
    params: TradingParams,
}

impl SimulateTradeTool {
    pub fn new(prices: Arc<dyn PriceSource>, params: TradingParams) -> Self {
        Self { prices, params }
    }

    /// `{"action", "snapshot", "params"?}` or `<action json>||<snapshot json>`.
    fn parse_payload(
        &self,
        arg: &str,
    ) -> Result<(TradeAction, Snapshot, TradingParams), TradingError> {
        let arg = arg.trim();
        if let Ok(payload) = serde_json::from_str::<serde_json::Value>(arg) {
            let (Some(action), Some(snapshot)) = (payload.get("action"), payload.get("snapshot"))
            else {
                return Err(TradingError::InvalidPayload(
                    "expected 'action' and 'snapshot'".into(),
                ));
            };
            let action = serde_json::from_value(action.clone())
                .map_err(|e| TradingError::InvalidPayload(format!("action: {e}")))?;
            let snapshot = serde_json::from_value(snapshot.clone())
                .map_err(|e| TradingError::InvalidPayload(format!("snapshot: {e}")))?;
            return Ok((action, snapshot, self.params.with_overrides(payload.get("params"))));
        }

        let (a, s) = arg.split_once("||").ok_or_else(|| {
            TradingError::InvalidPayload("expected JSON payload or 'action||snapshot'".into())
        })?;
        let action = serde_json::from_str(a.trim())
            .map_err(|e| TradingError::InvalidPayload(format!("action: {e}")))?;
        let snapshot = serde_json::from_str(s.trim())
            .map_err(|e| TradingError::InvalidPayload(format!("snapshot: {e}")))?;
        Ok((action, snapshot, self.params.clone()))
    }
}

#[async_trait]
impl Tool for SimulateTradeTool {
    fn name(&self) -> &str {
        "SimulateTrade"
    }

    fn description(&self) -> &str {
        "Simulate a trade without placing it. Argument: {\"action\": {...}, \"snapshot\": {...}, \"params\": {...}} \
         or 'action_json||snapshot_json'."
    }

    async fn invoke(&self, arg: &str, request_id: &RequestId) -> Result<ToolOutput, ToolError> {
        let (action, snapshot, params) = self.parse_payload(arg).map_err(|e| failed(self.name(), e))?;
        let fill = analysis::simulate_trade(&action, &snapshot, &params, self.prices.as_ref())
            .await
            .map_err(|e| failed(self.name(), e))?;
        info!(request_id = %request_id, symbol = %fill.symbol, qty = fill.qty, "trading.simulate");
        ToolOutput::structured(&fill)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FlatPrice(f64);

    #[async_trait]
    impl PriceSource for FlatPrice {
        async fn price(&self, _symbol: &str) -> Result<f64, TradingError> {
            Ok(self.0)
        }
    }

    fn prices() -> Arc<dyn PriceSource> {
        Arc::new(FlatPrice(10.0))
    }

    #[tokio::test]
    async fn analyze_accepts_snapshot_json() {
        let tool = AnalyzePortfolioTool::new(prices());
        let out = tool
            .invoke(r#"{"holdings": {"SH600000": {"qty": 10, "avg_price": 8}}}"#, &RequestId::new())
            .await
            .unwrap();
        let json = out.as_json().unwrap();
        assert_eq!(json["total_value"], 100.0);
        assert_eq!(json["details"]["SH600000"]["pnl"], 20.0);
    }

    #[tokio::test]
    async fn analyze_missing_path_is_tool_error() {
        let tool = AnalyzePortfolioTool::new(prices());
        let err = tool.invoke("/no/such.csv", &RequestId::new()).await.unwrap_err();
        assert!(err.to_string().contains("file not found"));
    }

    #[tokio::test]
    async fn suggest_returns_summary_and_suggestions() {
        let tool = SuggestActionTool::new(prices(), TradingParams::default());
        let out = tool
            .invoke(r#"{"holdings": {"A": {"qty": 100, "avg_price": 5}}}"#, &RequestId::new())
            .await
            .unwrap();
        let json = out.as_json().unwrap();
        assert_eq!(json["suggestions"][0]["action"], "take_profit_partial");
        assert!(json["summary"]["details"]["A"].is_object());
    }

    #[tokio::test]
    async fn simulate_accepts_both_payload_forms() {
        let tool = SimulateTradeTool::new(prices(), TradingParams::default());
        let rid = RequestId::new();

        let json_form = r#"{"action": {"symbol": "A", "side": "buy", "qty": 10},
                            "snapshot": {"holdings": {}},
                            "params": {"slippage": 0.0}}"#;
        let out = tool.invoke(json_form, &rid).await.unwrap();
        assert_eq!(out.as_json().unwrap()["exec_price"], 10.0);
        assert_eq!(out.as_json().unwrap()["new_snapshot"]["holdings"]["A"]["qty"], 10);

        let pipe_form = r#"{"symbol": "A", "action": "reduce", "suggest_qty": 5}||{"holdings": {"A": {"qty": 10, "avg_price": 9}}}"#;
        let out = tool.invoke(pipe_form, &rid).await.unwrap();
        assert_eq!(out.as_json().unwrap()["side"], "SELL");
        assert_eq!(out.as_json().unwrap()["new_snapshot"]["holdings"]["A"]["qty"], 5);
    }

    #[tokio::test]
    async fn simulate_rejects_garbage() {
        let tool = SimulateTradeTool::new(prices(), TradingParams::default());
        let err = tool.invoke("buy some", &RequestId::new()).await.unwrap_err();
        assert!(err.to_string().contains("invalid payload"));
        let err = tool.invoke(r#"{"action": {"symbol": "A"}}"#, &RequestId::new()).await.unwrap_err();
        assert!(err.to_string().contains("snapshot"));
    }
}
