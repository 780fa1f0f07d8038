//! Portfolio valuation, rule-based suggestions and simulated fills.
//!
//! Read-only: nothing here talks to a broker. A simulated trade returns the
//! fill it would have produced and the snapshot it would leave behind.

use chrono::Local;
use mnemos_config::TradingConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use super::TradingError;
use super::ingest::{Holding, Snapshot};
use super::quotes::PriceSource;

/// Thresholds and execution costs, as fractions (0.10 = 10%).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingParams {
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    pub slippage: f64,
    pub fee_rate: f64,
    pub max_position_pct: f64,
}

impl From<&TradingConfig> for TradingParams {
    fn from(c: &TradingConfig) -> Self {
        Self {
            stop_loss_pct: c.stop_loss_pct,
            take_profit_pct: c.take_profit_pct,
            slippage: c.slippage_pct,
            fee_rate: c.fee_pct,
            max_position_pct: c.max_position_pct,
        }
    }
}

impl Default for TradingParams {
    fn default() -> Self {
        Self::from(&TradingConfig::default())
    }
}

impl TradingParams {
    /// Apply per-call overrides (`{"slippage": 0.001, ...}`); unknown keys are ignored.
    pub fn with_overrides(&self, overrides: Option<&serde_json::Value>) -> Self {
        let mut out = self.clone();
        let Some(map) = overrides.and_then(|v| v.as_object()) else {
            return out;
        };
        let get = |k: &str| map.get(k).and_then(|v| v.as_f64());
        if let Some(v) = get("stop_loss_pct") {
            out.stop_loss_pct = v;
        }
        if let Some(v) = get("take_profit_pct") {
            out.take_profit_pct = v;
        }
        if let Some(v) = get("slippage") {
            out.slippage = v;
        }
        if let Some(v) = get("fee_rate") {
            out.fee_rate = v;
        }
        if let Some(v) = get("max_position_pct") {
            out.max_position_pct = v;
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionDetail {
    pub qty: i64,
    pub avg_price: f64,
    pub cur_price: f64,
    pub value: f64,
    pub pnl: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioSummary {
    pub timestamp: String,
    pub total_value: f64,
    pub details: BTreeMap<String, PositionDetail>,
}

/// Value every non-zero holding at its current price.
///
/// A failed quote values the position at its average cost.
pub async fn analyze_portfolio(snapshot: &Snapshot, prices: &dyn PriceSource) -> PortfolioSummary {
    let mut details = BTreeMap::new();
    let mut total_value = 0.0;

    for (symbol, holding) in &snapshot.holdings {
        if holding.qty == 0 {
            continue;
        }
        let cur_price = match prices.price(symbol).await {
            Ok(p) => p,
            Err(e) => {
                debug!(symbol = %symbol, error = %e, "Quote unavailable; using average cost");
                holding.avg_price
            }
        };
        let qty = holding.qty as f64;
        let value = qty * cur_price;
        let pnl = (cur_price - holding.avg_price) * qty;
        total_value += value;
        details.insert(
            symbol.clone(),
            PositionDetail {
                qty: holding.qty,
                avg_price: holding.avg_price,
                cur_price,
                value,
                pnl,
            },
        );
    }

    PortfolioSummary {
        timestamp: Local::now().to_rfc3339(),
        total_value,
        details,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub symbol: String,
    pub action: String,
    pub reason: String,
    pub suggest_qty: i64,
}

/// Stop loss (with a 5% portfolio-share floor), take profit, then concentration.
pub fn suggest_actions(summary: &PortfolioSummary, params: &TradingParams) -> Vec<Suggestion> {
    let total = if summary.total_value != 0.0 { summary.total_value } else { 1.0 };
    let mut out = Vec::new();

    for (symbol, d) in &summary.details {
        let cost_basis = d.avg_price.abs() * d.qty as f64;
        let pnl_pct = if cost_basis != 0.0 { d.pnl / cost_basis } else { 0.0 };
        let share = if total > 0.0 { d.value / total } else { 0.0 };
        let abs_qty = d.qty.unsigned_abs() as f64;

        let suggestion = if pnl_pct <= -params.stop_loss_pct && share > 0.05 {
            Some((
                "reduce",
                format!("unrealized loss {:.2}% beyond stop loss", pnl_pct * 100.0),
                abs_qty * 0.3,
            ))
        } else if pnl_pct >= params.take_profit_pct {
            Some((
                "take_profit_partial",
                format!("unrealized gain {:.2}% reached take profit", pnl_pct * 100.0),
                abs_qty * 0.2,
            ))
        } else if share > params.max_position_pct {
            Some((
                "reduce",
                format!("position share too high ({:.2}%)", share * 100.0),
                abs_qty * 0.2,
            ))
        } else {
            None
        };

        if let Some((action, reason, qty)) = suggestion {
            out.push(Suggestion {
                symbol: symbol.clone(),
                action: action.into(),
                reason,
                suggest_qty: qty as i64,
            });
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

/// A requested trade: a [`Suggestion`] or a plain `{symbol, side, qty}`.
#[derive(Debug, Clone, Deserialize)]
pub struct TradeAction {
    pub symbol: String,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub side: Option<String>,
    #[serde(default)]
    pub suggest_qty: Option<i64>,
    #[serde(default)]
    pub qty: Option<i64>,
}

impl TradeAction {
    /// `reduce…`, `take…` and `sell…`/`s…` are sells; anything else buys.
    pub fn side(&self) -> Side {
        let act = self
            .action
            .as_deref()
            .or(self.side.as_deref())
            .unwrap_or_default()
            .to_lowercase();
        if act.starts_with('r') || act.starts_with("take") || act.starts_with('s') {
            Side::Sell
        } else {
            Side::Buy
        }
    }

    pub fn quantity(&self) -> i64 {
        self.suggest_qty.or(self.qty).unwrap_or(0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedFill {
    pub symbol: String,
    pub side: Side,
    pub qty: i64,
    pub exec_price: f64,
    pub fee: f64,
    pub timestamp: String,
    pub new_snapshot: Snapshot,
}

/// Fill `action` at the current price adjusted for slippage, charge the fee
/// and return the resulting snapshot.
pub async fn simulate_trade(
    action: &TradeAction,
    snapshot: &Snapshot,
    params: &TradingParams,
    prices: &dyn PriceSource,
) -> Result<SimulatedFill, TradingError> {
    let symbol = action.symbol.trim();
    if symbol.is_empty() {
        return Err(TradingError::InvalidPayload("action has no symbol".into()));
    }
    let price = prices.price(symbol).await?;
    let side = action.side();
    let qty = action.quantity();

    let (cur_qty, avg_price) = snapshot
        .holdings
        .get(symbol)
        .map(|h| (h.qty, h.avg_price))
        .unwrap_or((0, 0.0));

    let exec_price = match side {
        Side::Sell => price * (1.0 - params.slippage),
        Side::Buy => price * (1.0 + params.slippage),
    };
    let fee = (exec_price * qty as f64).abs() * params.fee_rate;

    let (new_qty, new_avg) = match side {
        Side::Sell => (cur_qty - qty, avg_price),
        Side::Buy if cur_qty == 0 => (qty, exec_price),
        Side::Buy => {
            let total = cur_qty + qty;
            let avg = if total != 0 {
                (cur_qty as f64 * avg_price + qty as f64 * exec_price) / total as f64
            } else {
                avg_price
            };
            (total, avg)
        }
    };

    let mut new_snapshot = snapshot.clone();
    new_snapshot.holdings.insert(
        symbol.to_string(),
        Holding {
            qty: new_qty,
            avg_price: new_avg,
        },
    );

    Ok(SimulatedFill {
        symbol: symbol.to_string(),
        side,
        qty,
        exec_price,
        fee,
        timestamp: Local::now().to_rfc3339(),
        new_snapshot,
    })
}
