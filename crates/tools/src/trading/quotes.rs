//! Market price lookup.

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use super::TradingError;

/// Latest-price source for a brokerage symbol (`SH600000`, `000001`, …).
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn price(&self, symbol: &str) -> Result<f64, TradingError>;
}

/// Map exchange-prefixed codes to Yahoo tickers.
///
/// `SH600000` → `600000.SS`, `SZ000001` → `000001.SZ`; bare six-digit codes
/// starting with 6 are Shanghai, other six-digit codes Shenzhen. Anything
/// already carrying a suffix is returned as-is.
pub fn normalize_symbol(symbol: &str) -> String {
    let s = symbol.trim();
    let upper = s.to_ascii_uppercase();
    if let Some(core) = upper.strip_prefix("SH") {
        return format!("{core}.SS");
    }
    if let Some(core) = upper.strip_prefix("SZ") {
        return format!("{core}.SZ");
    }
    if s.contains('.') {
        return s.to_string();
    }
    if s.len() == 6 && s.chars().all(|c| c.is_ascii_digit()) {
        return if s.starts_with('6') {
            format!("{s}.SS")
        } else {
            format!("{s}.SZ")
        };
    }
    s.to_string()
}

/// Yahoo Finance chart endpoint.
pub struct YahooPriceSource {
    client: reqwest::Client,
    base_url: String,
}

impl YahooPriceSource {
    pub fn new() -> Result<Self, TradingError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent("Mozilla/5.0 (compatible; mnemos/0.1)")
            .build()
            .map_err(|e| TradingError::Quote(e.to_string()))?;
        Ok(Self {
            client,
            base_url: "https://query1.finance.yahoo.com".into(),
        })
    }
}

/// Pull the last price from a chart response: `meta.regularMarketPrice`,
/// else the last non-null close.
fn price_from_chart(body: &serde_json::Value) -> Option<f64> {
    let result = body.pointer("/chart/result/0")?;
    if let Some(p) = result.pointer("/meta/regularMarketPrice").and_then(|v| v.as_f64()) {
        return Some(p);
    }
    result
        .pointer("/indicators/quote/0/close")?
        .as_array()?
        .iter()
        .rev()
        .find_map(|v| v.as_f64())
}

#[async_trait]
impl PriceSource for YahooPriceSource {
    async fn price(&self, symbol: &str) -> Result<f64, TradingError> {
        let ticker = normalize_symbol(symbol);
        let url = format!("{}/v8/finance/chart/{ticker}", self.base_url);
        debug!(symbol, ticker = %ticker, "Fetching quote");

        let body: serde_json::Value = self
            .client
            .get(&url)
            .query(&[("interval", "1m"), ("range", "1d")])
            .send()
            .await
            .map_err(|e| TradingError::Quote(e.to_string()))?
            .json()
            .await
            .map_err(|e| TradingError::Quote(e.to_string()))?;

        price_from_chart(&body).ok_or_else(|| TradingError::PriceUnavailable(symbol.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_mapping() {
        assert_eq!(normalize_symbol("SH600000"), "600000.SS");
        assert_eq!(normalize_symbol("sz000001"), "000001.SZ");
        assert_eq!(normalize_symbol("600519"), "600519.SS");
        assert_eq!(normalize_symbol("000002"), "000002.SZ");
        assert_eq!(normalize_symbol("AAPL"), "AAPL");
        assert_eq!(normalize_symbol("0700.HK"), "0700.HK");
    }

    #[test]
    fn chart_price_extraction() {
        let body = serde_json::json!({"chart": {"result": [{"meta": {"regularMarketPrice": 10.5}}]}});
        assert_eq!(price_from_chart(&body), Some(10.5));

        let body = serde_json::json!({"chart": {"result": [{
            "meta": {},
            "indicators": {"quote": [{"close": [9.0, 9.5, null]}]}
        }]}});
        assert_eq!(price_from_chart(&body), Some(9.5));

        let body = serde_json::json!({"chart": {"result": null, "error": {"code": "Not Found"}}});
        assert_eq!(price_from_chart(&body), None);
    }
}
