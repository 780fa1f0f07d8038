//! Trade export ingest: CSV/TSV from a brokerage client into a holdings snapshot.
//!
//! Column headers are matched against the common English and Chinese names
//! (`代码`/`code`, `数量`/`qty`, …). Trades are aggregated per code: sells
//! subtract, buys add, and the average price is weighted by absolute quantity.

use chrono::Local;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use super::TradingError;

/// One aggregated position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    #[serde(deserialize_with = "de_int", default)]
    pub qty: i64,
    #[serde(default)]
    pub avg_price: f64,
}

/// A portfolio snapshot as produced by ingest and consumed by analysis.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub trades_count: usize,
    #[serde(default)]
    pub holdings: BTreeMap<String, Holding>,
    #[serde(default)]
    pub raw: Vec<BTreeMap<String, String>>,
}

/// Accept `100`, `100.0` or `"100"` as an integer quantity.
fn de_int<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    let v = serde_json::Value::deserialize(d)?;
    Ok(match v {
        serde_json::Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)).unwrap_or(0),
        serde_json::Value::String(s) => s.trim().parse::<f64>().map(|f| f as i64).unwrap_or(0),
        _ => 0,
    })
}

const COLUMN_ALIASES: &[(&str, &str)] = &[
    ("代码", "code"),
    ("证券代码", "code"),
    ("code", "code"),
    ("名称", "name"),
    ("证券名称", "name"),
    ("name", "name"),
    ("方向", "side"),
    ("买卖方向", "side"),
    ("side", "side"),
    ("数量", "qty"),
    ("成交数量", "qty"),
    ("qty", "qty"),
    ("成交价", "price"),
    ("价格", "price"),
    ("现价", "price"),
    ("最新价", "price"),
    ("price", "price"),
    ("成交时间", "time"),
    ("时间", "time"),
    ("timestamp", "time"),
];

fn canonical_column(header: &str) -> String {
    let h = header.trim();
    COLUMN_ALIASES
        .iter()
        .find(|(alias, _)| alias.eq_ignore_ascii_case(h))
        .map(|(_, canon)| canon.to_string())
        .unwrap_or_else(|| h.to_string())
}

/// Split one delimited line, honoring double quotes.
fn split_record(line: &str, delimiter: char) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            c if c == delimiter && !in_quotes => {
                fields.push(field.trim().to_string());
                field.clear();
            }
            c => field.push(c),
        }
    }
    fields.push(field.trim().to_string());
    fields
}

fn parse_number(s: &str) -> Option<f64> {
    s.replace(',', "").trim().parse().ok()
}

fn is_sell(side: &str) -> bool {
    let s = side.trim().to_lowercase();
    s.contains('卖') || s.starts_with('s')
}

fn looks_like_exchange_code(v: &str) -> bool {
    let u = v.trim().to_uppercase();
    u.starts_with("SH") || u.starts_with("SZ")
}

/// Parse delimited text into a snapshot. `source`/`path` are recorded as given.
pub fn parse_trades(content: &str, source: &str, path: Option<String>) -> Result<Snapshot, TradingError> {
    let content = content.trim_start_matches('\u{feff}');
    let mut lines = content.lines().filter(|l| !l.trim().is_empty());
    let header_line = lines.next().ok_or(TradingError::EmptyInput)?;
    let delimiter = if header_line.contains('\t') { '\t' } else { ',' };

    let mut headers: Vec<String> = split_record(header_line, delimiter)
        .iter()
        .map(|h| canonical_column(h))
        .collect();

    let rows: Vec<Vec<String>> = lines.map(|l| split_record(l, delimiter)).collect();

    // No recognizable code header: pick the first column whose values carry an exchange prefix.
    if !headers.iter().any(|h| h == "code") {
        let detected = (0..headers.len()).find(|&col| {
            rows.iter()
                .take(10)
                .filter_map(|r| r.get(col))
                .any(|v| looks_like_exchange_code(v))
        });
        if let Some(col) = detected {
            headers[col] = "code".into();
        }
    }

    let raw: Vec<BTreeMap<String, String>> = rows
        .iter()
        .map(|r| {
            headers
                .iter()
                .cloned()
                .zip(r.iter().cloned().chain(std::iter::repeat(String::new())))
                .collect()
        })
        .collect();

    let holdings = aggregate(&raw);

    Ok(Snapshot {
        timestamp: Local::now().to_rfc3339(),
        source: source.to_string(),
        path,
        trades_count: raw.len(),
        holdings,
        raw,
    })
}

fn aggregate(rows: &[BTreeMap<String, String>]) -> BTreeMap<String, Holding> {
    #[derive(Default)]
    struct Acc {
        signed_qty: f64,
        abs_qty: f64,
        notional: f64,
    }

    let mut acc: BTreeMap<String, Acc> = BTreeMap::new();
    for row in rows {
        let (Some(code), Some(qty)) = (row.get("code"), row.get("qty")) else {
            continue;
        };
        let code = code.trim();
        if code.is_empty() {
            continue;
        }
        let qty = parse_number(qty).unwrap_or(0.0).abs();
        let signed = match row.get("side") {
            Some(side) if is_sell(side) => -qty,
            _ => qty,
        };
        let price = row.get("price").and_then(|p| parse_number(p)).unwrap_or(0.0);

        let entry = acc.entry(code.to_string()).or_default();
        entry.signed_qty += signed;
        entry.abs_qty += qty;
        entry.notional += qty * price;
    }

    acc.into_iter()
        .map(|(code, a)| {
            let avg_price = if a.abs_qty > 0.0 { a.notional / a.abs_qty } else { 0.0 };
            (
                code,
                Holding {
                    qty: a.signed_qty as i64,
                    avg_price,
                },
            )
        })
        .collect()
}

/// Read a trade export from disk.
pub fn read_trades(path_or_source: &str) -> Result<Snapshot, TradingError> {
    let arg = path_or_source.trim();
    if arg.eq_ignore_ascii_case("clipboard") {
        return Err(TradingError::Unsupported("clipboard input".into()));
    }
    let path = Path::new(arg);
    if !path.exists() {
        return Err(TradingError::FileNotFound(arg.to_string()));
    }
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    if matches!(ext.as_str(), "xls" | "xlsx" | "xlsm" | "xlsb") {
        return Err(TradingError::Unsupported(format!(
            "spreadsheet format .{ext}; export as CSV first"
        )));
    }

    let bytes = std::fs::read(path).map_err(|e| TradingError::Read(e.to_string()))?;
    let content = match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    };
    parse_trades(&content, "csv", Some(arg.to_string()))
}
