//! `mnemos memory`: offline inspection of the long-term store.

use mnemos_config::AppConfig;
use mnemos_core::memory::{Embedder, KIND_PERSONA, MemoryRecord, MemoryStore};
use mnemos_core::RequestId;
use mnemos_memory::{open_offline, open_store};
use mnemos_providers::OpenAiCompatProvider;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

const PREVIEW_CHARS: usize = 400;

fn preview(text: &str, max: usize) -> String {
    let mut out: String = text.chars().take(max).collect();
    if text.chars().count() > max {
        out.push_str("...");
    }
    out
}

fn meta_json(record: &MemoryRecord) -> String {
    serde_json::Value::Object(record.metadata.clone()).to_string()
}

fn is_persona_like(record: &MemoryRecord) -> bool {
    record.kind() == Some(KIND_PERSONA) || meta_json(record).to_lowercase().contains("persona")
}

/// Record count per `type` (`untyped` when missing).
fn counts_by_kind(records: &[MemoryRecord]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for r in records {
        *counts
            .entry(r.kind().unwrap_or("untyped").to_string())
            .or_insert(0) += 1;
    }
    counts
}

fn render_inspect(records: &[MemoryRecord], last: usize) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "  Records: {}", records.len());
    for (kind, n) in counts_by_kind(records) {
        let _ = writeln!(out, "    {kind:<10} {n}");
    }

    let start = records.len().saturating_sub(last);
    let _ = writeln!(out, "\n  Last {} record(s):", records.len() - start);
    for (i, r) in records.iter().enumerate().skip(start) {
        let _ = writeln!(out, "  [{i}] meta={}", meta_json(r));
        let _ = writeln!(out, "       {}", preview(&r.text, PREVIEW_CHARS).replace('\n', "\n       "));
    }

    let personas: Vec<(usize, &MemoryRecord)> =
        records.iter().enumerate().filter(|(_, r)| is_persona_like(r)).collect();
    let _ = writeln!(out, "\n  Persona-like records: {}", personas.len());
    for (i, r) in personas.iter().take(10) {
        let _ = writeln!(out, "  [{i}] meta={}", meta_json(r));
    }
    out
}

fn render_personas(records: &[MemoryRecord]) -> String {
    let personas: Vec<_> = records
        .iter()
        .filter(|r| r.kind() == Some(KIND_PERSONA))
        .collect();
    if personas.is_empty() {
        return "  No personas saved yet. Use /save_persona in chat.\n".into();
    }
    let mut out = String::new();
    for r in personas {
        let name = r
            .metadata
            .get("persona_name")
            .and_then(|v| v.as_str())
            .unwrap_or("unnamed");
        let _ = writeln!(out, "  ({name}) {}", preview(&r.text, PREVIEW_CHARS));
    }
    out
}

pub async fn info(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let base = config.memory.resolved_store_path();
    let store = open_offline(&base, config.memory.max_items);
    let records = store.records().await;

    println!("  Memory store");
    println!("  ============");
    println!("  Base path:  {}", base.display());
    println!("  File:       {}", store.path().display());
    println!("  Records:    {} (max {})", records.len(), config.memory.max_items);
    for (kind, n) in counts_by_kind(&records) {
        println!("    {kind:<10} {n}");
    }
    println!("  Auto-save:  {:?}", config.memory.auto_save);
    Ok(())
}

pub async fn search(config: &AppConfig, query: &str, k: usize) -> Result<(), Box<dyn std::error::Error>> {
    let base = config.memory.resolved_store_path();
    let embedder: Option<Arc<dyn Embedder>> = match OpenAiCompatProvider::from_config(&config.provider) {
        Ok(p) if !p.embedding_model().is_empty() => Some(Arc::new(p) as Arc<dyn Embedder>),
        _ => None,
    };
    let store: Arc<dyn MemoryStore> = match embedder {
        Some(e) => open_store(&base, config.memory.max_items, Some(e)).await,
        None => Arc::new(open_offline(&base, config.memory.max_items)),
    };

    let rid = RequestId::new();
    let hits = store.search(query, k, &rid).await?;
    println!("  Searching memory for \"{query}\" ({})", store.info().await.backend);
    println!();
    if hits.is_empty() {
        println!("  No matches.");
    }
    for (i, hit) in hits.iter().enumerate() {
        println!("  {i:>2}. [score: {:.4}] {}", hit.score, preview(&hit.text, 120).replace('\n', " "));
        println!("      meta: {}", serde_json::Value::Object(hit.metadata.clone()));
    }
    Ok(())
}

pub async fn inspect(config: &AppConfig, last: usize) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_offline(&config.memory.resolved_store_path(), config.memory.max_items);
    if !store.path().exists() {
        println!("  No store file at {}", store.path().display());
        return Ok(());
    }
    println!("  File: {}", store.path().display());
    print!("{}", render_inspect(&store.records().await, last));
    Ok(())
}

pub async fn personas(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_offline(&config.memory.resolved_store_path(), config.memory.max_items);
    print!("{}", render_personas(&store.records().await));
    Ok(())
}
