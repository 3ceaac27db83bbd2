//! `wctx search`: one-shot retrieval against the index snapshot.

use anyhow::{bail, Result};

use crate::citations::summary_line;
use crate::config::Config;
use crate::embedding::{create_embedder, Embedder};
use crate::index::filter_by_score;
use crate::models::ScoredDocument;
use crate::snapshot::{self, Snapshot};

/// Load the snapshot checked against the configured embedder.
pub fn open_index(config: &Config) -> Result<(Snapshot, Box<dyn Embedder>)> {
    if !config.embedding.is_enabled() {
        bail!("search requires embeddings. Set [embedding] provider in config.");
    }
    let embedder = create_embedder(&config.embedding)?;
    let snap = snapshot::load(
        &config.index.snapshot,
        embedder.model_name(),
        embedder.dims(),
    )?;
    Ok((snap, embedder))
}

pub async fn run_search(
    config: &Config,
    query: &str,
    limit: Option<usize>,
    all: bool,
) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let (snap, embedder) = open_index(config)?;
    let top_k = limit.unwrap_or(config.retrieval.top_k);
    let retrieved = snap.index.search(embedder.as_ref(), query, top_k).await?;
    let total = retrieved.len();
    let results = if all {
        retrieved
    } else {
        filter_by_score(retrieved, config.retrieval.min_score)
    };

    if results.is_empty() {
        println!("No results.");
        println!("({})", summary_line(0, total));
        return Ok(());
    }

    for line in render_results(&results) {
        println!("{}", line);
    }
    println!("({})", summary_line(results.len(), total));
    Ok(())
}

fn render_results(results: &[ScoredDocument]) -> Vec<String> {
    let mut lines = Vec::new();
    for (i, result) in results.iter().enumerate() {
        let title_display = result.title.as_deref().unwrap_or(&result.key);
        lines.push(format!("{}. [{:.2}] {}", i + 1, result.score, title_display));
        lines.push(format!("    file: {}", result.key));
        if let Some(ref url) = result.url {
            lines.push(format!("    url: {}", url));
        }
        lines.push(format!(
            "    excerpt: \"{}\"",
            excerpt(&result.snippet, 240)
        ));
        lines.push(String::new());
    }
    lines
}

/// Single-line excerpt of at most `max_chars` characters.
fn excerpt(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        let cut: String = flat.chars().take(max_chars).collect();
        format!("{}…", cut.trim_end())
    }
}
