//! Index snapshot statistics.
//!
//! Provides a quick summary of what's indexed: document counts, chunk
//! counts, citation coverage, and the embedding model. Used by
//! `wctx stats` to confirm an ingest produced what was expected.

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::config::Config;
use crate::snapshot::{self, Snapshot};

/// Counts derived from a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotStats {
    pub documents: usize,
    pub chunks: usize,
    /// Documents with a title/url from the citation lookup.
    pub cited: usize,
    /// Documents read with the tabular extractor.
    pub workbooks: usize,
    pub model: String,
    pub dims: usize,
}

impl SnapshotStats {
    pub fn from_snapshot(snap: &Snapshot) -> Self {
        let docs = &snap.index.documents;
        Self {
            documents: docs.len(),
            chunks: snap.index.chunk_count(),
            cited: docs.iter().filter(|d| d.metadata.url.is_some()).count(),
            workbooks: docs
                .iter()
                .filter(|d| d.key.to_lowercase().ends_with(".xlsx"))
                .count(),
            model: snap.index.model.clone(),
            dims: snap.index.dims,
        }
    }
}

/// Run the stats command: read the snapshot and print a summary.
pub fn run_stats(config: &Config) -> Result<()> {
    let path = &config.index.snapshot;
    let snap = snapshot::read(path)?;
    let stats = SnapshotStats::from_snapshot(&snap);
    let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);

    println!("Wiki Harness: Index Stats");
    println!("=========================");
    println!();
    println!("  Snapshot:    {}", path.display());
    println!("  Size:        {}", format_bytes(size));
    println!("  Space:       {}", snap.space_id);
    println!("  Built:       {}", format_ts_relative(snap.index.built_at));
    println!("  Model:       {} ({} dims)", stats.model, stats.dims);
    println!();
    println!("  Documents:   {}", stats.documents);
    println!("  Workbooks:   {}", stats.workbooks);
    println!("  Chunks:      {}", stats.chunks);
    println!(
        "  Cited:       {} / {} ({}%)",
        stats.cited,
        stats.documents,
        if stats.documents > 0 {
            (stats.cited * 100) / stats.documents
        } else {
            0
        }
    );
    println!();
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a timestamp relative to now (e.g. "3 hours ago").
fn format_ts_relative(ts: DateTime<Utc>) -> String {
    let delta = (Utc::now() - ts).num_seconds();

    if delta < 0 {
        return ts.format("%Y-%m-%d %H:%M").to_string();
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        ts.format("%Y-%m-%d %H:%M").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{IndexedChunk, VectorIndex};
    use crate::models::{CorpusDocument, DocumentMetadata, NodeMetadataMap};

    #[test]
    fn counts_documents_workbooks_and_citations() {
        let doc = |key: &str, url: Option<&str>| CorpusDocument {
            key: key.into(),
            text: String::new(),
            metadata: DocumentMetadata {
                url: url.map(str::to_string),
                ..DocumentMetadata::default()
            },
        };
        let index = VectorIndex {
            model: "hashing".into(),
            dims: 256,
            built_at: Utc::now(),
            documents: vec![
                doc("Budget.xlsx", Some("https://feishu.cn/wiki/s1")),
                doc("Notes", Some("https://feishu.cn/wiki/n1")),
                doc("stale", None),
            ],
            chunks: Vec::<IndexedChunk>::new(),
        };
        let stats = SnapshotStats::from_snapshot(&Snapshot::new("sp", index, NodeMetadataMap::new()));
        assert_eq!(stats.documents, 3);
        assert_eq!(stats.workbooks, 1);
        assert_eq!(stats.cited, 2);
        assert_eq!(stats.chunks, 0);
    }

    #[test]
    fn format_bytes_units() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn relative_time_buckets() {
        assert_eq!(format_ts_relative(Utc::now()), "just now");
        let two_hours = Utc::now() - chrono::Duration::hours(2);
        assert_eq!(format_ts_relative(two_hours), "2 hours ago");
    }
}
