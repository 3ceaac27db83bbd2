//! Citation rendering for retrieved documents.
//!
//! Results without a title fall back to their staged file name, and
//! results without a URL are listed without a link.

use crate::models::ScoredDocument;

/// `"retrieved N of M sources"`: N shown after the score filter, M retrieved.
pub fn summary_line(shown: usize, retrieved: usize) -> String {
    format!("retrieved {} of {} sources", shown, retrieved)
}

/// One citation line, numbered from 1.
pub fn format_citation(position: usize, doc: &ScoredDocument) -> String {
    let title = doc.title.as_deref().unwrap_or(&doc.key);
    match &doc.url {
        Some(url) => format!("[{}] {} ({:.2}) {}", position, title, doc.score, url),
        None => format!("[{}] {} ({:.2})", position, title, doc.score),
    }
}

/// Summary line followed by one line per source.
pub fn render_sources(sources: &[ScoredDocument], retrieved: usize) -> String {
    let mut lines = vec![summary_line(sources.len(), retrieved)];
    lines.extend(
        sources
            .iter()
            .enumerate()
            .map(|(i, doc)| format_citation(i + 1, doc)),
    );
    lines.join("\n")
}
