//! Vector index over the corpus.
//!
//! Built once per ingest run: every [`CorpusDocument`] is chunked, chunk
//! texts are embedded in fixed-size batches, and the vectors are held in
//! memory next to their chunks. Search is brute-force cosine similarity
//! over all chunk vectors.
//!
//! Blank chunks are never embedded. A document with no text stays in the
//! corpus without chunks and so never appears in search results.
//!
//! # Scoring
//!
//! ```text
//! chunk score    = cos(query, chunk vector)
//! document score = max(chunk scores of that document)
//! order          = score desc, then key asc
//! ```
//!
//! The snippet of a result is the text of its best-scoring chunk.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::chunk::chunk_text;
use crate::embedding::{cosine_similarity, embed_query, Embedder};
use crate::error::{Result, WikiError};
use crate::models::{Chunk, CorpusDocument, ScoredDocument};
use crate::progress::{IngestPhase, ProgressReporter};

/// Index build settings.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Chunk texts per embedding request.
    pub batch_size: usize,
    /// Chunk size limit (approximate tokens).
    pub max_tokens: usize,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            batch_size: 16,
            max_tokens: 700,
        }
    }
}

/// A chunk with its embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedChunk {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// Searchable in-memory index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorIndex {
    pub model: String,
    pub dims: usize,
    pub built_at: DateTime<Utc>,
    /// Sorted by key.
    pub documents: Vec<CorpusDocument>,
    pub chunks: Vec<IndexedChunk>,
}

/// Chunk and embed `documents` into a [`VectorIndex`].
///
/// # Errors
///
/// - [`WikiError::EmptyCorpus`] when `documents` is empty.
/// - [`WikiError::Embedding`] when the embedder fails or returns vectors of
///   the wrong count or dimensionality.
pub async fn build_index(
    mut documents: Vec<CorpusDocument>,
    embedder: &dyn Embedder,
    options: &BuildOptions,
    progress: &dyn ProgressReporter,
) -> Result<VectorIndex> {
    if documents.is_empty() {
        return Err(WikiError::EmptyCorpus);
    }
    documents.sort_by(|a, b| a.key.cmp(&b.key));

    let chunks: Vec<Chunk> = documents
        .iter()
        .flat_map(|doc| chunk_text(&doc.key, &doc.text, options.max_tokens))
        .filter(|chunk| {
            let blank = chunk.text.trim().is_empty();
            if blank {
                debug!(document = %chunk.document_key, "blank chunk, not embedded");
            }
            !blank
        })
        .collect();
    let total = chunks.len() as u64;
    let batch_size = options.batch_size.max(1);

    let mut indexed = Vec::with_capacity(chunks.len());
    for batch in chunks.chunks(batch_size) {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let vectors = embedder.embed(&texts).await?;
        if vectors.len() != batch.len() {
            return Err(WikiError::Embedding(format!(
                "embedder returned {} vectors for {} texts",
                vectors.len(),
                batch.len()
            )));
        }
        for (chunk, vector) in batch.iter().zip(vectors) {
            if vector.len() != embedder.dims() {
                return Err(WikiError::Embedding(format!(
                    "vector for chunk {} has {} dims, expected {}",
                    chunk.id,
                    vector.len(),
                    embedder.dims()
                )));
            }
            indexed.push(IndexedChunk {
                chunk: chunk.clone(),
                vector,
            });
        }
        debug!(embedded = indexed.len(), total, "embedded batch");
        progress.report(IngestPhase::Embedding, indexed.len() as u64, Some(total));
    }

    info!(
        documents = documents.len(),
        chunks = indexed.len(),
        model = embedder.model_name(),
        "index built"
    );

    Ok(VectorIndex {
        model: embedder.model_name().to_string(),
        dims: embedder.dims(),
        built_at: Utc::now(),
        documents,
        chunks: indexed,
    })
}

impl VectorIndex {
    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn document(&self, key: &str) -> Option<&CorpusDocument> {
        self.documents
            .binary_search_by(|d| d.key.as_str().cmp(key))
            .ok()
            .map(|i| &self.documents[i])
    }

    /// Embed `query` and return the `top_k` best documents.
    ///
    /// A blank query returns no results without calling the embedder.
    pub async fn search(
        &self,
        embedder: &dyn Embedder,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<ScoredDocument>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let query_vec = embed_query(embedder, query).await?;
        Ok(self.search_vector(&query_vec, top_k))
    }

    /// Rank documents against an already-embedded query.
    pub fn search_vector(&self, query: &[f32], top_k: usize) -> Vec<ScoredDocument> {
        struct Best<'a> {
            score: f64,
            chunk: &'a Chunk,
        }

        let mut best: HashMap<&str, Best<'_>> = HashMap::new();
        for ic in &self.chunks {
            let score = cosine_similarity(query, &ic.vector) as f64;
            best.entry(ic.chunk.document_key.as_str())
                .and_modify(|b| {
                    if score > b.score {
                        b.score = score;
                        b.chunk = &ic.chunk;
                    }
                })
                .or_insert(Best {
                    score,
                    chunk: &ic.chunk,
                });
        }

        let mut ranked: Vec<(&str, Best<'_>)> = best.into_iter().collect();
        ranked.sort_by(|a, b| {
            b.1.score
                .partial_cmp(&a.1.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(b.0))
        });
        ranked.truncate(top_k);

        ranked
            .into_iter()
            .map(|(key, b)| {
                let doc = self.document(key);
                ScoredDocument {
                    key: key.to_string(),
                    score: b.score,
                    title: doc.and_then(|d| d.metadata.title.clone()),
                    url: doc.and_then(|d| d.metadata.url.clone()),
                    snippet: b.chunk.text.clone(),
                }
            })
            .collect()
    }
}

/// Drop results scoring below `min_score`.
pub fn filter_by_score(results: Vec<ScoredDocument>, min_score: f64) -> Vec<ScoredDocument> {
    results
        .into_iter()
        .filter(|r| r.score >= min_score)
        .collect()
}
