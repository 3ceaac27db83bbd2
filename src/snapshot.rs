//! Index snapshot persistence.
//!
//! `wctx ingest` writes the built [`VectorIndex`] and the citation
//! [`NodeMetadataMap`] to one JSON file; `search`, `chat`, and `stats`
//! load it back. A snapshot is only usable with the embedding model and
//! dimensionality it was built with.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::error::{Result, WikiError};
use crate::index::VectorIndex;
use crate::models::NodeMetadataMap;

/// Bumped when the on-disk layout changes.
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub space_id: String,
    pub index: VectorIndex,
    pub metadata: NodeMetadataMap,
}

impl Snapshot {
    pub fn new(space_id: &str, index: VectorIndex, metadata: NodeMetadataMap) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            space_id: space_id.to_string(),
            index,
            metadata,
        }
    }
}

/// Write `snapshot` to `path` as JSON, creating parent directories.
///
/// The file is written to a sibling temp path and renamed into place.
pub fn save(snapshot: &Snapshot, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| WikiError::io(parent, e))?;
    }
    let json = serde_json::to_vec(snapshot)
        .map_err(|e| WikiError::Config(format!("failed to serialize snapshot: {}", e)))?;

    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &json).map_err(|e| WikiError::io(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| WikiError::io(path, e))?;

    info!(
        path = %path.display(),
        documents = snapshot.index.document_count(),
        chunks = snapshot.index.chunk_count(),
        "snapshot saved"
    );
    Ok(())
}

/// Read a snapshot and check it against the configured embedder.
///
/// # Errors
///
/// [`WikiError::Io`] if the file cannot be read, [`WikiError::Config`] if
/// it is malformed, from another version, or built with a different
/// model/dimensionality than `expected_model`/`expected_dims`.
pub fn load(path: &Path, expected_model: &str, expected_dims: usize) -> Result<Snapshot> {
    let snapshot = read(path)?;
    if snapshot.index.model != expected_model || snapshot.index.dims != expected_dims {
        return Err(WikiError::Config(format!(
            "snapshot was built with {} ({} dims) but the configured embedder is {} ({} dims); \
             run `wctx ingest` again",
            snapshot.index.model, snapshot.index.dims, expected_model, expected_dims
        )));
    }
    Ok(snapshot)
}

/// Read a snapshot without checking the embedder (used by `wctx stats`).
pub fn read(path: &Path) -> Result<Snapshot> {
    let bytes = std::fs::read(path).map_err(|e| WikiError::io(path, e))?;
    let snapshot: Snapshot = serde_json::from_slice(&bytes).map_err(|e| {
        WikiError::Config(format!("malformed snapshot {}: {}", path.display(), e))
    })?;

    if snapshot.version != SNAPSHOT_VERSION {
        return Err(WikiError::Config(format!(
            "snapshot version {} is not supported (expected {}); run `wctx ingest` again",
            snapshot.version, SNAPSHOT_VERSION
        )));
    }
    Ok(snapshot)
}
