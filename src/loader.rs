//! Local corpus loader: staged files → [`CorpusDocument`]s.
//!
//! The staging directory is scanned recursively. Hidden files and any
//! configured exclude globs are ignored. Each remaining file is read with
//! the extractor registered for its lower-cased extension, falling back to
//! the registry's default (plain text).
//!
//! # Built-in extractors
//!
//! | Name | Extensions | Output |
//! |------|------------|--------|
//! | `text` | default | UTF-8 text (invalid sequences replaced) |
//! | `table` | `xlsx` | every worksheet, one line per row, cells joined by ` | ` |
//!
//! A failing extraction is logged and the file skipped; the rest of the
//! corpus still loads.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{Result, WikiError};
use crate::extract;
use crate::models::{CorpusDocument, DocumentMetadata, NodeMetadataMap};

/// Turns one staged file's bytes into document text.
pub trait Extractor: Send + Sync {
    /// Strategy name, e.g. `"text"`.
    fn name(&self) -> &str;

    fn extract(&self, path: &Path, bytes: &[u8]) -> Result<String>;
}

/// UTF-8 pass-through.
pub struct PlainTextExtractor;

impl Extractor for PlainTextExtractor {
    fn name(&self) -> &str {
        "text"
    }

    fn extract(&self, _path: &Path, bytes: &[u8]) -> Result<String> {
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}

/// Workbook → row-major text.
pub struct TableExtractor;

impl Extractor for TableExtractor {
    fn name(&self) -> &str {
        "table"
    }

    fn extract(&self, path: &Path, bytes: &[u8]) -> Result<String> {
        let tables = extract::read_workbook(bytes).map_err(|e| WikiError::extract(path, e))?;
        Ok(extract::render_tables(&tables))
    }
}

/// Explicit extension → extractor mapping.
pub struct ExtractorRegistry {
    by_extension: HashMap<String, Arc<dyn Extractor>>,
    default: Arc<dyn Extractor>,
}

impl ExtractorRegistry {
    /// Registry with only the default extractor.
    pub fn new(default: Arc<dyn Extractor>) -> Self {
        Self {
            by_extension: HashMap::new(),
            default,
        }
    }

    /// `text` by default, `table` for `.xlsx`.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new(Arc::new(PlainTextExtractor));
        registry.register("xlsx", Arc::new(TableExtractor));
        registry
    }

    /// Map `extension` (without the dot, any case) to `extractor`.
    pub fn register(&mut self, extension: &str, extractor: Arc<dyn Extractor>) {
        self.by_extension
            .insert(extension.trim_start_matches('.').to_lowercase(), extractor);
    }

    /// Extractor for `path`, by lower-cased extension.
    pub fn for_path(&self, path: &Path) -> &dyn Extractor {
        let found = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .and_then(|ext| self.by_extension.get(&ext));
        match found {
            Some(extractor) => &**extractor,
            None => &*self.default,
        }
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Load every staged file under `staging_dir`.
///
/// Documents are keyed by their path relative to `staging_dir` and
/// returned sorted by key. Metadata comes from `lookup`; a missing entry
/// leaves `title` and `url` empty.
///
/// # Errors
///
/// [`WikiError::Io`] if `staging_dir` is missing, or
/// [`WikiError::Config`] for an invalid exclude glob. Per-file failures
/// are logged and skipped.
pub fn load_staged_documents(
    staging_dir: &Path,
    lookup: &NodeMetadataMap,
    registry: &ExtractorRegistry,
    exclude_globs: &[String],
) -> Result<Vec<CorpusDocument>> {
    if !staging_dir.is_dir() {
        return Err(WikiError::io(
            staging_dir,
            std::io::Error::new(std::io::ErrorKind::NotFound, "staging directory not found"),
        ));
    }
    let exclude_set = build_globset(exclude_globs)?;

    let mut docs = Vec::new();
    let walker = WalkDir::new(staging_dir)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e.file_name()));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "unreadable staging entry, skipping");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(staging_dir).unwrap_or(path);
        let key = relative.to_string_lossy().replace('\\', "/");
        if exclude_set.is_match(&key) {
            debug!(file = %key, "excluded");
            continue;
        }

        let extractor = registry.for_path(path);
        let text = match std::fs::read(path)
            .map_err(|e| WikiError::io(path, e))
            .and_then(|bytes| extractor.extract(path, &bytes))
        {
            Ok(text) => text,
            Err(e) => {
                warn!(file = %key, extractor = extractor.name(), error = %e, "extraction failed, skipping file");
                continue;
            }
        };

        let file_name = entry.file_name().to_string_lossy().into_owned();
        let node = lookup.get(&key);
        docs.push(CorpusDocument {
            metadata: DocumentMetadata {
                source_path: path.to_string_lossy().into_owned(),
                file_name,
                title: node.map(|m| m.title.clone()),
                url: node.map(|m| m.url.clone()),
                node_token: node.map(|m| m.node_token.clone()),
            },
            key,
            text,
        });
    }

    docs.sort_by(|a, b| a.key.cmp(&b.key));
    info!(documents = docs.len(), dir = %staging_dir.display(), "corpus loaded");
    Ok(docs)
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| WikiError::Config(format!("invalid exclude glob '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| WikiError::Config(format!("invalid exclude globs: {}", e)))
}
