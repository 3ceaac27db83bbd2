//! Core data models used throughout the ingestion pipeline.
//!
//! These types represent the wiki nodes, staged files, corpus documents,
//! and search results that flow from the upstream wiki service into the
//! retrieval index.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

/// Declared type of the object a wiki node points at.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ObjectType {
    /// New-style rich document.
    Docx,
    /// Legacy rich document.
    Doc,
    Sheet,
    Bitable,
    Mindnote,
    File,
    Slides,
    Other(String),
}

impl ObjectType {
    /// Parse the wire string (`"docx"`, `"sheet"`, ...).
    pub fn parse(raw: &str) -> Self {
        match raw {
            "docx" => Self::Docx,
            "doc" => Self::Doc,
            "sheet" => Self::Sheet,
            "bitable" => Self::Bitable,
            "mindnote" => Self::Mindnote,
            "file" => Self::File,
            "slides" => Self::Slides,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Docx => "docx",
            Self::Doc => "doc",
            Self::Sheet => "sheet",
            Self::Bitable => "bitable",
            Self::Mindnote => "mindnote",
            Self::File => "file",
            Self::Slides => "slides",
            Self::Other(s) => s,
        }
    }

    /// Documents whose raw text can be fetched directly.
    pub fn is_document(&self) -> bool {
        matches!(self, Self::Docx | Self::Doc)
    }

    pub fn is_spreadsheet(&self) -> bool {
        matches!(self, Self::Sheet)
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry in the wiki tree, as produced by the space walker.
#[derive(Debug, Clone, PartialEq)]
pub struct WikiNode {
    /// Node token; unique within the space.
    pub node_token: String,
    /// Token of the underlying document/sheet object.
    pub obj_token: String,
    pub title: String,
    pub obj_type: ObjectType,
    /// `None` for root-level nodes.
    pub parent_node_token: Option<String>,
    pub has_child: bool,
    pub space_id: String,
    pub obj_edit_time: Option<DateTime<Utc>>,
}

/// Tenant access token for one pipeline run.
///
/// No refresh or expiry handling: the token is treated as valid for the
/// whole run.
#[derive(Clone)]
pub struct AccessToken {
    pub value: String,
    /// App the token was issued to.
    pub app_id: String,
    /// Lifetime in seconds as reported by the service.
    pub expires_in: i64,
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"<redacted>")
            .field("app_id", &self.app_id)
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// How a staged file was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagedKind {
    /// Raw document text.
    Text,
    /// Exported xlsx workbook.
    Workbook,
}

/// A file written into the staging directory by the content fetcher.
#[derive(Debug, Clone)]
pub struct StagedFile {
    pub path: PathBuf,
    /// File name relative to the staging directory; the metadata key.
    pub file_name: String,
    pub node_token: String,
    pub kind: StagedKind,
}

/// Citation metadata for one staged file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeMetadata {
    pub title: String,
    pub url: String,
    pub node_token: String,
}

/// Staged file name → citation metadata.
pub type NodeMetadataMap = HashMap<String, NodeMetadata>;

/// Metadata attached to every corpus document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub source_path: String,
    pub file_name: String,
    /// `None` when the lookup has no entry for this file.
    pub title: Option<String>,
    /// `None` when the lookup has no entry for this file.
    pub url: Option<String>,
    pub node_token: Option<String>,
}

/// Normalized text + metadata unit consumed by the index builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusDocument {
    /// Stable key: the file name relative to the staging directory.
    pub key: String,
    pub text: String,
    pub metadata: DocumentMetadata,
}

/// A chunk of a corpus document's text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub document_key: String,
    pub chunk_index: i64,
    pub text: String,
    pub hash: String,
}

/// A retrieved document with its similarity score.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredDocument {
    pub key: String,
    /// Cosine similarity of the best-matching chunk, in `[-1.0, 1.0]`.
    pub score: f64,
    pub title: Option<String>,
    pub url: Option<String>,
    /// Text of the best-matching chunk.
    pub snippet: String,
}
