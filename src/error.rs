//! Error taxonomy for the ingestion pipeline.
//!
//! Library operations return [`WikiError`]; the `wctx` binary wraps it in
//! `anyhow` for context. Errors local to one node or one staged file
//! (`List` below the root, `Fetch`, `Extract`) are logged and swallowed
//! by the pipeline. Only `Auth`, a root-level `List`, and `EmptyCorpus`
//! reach the caller.

use std::path::PathBuf;

/// Every failure the pipeline, index, and chat layers can report.
#[derive(Debug, thiserror::Error)]
pub enum WikiError {
    /// Credential exchange failed. Always fatal.
    #[error("tenant access token request failed (code {code}): {msg}")]
    Auth { code: i64, msg: String },

    /// A node listing page could not be retrieved.
    #[error("listing nodes under {parent} failed: {reason}")]
    List { parent: String, reason: String },

    /// A single node's content could not be retrieved or staged.
    #[error("fetching node {node} failed: {reason}")]
    Fetch { node: String, reason: String },

    /// A staged file could not be turned into a corpus document.
    #[error("extracting {path:?} failed: {reason}")]
    Extract { path: PathBuf, reason: String },

    /// No staged file produced a document.
    #[error("no documents were staged; refusing to build an empty index")]
    EmptyCorpus,

    #[error("config error: {0}")]
    Config(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("embedding error: {0}")]
    Embedding(String),

    #[error("chat error: {0}")]
    Chat(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, WikiError>;

impl WikiError {
    /// Wrap a `std::io::Error` with the path it happened at.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn extract(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Extract {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn fetch(node: impl Into<String>, reason: impl ToString) -> Self {
        Self::Fetch {
            node: node.into(),
            reason: reason.to_string(),
        }
    }

    /// True for errors the pipeline never swallows.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Auth { .. } | Self::EmptyCorpus | Self::Config(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_error_carries_remote_code() {
        let err = WikiError::Auth {
            code: 10014,
            msg: "app secret invalid".into(),
        };
        let text = err.to_string();
        assert!(text.contains("10014"));
        assert!(text.contains("app secret invalid"));
        assert!(err.is_fatal());
    }

    #[test]
    fn per_node_errors_are_not_fatal() {
        assert!(!WikiError::fetch("doxcn1", "boom").is_fatal());
        assert!(!WikiError::extract("/tmp/a.xlsx", "bad zip").is_fatal());
    }
}
