//! Content fetcher: download node content into the staging directory.
//!
//! | Object type | Action |
//! |-------------|--------|
//! | `docx`, `doc` | raw text written verbatim to `staging_dir/<title>` (`<title>.txt` if the title ends in `.xlsx`) |
//! | `sheet` | exported as xlsx to `staging_dir/<title>.xlsx` when `export_sheets` is on, else skipped |
//! | anything else | skipped |
//!
//! Titles are used as file names after replacing path separators and a
//! leading `.`, so no staged file is hidden from the loader. Two nodes
//! with the same title map to the same file; the later one wins and a
//! warning is logged.

use std::collections::HashSet;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::client::WikiApi;
use crate::error::{Result, WikiError};
use crate::models::{
    AccessToken, NodeMetadata, NodeMetadataMap, StagedFile, StagedKind, WikiNode,
};
use crate::progress::{IngestPhase, ProgressReporter};

const WORKBOOK_SUFFIX: &str = ".xlsx";
/// Appended to document titles that would otherwise be read as workbooks.
const TEXT_SUFFIX: &str = ".txt";

/// Per-run fetch settings.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub export_sheets: bool,
    /// Browser base used to build citation URLs (`{web_url}/{node_token}`).
    pub web_url: String,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            export_sheets: false,
            web_url: "https://feishu.cn/wiki".to_string(),
        }
    }
}

/// Outcome of staging every walked node.
#[derive(Debug, Default)]
pub struct FetchReport {
    pub staged: Vec<StagedFile>,
    /// Nodes whose type is not ingested (or sheets with export disabled).
    pub skipped: usize,
    /// Nodes whose content could not be fetched or written.
    pub failed: usize,
    /// Citation metadata keyed by staged file name.
    pub metadata: NodeMetadataMap,
}

/// File name used for a node title inside the staging directory.
///
/// Path separators and a leading `.` become `_`; an empty title falls
/// back to `fallback`.
pub fn sanitize_title(title: &str, fallback: &str) -> String {
    let cleaned: String = title
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c => c,
        })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => fallback.to_string(),
        _ => match cleaned.strip_prefix('.') {
            Some(rest) => format!("_{}", rest),
            None => cleaned,
        },
    }
}

/// Browser URL for a node.
pub fn node_url(web_url: &str, node_token: &str) -> String {
    format!("{}/{}", web_url.trim_end_matches('/'), node_token)
}

/// Fetch one node's content and write it under `staging_dir`.
///
/// Returns `Ok(None)` for node types that are not ingested.
///
/// # Errors
///
/// [`WikiError::Fetch`] when the content cannot be retrieved, or
/// [`WikiError::Io`] when the staging directory cannot be written.
pub async fn fetch_and_stage(
    api: &dyn WikiApi,
    node: &WikiNode,
    token: &AccessToken,
    staging_dir: &Path,
    options: &FetchOptions,
) -> Result<Option<StagedFile>> {
    let base_name = sanitize_title(&node.title, &node.node_token);

    let (file_name, bytes, kind) = if node.obj_type.is_document() {
        let content = api.raw_content(token, &node.obj_token).await?;
        let file_name = if has_workbook_suffix(&base_name) {
            format!("{}{}", base_name, TEXT_SUFFIX)
        } else {
            base_name
        };
        (file_name, content.into_bytes(), StagedKind::Text)
    } else if node.obj_type.is_spreadsheet() {
        if !options.export_sheets {
            debug!(node = %node.node_token, title = %node.title, "sheet export disabled, skipping");
            return Ok(None);
        }
        let bytes = api.export_sheet(token, &node.obj_token).await?;
        let file_name = if has_workbook_suffix(&base_name) {
            base_name
        } else {
            format!("{}{}", base_name, WORKBOOK_SUFFIX)
        };
        (file_name, bytes, StagedKind::Workbook)
    } else {
        debug!(node = %node.node_token, obj_type = %node.obj_type, "unsupported node type, skipping");
        return Ok(None);
    };

    std::fs::create_dir_all(staging_dir).map_err(|e| WikiError::io(staging_dir, e))?;
    let path = staging_dir.join(&file_name);
    std::fs::write(&path, &bytes).map_err(|e| WikiError::io(&path, e))?;
    debug!(node = %node.node_token, path = %path.display(), bytes = bytes.len(), "staged");

    Ok(Some(StagedFile {
        path,
        file_name,
        node_token: node.node_token.clone(),
        kind,
    }))
}

fn has_workbook_suffix(name: &str) -> bool {
    name.to_lowercase().ends_with(WORKBOOK_SUFFIX)
}

/// Stage every node in order, swallowing per-node failures.
///
/// The staging directory is created even when nothing is staged.
pub async fn stage_all(
    api: &dyn WikiApi,
    nodes: &[WikiNode],
    token: &AccessToken,
    staging_dir: &Path,
    options: &FetchOptions,
    progress: &dyn ProgressReporter,
) -> Result<FetchReport> {
    std::fs::create_dir_all(staging_dir).map_err(|e| WikiError::io(staging_dir, e))?;

    let mut report = FetchReport::default();
    let mut written: HashSet<String> = HashSet::new();
    let total = nodes.len() as u64;

    for (i, node) in nodes.iter().enumerate() {
        match fetch_and_stage(api, node, token, staging_dir, options).await {
            Ok(Some(staged)) => {
                if !written.insert(staged.file_name.clone()) {
                    warn!(
                        file = %staged.file_name,
                        node = %node.node_token,
                        "duplicate title, overwriting previously staged file"
                    );
                    report.staged.retain(|s| s.file_name != staged.file_name);
                }
                report.metadata.insert(
                    staged.file_name.clone(),
                    NodeMetadata {
                        title: node.title.clone(),
                        url: node_url(&options.web_url, &node.node_token),
                        node_token: node.node_token.clone(),
                    },
                );
                report.staged.push(staged);
            }
            Ok(None) => report.skipped += 1,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(node = %node.node_token, title = %node.title, error = %e, "fetch failed, skipping node");
                report.failed += 1;
            }
        }
        progress.report(IngestPhase::Fetching, i as u64 + 1, Some(total));
    }

    info!(
        staged = report.staged.len(),
        skipped = report.skipped,
        failed = report.failed,
        dir = %staging_dir.display(),
        "staging complete"
    );
    Ok(report)
}
