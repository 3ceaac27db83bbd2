//! Ingestion pipeline orchestration.
//!
//! One-shot, strictly sequential:
//!
//! ```text
//! token ─▶ walk space ─▶ fetch & stage ─▶ load corpus ─▶ build index
//! ```
//!
//! Per-node and per-file failures are logged and skipped by the stages
//! themselves. Only an authentication failure, a failed root listing, or
//! an empty corpus abort the run.

use std::path::PathBuf;
use std::time::Duration;

use tracing::info;

use crate::auth::get_tenant_access_token;
use crate::client::{FeishuClient, WikiApi};
use crate::config::Config;
use crate::embedding::{create_embedder, Embedder};
use crate::error::{Result, WikiError};
use crate::fetcher::{stage_all, FetchOptions};
use crate::index::{build_index, BuildOptions, VectorIndex};
use crate::loader::{load_staged_documents, ExtractorRegistry};
use crate::models::NodeMetadataMap;
use crate::progress::{IngestPhase, ProgressMode, ProgressReporter};
use crate::snapshot::{self, Snapshot};
use crate::walker::walk_space;

/// Everything one run needs, resolved from configuration up front.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub app_id: String,
    pub app_secret: String,
    pub space_id: String,
    pub staging_dir: PathBuf,
    pub exclude_globs: Vec<String>,
    pub fetch: FetchOptions,
    pub build: BuildOptions,
}

impl IngestOptions {
    /// Resolve options (including the app secret) from `config`.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            app_id: config.wiki.app_id.clone(),
            app_secret: config.wiki.resolve_secret()?,
            space_id: config.wiki.space_id.clone(),
            staging_dir: config.staging.dir.clone(),
            exclude_globs: config.staging.exclude_globs.clone(),
            fetch: FetchOptions {
                export_sheets: config.wiki.export_sheets,
                web_url: config.wiki.web_url.clone(),
            },
            build: BuildOptions {
                batch_size: config.embedding.batch_size,
                max_tokens: config.index.max_tokens,
            },
        })
    }
}

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestReport {
    pub nodes: usize,
    pub failed_subtrees: usize,
    pub staged: usize,
    pub skipped: usize,
    pub failed: usize,
    pub documents: usize,
    pub chunks: usize,
}

/// The (index, citation metadata) pair a consumer keeps for its lifetime.
#[derive(Debug)]
pub struct IngestOutput {
    pub index: VectorIndex,
    pub metadata: NodeMetadataMap,
    pub report: IngestReport,
}

/// Run the full pipeline against `api`.
///
/// # Errors
///
/// - [`WikiError::Auth`] if the token exchange fails.
/// - [`WikiError::List`] if the root of the space cannot be listed.
/// - [`WikiError::EmptyCorpus`] if no staged file produced a document.
/// - [`WikiError::Io`] if the staging directory cannot be created or read.
/// - [`WikiError::Embedding`] if the embedder fails.
pub async fn run_ingest(
    api: &dyn WikiApi,
    embedder: &dyn Embedder,
    options: &IngestOptions,
    progress: &dyn ProgressReporter,
) -> Result<IngestOutput> {
    let token = get_tenant_access_token(api, &options.app_id, &options.app_secret).await?;

    progress.report(IngestPhase::Walking, 0, None);
    let walk = walk_space(api, &options.space_id, &token).await?;
    progress.report(IngestPhase::Walking, walk.nodes.len() as u64, None);

    let fetched = stage_all(
        api,
        &walk.nodes,
        &token,
        &options.staging_dir,
        &options.fetch,
        progress,
    )
    .await?;

    let documents = load_staged_documents(
        &options.staging_dir,
        &fetched.metadata,
        &ExtractorRegistry::with_defaults(),
        &options.exclude_globs,
    )?;
    progress.report(
        IngestPhase::Loading,
        documents.len() as u64,
        Some(documents.len() as u64),
    );
    if documents.is_empty() {
        return Err(WikiError::EmptyCorpus);
    }

    let index = build_index(documents, embedder, &options.build, progress).await?;

    let report = IngestReport {
        nodes: walk.nodes.len(),
        failed_subtrees: walk.failed_subtrees.len(),
        staged: fetched.staged.len(),
        skipped: fetched.skipped,
        failed: fetched.failed,
        documents: index.document_count(),
        chunks: index.chunk_count(),
    };
    info!(?report, space_id = %options.space_id, "ingest complete");

    Ok(IngestOutput {
        index,
        metadata: fetched.metadata,
        report,
    })
}

/// `wctx ingest`: run the pipeline against the configured service and
/// write the snapshot.
pub async fn run_ingest_cmd(config: &Config, mode: ProgressMode) -> anyhow::Result<()> {
    if !config.embedding.is_enabled() {
        anyhow::bail!("ingest requires embeddings. Set [embedding] provider in config.");
    }
    let options = IngestOptions::from_config(config)?;
    let client = FeishuClient::new(
        &config.wiki.base_url,
        config.wiki.page_size,
        Duration::from_secs(config.wiki.timeout_secs),
    )?;
    let embedder = create_embedder(&config.embedding)?;
    let reporter = mode.reporter();

    let output = run_ingest(&client, embedder.as_ref(), &options, reporter.as_ref()).await?;

    let snap = Snapshot::new(&options.space_id, output.index, output.metadata);
    snapshot::save(&snap, &config.index.snapshot)?;

    let r = &output.report;
    println!("ingest {}", options.space_id);
    println!("  nodes walked:     {}", r.nodes);
    if r.failed_subtrees > 0 {
        println!("  subtrees skipped: {}", r.failed_subtrees);
    }
    println!("  files staged:     {}", r.staged);
    println!("  nodes skipped:    {}", r.skipped);
    println!("  fetch failures:   {}", r.failed);
    println!("  documents:        {}", r.documents);
    println!("  chunks:           {}", r.chunks);
    println!("  snapshot:         {}", config.index.snapshot.display());
    println!("ok");

    Ok(())
}
