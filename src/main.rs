//! # Wiki Harness CLI (`wctx`)
//!
//! The `wctx` binary ingests a Feishu wiki space into a local index
//! snapshot and queries it.
//!
//! ## Usage
//!
//! ```bash
//! wctx --config ./config/wctx.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `wctx ingest` | Walk the space, stage content, build and save the index |
//! | `wctx nodes` | List the walked node tree without staging anything |
//! | `wctx search "<query>"` | Query the index and print cited results |
//! | `wctx chat` | Interactive conversation over the index |
//! | `wctx stats` | Document, chunk and embedding counts of the snapshot |

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use wiki_harness::progress::ProgressMode;
use wiki_harness::{chat, config, nodes, pipeline, search, stats};

/// Wiki Harness CLI: Feishu wiki ingestion and citation-aware retrieval.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/wctx.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "wctx",
    about = "Wiki Harness: ingest a Feishu wiki space and query it with citations",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/wctx.toml")]
    config: PathBuf,

    /// Log output format.
    #[arg(long, value_enum, global = true, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum ProgressArg {
    Auto,
    Off,
    Human,
    Json,
}

impl ProgressArg {
    fn mode(self) -> ProgressMode {
        match self {
            ProgressArg::Auto => ProgressMode::default_for_tty(),
            ProgressArg::Off => ProgressMode::Off,
            ProgressArg::Human => ProgressMode::Human,
            ProgressArg::Json => ProgressMode::Json,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline and write the index snapshot.
    ///
    /// Authenticates, walks every node of the configured space, stages
    /// document (and optionally spreadsheet) content under the staging
    /// directory, then chunks, embeds and saves the index.
    Ingest {
        /// Progress reporting on stderr.
        #[arg(long, value_enum, default_value_t = ProgressArg::Auto)]
        progress: ProgressArg,
    },

    /// Authenticate and list the walked nodes as a tree.
    Nodes,

    /// Query the index snapshot.
    ///
    /// Results under `[retrieval].min_score` are dropped unless `--all`
    /// is given.
    Search {
        /// The search query string.
        query: String,

        /// Maximum number of results (defaults to `[retrieval].top_k`).
        #[arg(long)]
        limit: Option<usize>,

        /// Show every retrieved result regardless of score.
        #[arg(long)]
        all: bool,
    },

    /// Interactive conversation over the index.
    ///
    /// Type `/reset` to clear the conversation and `/quit` to exit.
    Chat,

    /// Document, chunk and embedding counts of the snapshot.
    Stats,
}

fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = match cli.verbose {
        0 => "wiki_harness=info",
        1 => "wiki_harness=debug",
        _ => "wiki_harness=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Ingest { progress } => {
            pipeline::run_ingest_cmd(&cfg, progress.mode()).await?;
        }
        Commands::Nodes => {
            nodes::list_nodes(&cfg).await?;
        }
        Commands::Search { query, limit, all } => {
            search::run_search(&cfg, &query, limit, all).await?;
        }
        Commands::Chat => {
            chat::run_chat(&cfg).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg)?;
        }
    }

    Ok(())
}
