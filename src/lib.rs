//! # Wiki Harness
//!
//! Ingests a Feishu wiki space into a citation-aware retrieval index.
//!
//! The pipeline authenticates with app credentials, walks every node of a
//! space, stages document (and optionally spreadsheet) content as local
//! files, loads them back through per-extension extractors, and builds a
//! vector index whose results carry the originating node's title and URL.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌──────────┐
//! │   Auth   │──▶│  Walker  │──▶│ Fetcher  │──▶│  Loader  │──▶│  Index   │
//! │  token   │   │ DFS tree │   │ staging/ │   │ extract  │   │ chunk +  │
//! └──────────┘   └──────────┘   └──────────┘   └──────────┘   │  embed   │
//!                                                             └────┬─────┘
//!                                            ┌─────────────────────┤
//!                                            ▼                     ▼
//!                                       ┌──────────┐         ┌──────────┐
//!                                       │  search  │         │   chat   │
//!                                       └──────────┘         └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! wctx nodes                    # check credentials, show the tree
//! wctx ingest                   # stage, embed, save the snapshot
//! wctx search "release process"
//! wctx chat
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Library error type |
//! | [`models`] | Core data types |
//! | [`client`] | Wiki API trait and Feishu HTTP client |
//! | [`memory`] | In-memory wiki for tests and offline runs |
//! | [`auth`] | Tenant access token acquisition |
//! | [`walker`] | Depth-first space traversal |
//! | [`fetcher`] | Content staging and citation metadata |
//! | [`extract`] | Spreadsheet workbook reading |
//! | [`loader`] | Extractor registry and corpus loading |
//! | [`chunk`] | Text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | Vector index build and search |
//! | [`snapshot`] | Index persistence |
//! | [`citations`] | Source rendering |
//! | [`chat`] | Condense-question conversation |
//! | [`pipeline`] | End-to-end ingest |
//! | [`progress`] | Ingest progress reporting |
//! | [`nodes`] | `wctx nodes` |
//! | [`search`] | `wctx search` |
//! | [`stats`] | `wctx stats` |

pub mod auth;
pub mod chat;
pub mod chunk;
pub mod citations;
pub mod client;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod fetcher;
pub mod index;
pub mod loader;
pub mod memory;
pub mod models;
pub mod nodes;
pub mod pipeline;
pub mod progress;
pub mod search;
pub mod snapshot;
pub mod stats;
pub mod walker;
