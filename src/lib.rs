//! # Folio Chat
//!
//! The assistant behind a personal portfolio and blog: a small fixed graph of
//! agents that answers visitors in the site owner's voice, backed by semantic
//! search over the owner's source repositories.
//!
//! ## Architecture
//!
//! ```text
//!             ┌──────────────┐
//! message ──▶ │ Orchestrator │ ──┬──▶ RepoInvestigator ──┐
//!             └──────────────┘   ├──▶ BlogExplainer ─────┤
//!                                └───────────────────────┴──▶ ResponseGenerator ──▶ reply
//!
//! GitHub ──▶ ingest ──▶ Embedder ──▶ CodeIndex (index-<sha>.bin + documents.json)
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! folio init                          # article schema + index directory
//! folio index                         # embed every repository
//! folio search "tokenizer" --limit 3
//! folio chat "What is your tokenizer project about?"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`embedding`] | Embedding providers |
//! | [`llm`] | Chat-completion models with streaming |
//! | [`store`] | Persistent code index |
//! | [`github`] | Repository host client |
//! | [`ingest`] | Repository to document conversion |
//! | [`articles`] | Blog article store |
//! | [`tools`] | Retrieval tools rendered as prompt context |
//! | [`agents`] | The four agent nodes |
//! | [`graph`] | Chat graph runner |
//! | [`logging`] | Tracing setup |

pub mod agents;
pub mod articles;
pub mod config;
pub mod embedding;
pub mod github;
pub mod graph;
pub mod http;
pub mod ingest;
pub mod llm;
pub mod logging;
pub mod store;
pub mod tools;

pub use folio_chat_core::models;
pub use folio_chat_core::routing;
