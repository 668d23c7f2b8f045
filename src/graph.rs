//! The chat graph: wiring, startup, index rebuilds, and chat turns.
//!
//! [`ChatGraph`] owns the [`AgentContext`] and walks the fixed topology in
//! [`folio_chat_core::routing`]: Orchestrator, then at most one specialist,
//! then the ResponseGenerator. The runner follows the transition table and
//! gives up after [`MAX_HOPS`] nodes.

use anyhow::{bail, Result};
use serde::Serialize;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use folio_chat_core::models::ChatMessage;
use folio_chat_core::routing::{next_node, ConversationState, NodeKind, RouteDecision};

use crate::agents::{orchestrator, response_generator, run_node, AgentContext};
use crate::ingest::index_repository;
use crate::llm::TextStream;

/// Reply used when the graph finishes without producing any text.
pub const FALLBACK_REPLY: &str = "I'm sorry, I couldn't process your request.";

/// Upper bound on nodes visited in one turn.
pub const MAX_HOPS: usize = 8;

/// A repository that could not be indexed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRepository {
    pub name: String,
    pub error: String,
}

/// Outcome of [`ChatGraph::index_repositories`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    pub repositories_indexed: usize,
    pub total_files: usize,
    pub repositories: Vec<String>,
    pub repositories_skipped: Vec<SkippedRepository>,
}

/// Everything a chat turn produced.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub reply: String,
    /// Nodes in the order they ran.
    pub path: Vec<NodeKind>,
    pub decision: Option<RouteDecision>,
}

pub struct ChatGraph {
    ctx: AgentContext,
    init: OnceCell<()>,
}

impl ChatGraph {
    pub fn new(ctx: AgentContext) -> Self {
        Self {
            ctx,
            init: OnceCell::new(),
        }
    }

    pub fn context(&self) -> &AgentContext {
        &self.ctx
    }

    /// Load the index and, when it is empty, build it from every repository.
    ///
    /// Runs once; later calls return immediately. Indexing errors are logged
    /// and never fail startup.
    pub async fn initialize(&self) {
        self.init
            .get_or_init(|| async {
                self.ctx.index.initialize().await;
                let stats = self.ctx.index.stats().await;
                if stats.total_documents == 0 {
                    info!("code index is empty, indexing repositories");
                    match self.index_repositories().await {
                        Ok(report) => info!(
                            repositories = report.repositories_indexed,
                            files = report.total_files,
                            "initial indexing finished"
                        ),
                        Err(e) => warn!(error = %e, "initial indexing failed"),
                    }
                } else {
                    info!(documents = stats.total_documents, "code index ready");
                }
            })
            .await;
    }

    /// Clear the code index and rebuild it from every repository on the
    /// host.
    ///
    /// Per-repository failures are logged and reported, not raised. Each
    /// repository is committed whole, so concurrent searches see the
    /// repositories committed so far.
    pub async fn index_repositories(&self) -> Result<IndexReport> {
        self.ctx.index.clear().await?;

        let repos = match self.ctx.host.list_repositories().await {
            Ok(repos) => repos,
            Err(e) => {
                warn!(error = %e, "could not list repositories");
                return Ok(IndexReport::default());
            }
        };
        info!(count = repos.len(), "found repositories to index");

        let mut report = IndexReport::default();
        for repo in &repos {
            info!(repo = %repo.name, "indexing repository");
            let outcome = async {
                let documents =
                    index_repository(self.ctx.host.as_ref(), &repo.name, &repo.default_branch)
                        .await?;
                let count = documents.len();
                self.ctx.index.add_documents(documents).await?;
                anyhow::Ok(count)
            }
            .await;

            match outcome {
                Ok(0) => info!(repo = %repo.name, "no indexable files"),
                Ok(count) => {
                    info!(repo = %repo.name, files = count, "indexed repository");
                    report.total_files += count;
                    report.repositories.push(repo.name.clone());
                }
                Err(e) => {
                    warn!(repo = %repo.name, error = %e, "skipping repository");
                    report.repositories_skipped.push(SkippedRepository {
                        name: repo.name.clone(),
                        error: format!("{:#}", e),
                    });
                }
            }
        }
        report.repositories_indexed = report.repositories.len();
        Ok(report)
    }

    /// Run one full turn and return the reply.
    pub async fn chat(&self, message: &str, history: Vec<ChatMessage>) -> Result<String> {
        Ok(self.chat_turn(message, history).await?.reply)
    }

    /// Run one full turn, reporting the path taken and the routing decision.
    pub async fn chat_turn(&self, message: &str, history: Vec<ChatMessage>) -> Result<TurnOutcome> {
        self.initialize().await;
        self.run(ConversationState::new(message, history)).await
    }

    /// Walk the graph from the entry node until it ends.
    pub async fn run(&self, initial: ConversationState) -> Result<TurnOutcome> {
        let mut state = initial;
        let mut node = NodeKind::ENTRY;
        let mut path = Vec::new();
        let mut decision = None;

        loop {
            if path.len() >= MAX_HOPS {
                bail!("chat graph exceeded {} hops: {:?}", MAX_HOPS, path);
            }

            let step = run_node(node, &self.ctx, &state).await?;
            path.push(node);
            if step.decision.is_some() {
                decision = step.decision;
            }
            state = step.state;

            let route = state
                .route()
                .ok_or_else(|| anyhow::anyhow!("{} did not choose a route", node))?;
            match next_node(node, route)? {
                Some(next) => node = next,
                None => break,
            }
        }

        let reply = if state.scratch().trim().is_empty() {
            FALLBACK_REPLY.to_string()
        } else {
            state.scratch().to_string()
        };

        Ok(TurnOutcome {
            reply,
            path,
            decision,
        })
    }

    /// Run the turn and stream the final reply.
    ///
    /// The orchestrator and any specialist run to completion first; only the
    /// response generator's output is streamed.
    pub async fn chat_stream(&self, message: &str, history: Vec<ChatMessage>) -> Result<TextStream> {
        self.initialize().await;
        let initial = ConversationState::new(message, history);

        let (mut state, _) = orchestrator::run(&self.ctx, &initial).await;
        if let Some(specialist) = state
            .route()
            .and_then(|route| route.target())
            .filter(|kind| kind.is_specialist())
        {
            state = run_node(specialist, &self.ctx, &state).await?.state;
        }

        response_generator::stream(&self.ctx, &state).await
    }
}
