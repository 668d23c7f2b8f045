//! The four agent nodes of the chat graph.
//!
//! | Node | Reads | Writes |
//! |------|-------|--------|
//! | [`orchestrator`] | last user message | route |
//! | [`repo_investigator`] | code index, repository host | scratch |
//! | [`blog_explainer`] | article store | scratch |
//! | [`response_generator`] | persona, scratch, history | scratch (the reply) |
//!
//! Nodes share an [`AgentContext`]: the handles built once at startup and
//! injected by the graph. [`run_node`] dispatches on [`NodeKind`] and is the
//! only entry point the graph runner needs.

pub mod blog_explainer;
pub mod orchestrator;
pub mod repo_investigator;
pub mod response_generator;

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

use folio_chat_core::routing::{ConversationState, NodeKind, RouteDecision};

use crate::articles::ArticleStore;
use crate::github::RepositoryHost;
use crate::llm::{LanguageModel, PromptMessage};
use crate::store::CodeIndex;

/// Separator between tool outputs in a specialist's gathered context.
pub(crate) const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Who the assistant speaks as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Persona {
    pub name: String,
    pub bio: String,
}

impl Persona {
    pub fn new(name: impl Into<String>, bio: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bio: bio.into(),
        }
    }

    /// Read the bio from `bio_path`, falling back to a one-line introduction
    /// when the file is missing or unreadable.
    pub fn load(name: &str, bio_path: &Path) -> Self {
        let bio = match std::fs::read_to_string(bio_path) {
            Ok(bio) => bio,
            Err(e) => {
                warn!(path = %bio_path.display(), error = %e, "bio file unavailable, using default");
                format!("I am {}, a software developer.", name)
            }
        };
        Self::new(name, bio)
    }
}

/// Shared handles available to every node.
#[derive(Clone)]
pub struct AgentContext {
    pub index: Arc<CodeIndex>,
    pub host: Arc<dyn RepositoryHost>,
    pub articles: Arc<dyn ArticleStore>,
    pub llm: Arc<dyn LanguageModel>,
    pub persona: Persona,
}

impl AgentContext {
    /// Single-message completion; the agents send their whole prompt as one
    /// user turn.
    pub(crate) async fn complete(&self, prompt: String, temperature: f32) -> Result<String> {
        self.llm
            .generate(&[PromptMessage::user(prompt)], temperature)
            .await
    }
}

/// Result of running one node.
#[derive(Debug, Clone)]
pub struct Step {
    pub state: ConversationState,
    /// Set by the orchestrator only.
    pub decision: Option<RouteDecision>,
}

/// Run the node `kind` on `state`.
///
/// Only the response generator can fail; every other node absorbs its
/// errors into its output.
pub async fn run_node(kind: NodeKind, ctx: &AgentContext, state: &ConversationState) -> Result<Step> {
    match kind {
        NodeKind::Orchestrator => {
            let (state, decision) = orchestrator::run(ctx, state).await;
            Ok(Step {
                state,
                decision: Some(decision),
            })
        }
        NodeKind::RepoInvestigator => Ok(Step {
            state: repo_investigator::run(ctx, state).await,
            decision: None,
        }),
        NodeKind::BlogExplainer => Ok(Step {
            state: blog_explainer::run(ctx, state).await,
            decision: None,
        }),
        NodeKind::ResponseGenerator => Ok(Step {
            state: response_generator::run(ctx, state).await?,
            decision: None,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_persona_load_reads_bio() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bio.md");
        std::fs::write(&path, "I build compilers.").unwrap();
        let persona = Persona::load("Ada", &path);
        assert_eq!(persona.bio, "I build compilers.");
    }

    #[test]
    fn test_persona_load_falls_back() {
        let persona = Persona::load("Ada", Path::new("/no/such/bio.md"));
        assert_eq!(persona.bio, "I am Ada, a software developer.");
    }
}
