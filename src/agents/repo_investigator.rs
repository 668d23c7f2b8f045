//! Questions about repositories and code.
//!
//! Gathers context from the code index and the repository host, then asks
//! the model for an answer grounded in that context. When the question names
//! an indexed project the search is scoped to it; otherwise the node surveys
//! every repository.

use regex::Regex;
use std::sync::OnceLock;
use tracing::warn;

use folio_chat_core::routing::{extract_project_name, ConversationState, Route};

use super::{AgentContext, CONTEXT_SEPARATOR};
use crate::tools::repo;

const TEMPERATURE: f32 = 0.3;
const PROJECT_SEARCH_LIMIT: usize = 10;
const GLOBAL_SEARCH_LIMIT: usize = 8;

fn file_mention_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"[\w./-]*\w\.[A-Za-z]{1,10}\b").expect("file pattern is valid")
    })
}

/// Collect retrieval context for `question`.
pub async fn gather_context(ctx: &AgentContext, question: &str) -> String {
    let projects = ctx.index.stats().await.projects;
    let mut sections = Vec::new();

    match extract_project_name(question, &projects) {
        Some(project) => {
            sections.push(format!("**Searching in project: {}**\n", project));

            match repo::get_project_files(&ctx.index, &project, None).await {
                Ok(files) => sections.push(format!("**Files in {}:**\n{}", project, files)),
                Err(e) => sections.push(format!("Error getting project files: {}", e)),
            }

            match repo::search_in_project(&ctx.index, &project, question, PROJECT_SEARCH_LIMIT).await {
                Ok(hits) => sections.push(format!(
                    "**Code Search Results in {}:**\n{}",
                    project, hits
                )),
                Err(e) => sections.push(format!("Error searching code: {}", e)),
            }

            // A file named outright is worth reading in full.
            let mentions: Vec<String> = file_mention_pattern()
                .find_iter(question)
                .map(|m| m.as_str().to_string())
                .collect();
            for mention in &mentions {
                if ctx.index.find_file(&project, mention).await.is_some() {
                    match repo::get_file_content(&ctx.index, &project, mention).await {
                        Ok(content) => sections.push(format!("**Requested File:**\n{}", content)),
                        Err(e) => sections.push(format!("Error reading file: {}", e)),
                    }
                    break;
                }
            }
        }
        None => {
            match repo::get_repository_info(ctx.host.as_ref()).await {
                Ok(info) => sections.push(format!("**GitHub Repositories:**\n{}", info)),
                Err(e) => sections.push(format!("Error fetching repository info: {}", e)),
            }

            match repo::list_projects(&ctx.index).await {
                Ok(listing) => sections.push(format!("**Indexed Projects:**\n{}", listing)),
                Err(e) => sections.push(format!("Error listing projects: {}", e)),
            }

            match repo::search_code(&ctx.index, question, None, None, GLOBAL_SEARCH_LIMIT).await {
                Ok(hits) => sections.push(format!("**Relevant Code Search Results:**\n{}", hits)),
                Err(e) => sections.push(format!("Error searching code: {}", e)),
            }
        }
    }

    sections.join(CONTEXT_SEPARATOR)
}

fn answer_prompt(persona_name: &str, context: &str, question: &str) -> String {
    format!(
        "You are answering questions about {name}'s GitHub repositories and code.

Here is the information gathered from the repositories:

{context}

---

User's question: {question}

IMPORTANT INSTRUCTIONS:
- Answer based ONLY on the actual code and file contents shown above
- If code snippets are provided, analyze them to answer the question
- Reference specific files, functions, classes, and line numbers when relevant
- If the user asks about implementation details, look at the code to find how it's actually implemented
- Include relevant code snippets in your answer
- If you don't have enough code context to answer, say so and suggest which files might contain the answer
- Do NOT make up information that isn't in the provided context",
        name = persona_name,
        context = context,
        question = question
    )
}

/// Gather context, synthesize an answer, and hand off to the response
/// generator. Never fails.
pub async fn run(ctx: &AgentContext, state: &ConversationState) -> ConversationState {
    let Some(question) = state.last_user_message() else {
        return state.advance(
            Route::ResponseGenerator,
            Some("I couldn't understand your question about repositories.".to_string()),
        );
    };

    let context = gather_context(ctx, question).await;
    let output = match ctx
        .complete(answer_prompt(&ctx.persona.name, &context, question), TEMPERATURE)
        .await
    {
        Ok(answer) if !answer.trim().is_empty() => answer,
        Ok(_) => "I couldn't find specific repository information.".to_string(),
        Err(e) => {
            warn!(error = %e, "repository answer synthesis failed");
            "Sorry, I ran into a problem while looking through the repositories.".to_string()
        }
    };

    state.advance(Route::ResponseGenerator, Some(output))
}
