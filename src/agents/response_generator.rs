//! The persona's final reply.
//!
//! Speaks in the first person as the site owner, folding in the bio, any
//! specialist output left in the state's scratch, and the prior
//! conversation. Provider errors propagate: this is the one node whose
//! failure the caller sees.

use anyhow::Result;
use futures::StreamExt;

use folio_chat_core::models::{ChatMessage, Role};
use folio_chat_core::routing::{ConversationState, Route};

use super::AgentContext;
use crate::llm::{PromptMessage, TextStream};

const TEMPERATURE: f32 = 0.7;
const DEFAULT_MESSAGE: &str = "Hello";

/// `Previous conversation:` block for the prompt, empty when there is none.
fn format_history(prior: &[ChatMessage], persona_name: &str) -> String {
    if prior.is_empty() {
        return String::new();
    }
    let mut lines = vec!["Previous conversation:".to_string()];
    for message in prior {
        let speaker = match message.role {
            Role::User => "User",
            Role::Assistant => persona_name,
        };
        lines.push(format!("{}: {}", speaker, message.content));
    }
    lines.join("\n")
}

/// Build the full reply prompt for `state`.
pub fn build_prompt(ctx: &AgentContext, state: &ConversationState) -> Vec<PromptMessage> {
    let name = &ctx.persona.name;
    let user_message = state.last_user_message().unwrap_or(DEFAULT_MESSAGE);

    let agent_context = if state.scratch().is_empty() {
        String::new()
    } else {
        format!(
            "\nContext from analysis (incorporate this naturally in your response):\n{}\n",
            state.scratch()
        )
    };
    let conversation = format_history(state.prior_turns(), name);

    let prompt = format!(
        "You are {name} responding to visitors on your personal portfolio/blog website.
Speak in FIRST PERSON as {name}. Be friendly, helpful, and professional.

Here is information about you:
{bio}

Guidelines:
- Always speak as \"I\" (first person)
- Be friendly and approachable
- If you have context from other agents about repos or blog posts, incorporate that naturally
- For general questions about yourself, use the bio information
- Be honest if you don't know something
- Keep responses conversational but informative
- You can use markdown formatting for better readability
- Pay attention to the conversation history to maintain context

{agent_context}

{conversation}

Current user message: {user_message}

Respond as {name}:",
        name = name,
        bio = ctx.persona.bio,
        agent_context = agent_context,
        conversation = conversation,
        user_message = user_message
    );

    vec![PromptMessage::user(prompt)]
}

/// Generate the reply and end the graph.
pub async fn run(ctx: &AgentContext, state: &ConversationState) -> Result<ConversationState> {
    let reply = ctx.llm.generate(&build_prompt(ctx, state), TEMPERATURE).await?;
    Ok(state.advance(Route::End, Some(reply)))
}

/// Stream the reply. Empty chunks are dropped.
pub async fn stream(ctx: &AgentContext, state: &ConversationState) -> Result<TextStream> {
    let chunks = ctx.llm.stream(&build_prompt(ctx, state), TEMPERATURE).await?;
    Ok(Box::pin(chunks.filter(|chunk| {
        let keep = !matches!(chunk, Ok(text) if text.is_empty());
        futures::future::ready(keep)
    })))
}
