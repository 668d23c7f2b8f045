//! Intent classification.

use tracing::{debug, warn};

use folio_chat_core::routing::{parse_route, ConversationState, RouteDecision};

use super::AgentContext;

const TEMPERATURE: f32 = 0.0;

fn routing_prompt(persona_name: &str, message: &str) -> String {
    format!(
        r#"You are an intelligent router for {name}'s personal website chatbot.
Your job is to analyze the user's message and determine which specialized agent should handle it.

Available agents:
1. REPO_INVESTIGATOR - For questions about:
   - GitHub repositories and code
   - Programming projects
   - Technical implementations
   - Code examples and explanations
   - Project structure and files

2. BLOG_EXPLAINER - For questions about:
   - Blog posts and articles
   - Written content on the website
   - Topics covered in articles
   - Technical tutorials in blog format

3. RESPONSE_GENERATOR - For questions about:
   - Personal information about {name}
   - General greetings and small talk
   - Who {name} is, background, skills
   - Contact information
   - Questions that don't fit other categories

Analyze the user's message and respond with ONLY ONE of these exact words:
- REPO_INVESTIGATOR
- BLOG_EXPLAINER
- RESPONSE_GENERATOR

User message: {message}

Your routing decision (respond with only the agent name):"#,
        name = persona_name,
        message = message
    )
}

/// Classify the last user message.
pub async fn classify(ctx: &AgentContext, state: &ConversationState) -> RouteDecision {
    let Some(message) = state.last_user_message() else {
        return RouteDecision::ParseFailed {
            reason: "no user message to classify".to_string(),
        };
    };

    match ctx
        .complete(routing_prompt(&ctx.persona.name, message), TEMPERATURE)
        .await
    {
        Ok(answer) => parse_route(&answer),
        Err(e) => RouteDecision::ParseFailed {
            reason: format!("classifier call failed: {}", e),
        },
    }
}

/// Classify and set the route for the next hop.
pub async fn run(ctx: &AgentContext, state: &ConversationState) -> (ConversationState, RouteDecision) {
    let decision = classify(ctx, state).await;
    match &decision {
        RouteDecision::Parsed(route) => debug!(?route, "orchestrator routed message"),
        RouteDecision::ParseFailed { reason } => {
            warn!(%reason, "routing failed, answering directly")
        }
    }
    (state.advance(decision.route(), None), decision)
}
