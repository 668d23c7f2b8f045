//! Questions about blog articles.

use std::collections::BTreeSet;
use tracing::warn;

use folio_chat_core::routing::{ConversationState, Route};

use super::{AgentContext, CONTEXT_SEPARATOR};
use crate::articles::Article;
use crate::tools::blog;

const TEMPERATURE: f32 = 0.3;
const RECENT_COUNT: usize = 5;

/// First article whose slug or title appears in the question.
fn mentioned_article<'a>(question_lower: &str, articles: &'a [Article]) -> Option<&'a Article> {
    articles.iter().find(|a| {
        question_lower.contains(&a.slug.to_lowercase())
            || (!a.title.is_empty() && question_lower.contains(&a.title.to_lowercase()))
    })
}

/// First known tag that appears as a whole word in the question.
fn mentioned_tag(question_lower: &str, articles: &[Article]) -> Option<String> {
    let words: BTreeSet<&str> = question_lower
        .split(|c: char| !(c.is_alphanumeric() || c == '-' || c == '_'))
        .filter(|w| !w.is_empty())
        .collect();
    articles
        .iter()
        .flat_map(|a| a.tags.iter())
        .find(|tag| words.contains(tag.to_lowercase().as_str()))
        .cloned()
}

/// Collect article context for `question`.
pub async fn gather_context(ctx: &AgentContext, question: &str) -> String {
    let store = ctx.articles.as_ref();
    let mut sections = Vec::new();

    match blog::get_all_articles(store).await {
        Ok(text) => sections.push(format!("**All Blog Articles:**\n{}", text)),
        Err(e) => sections.push(format!("Error fetching all articles: {}", e)),
    }

    match blog::get_recent_articles(store, RECENT_COUNT).await {
        Ok(text) => sections.push(format!("**Recent Articles:**\n{}", text)),
        Err(e) => sections.push(format!("Error fetching recent articles: {}", e)),
    }

    match blog::search_articles(store, question, &[]).await {
        Ok(text) => sections.push(format!("**Search Results:**\n{}", text)),
        Err(e) => sections.push(format!("Error searching articles: {}", e)),
    }

    // Pull in the full text of an article, or a tag listing, the question
    // refers to directly.
    if let Ok(articles) = store.list_all().await {
        let question_lower = question.to_lowercase();

        if let Some(article) = mentioned_article(&question_lower, &articles) {
            match blog::get_article_content(store, &article.slug).await {
                Ok(text) => sections.push(format!("**Article Content:**\n{}", text)),
                Err(e) => sections.push(format!("Error fetching article content: {}", e)),
            }
        }

        if let Some(tag) = mentioned_tag(&question_lower, &articles) {
            match blog::get_articles_by_tag(store, &tag).await {
                Ok(text) => sections.push(format!("**Articles by Tag:**\n{}", text)),
                Err(e) => sections.push(format!("Error fetching articles by tag: {}", e)),
            }
        }
    }

    sections.join(CONTEXT_SEPARATOR)
}

fn answer_prompt(persona_name: &str, context: &str, question: &str) -> String {
    format!(
        "You are answering questions about {name}'s blog articles.

Here is the information gathered from the blog:

{context}

---

User's question: {question}

Based on the above information, provide a detailed and accurate answer about the blog content.
- If asked about recent posts, mention the latest articles
- If asked about a specific topic, focus on relevant articles
- Include article titles, summaries, and tags when relevant
- If no articles match the query, say so honestly",
        name = persona_name,
        context = context,
        question = question
    )
}

/// Gather article context, synthesize an answer, and hand off to the
/// response generator. Never fails.
pub async fn run(ctx: &AgentContext, state: &ConversationState) -> ConversationState {
    let Some(question) = state.last_user_message() else {
        return state.advance(
            Route::ResponseGenerator,
            Some("I couldn't understand your question about the blog.".to_string()),
        );
    };

    let context = gather_context(ctx, question).await;
    let output = match ctx
        .complete(answer_prompt(&ctx.persona.name, &context, question), TEMPERATURE)
        .await
    {
        Ok(answer) if !answer.trim().is_empty() => answer,
        Ok(_) => "I couldn't find specific blog information.".to_string(),
        Err(e) => {
            warn!(error = %e, "blog answer synthesis failed");
            "Sorry, I ran into a problem while looking through the blog.".to_string()
        }
    };

    state.advance(Route::ResponseGenerator, Some(output))
}
