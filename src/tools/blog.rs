//! Article-store tools.

use anyhow::Result;

use super::{join_or_none, truncate_chars};
use crate::articles::{Article, ArticleStore};

fn summary(article: &Article, max_chars: usize, mark_cut: bool) -> String {
    if article.summary.is_empty() {
        return "No summary".to_string();
    }
    let (head, truncated) = truncate_chars(&article.summary, max_chars);
    if truncated && mark_cut {
        format!("{}...", head)
    } else {
        head.to_string()
    }
}

fn created(article: &Article) -> String {
    article.created_at.format("%Y-%m-%d").to_string()
}

pub async fn get_all_articles(store: &dyn ArticleStore) -> Result<String> {
    let articles = store.list_all().await?;
    if articles.is_empty() {
        return Ok("No blog articles found.".to_string());
    }

    let mut sections = vec![format!("**Blog Articles** ({} total)\n", articles.len())];
    for article in &articles {
        sections.push(format!(
            "### {}\n- Slug: {}\n- Tags: {}\n- Summary: {}\n- Created: {}\n",
            article.title,
            article.slug,
            join_or_none(&article.tags),
            summary(article, 200, true),
            created(article)
        ));
    }
    Ok(sections.join("\n"))
}

pub async fn get_article_content(store: &dyn ArticleStore, slug: &str) -> Result<String> {
    let Some(article) = store.by_slug(slug).await? else {
        return Ok(format!("Article with slug '{}' not found.", slug));
    };
    Ok(format!(
        "# {}\n\n**Tags:** {}\n**Created:** {}\n\n## Summary\n{}\n\n## Content\n{}",
        article.title,
        join_or_none(&article.tags),
        created(&article),
        article.summary,
        article.content
    ))
}

pub async fn search_articles(
    store: &dyn ArticleStore,
    query: &str,
    tags: &[String],
) -> Result<String> {
    let articles = store.search(query, tags).await?;
    if articles.is_empty() {
        let mut description = format!("query='{}'", query);
        if !tags.is_empty() {
            description.push_str(&format!(", tags={:?}", tags));
        }
        return Ok(format!("No articles found matching {}.", description));
    }

    let mut sections = vec![format!(
        "**Search Results** ({} articles found)\n",
        articles.len()
    )];
    for article in &articles {
        sections.push(format!(
            "### {}\n- Slug: {}\n- Tags: {}\n- Summary: {}\n",
            article.title,
            article.slug,
            join_or_none(&article.tags),
            summary(article, 150, true)
        ));
    }
    Ok(sections.join("\n"))
}

pub async fn get_recent_articles(store: &dyn ArticleStore, count: usize) -> Result<String> {
    let articles = store.recent(count).await?;
    if articles.is_empty() {
        return Ok("No recent articles found.".to_string());
    }

    let mut sections = vec![format!("**Recent Articles** (latest {})\n", articles.len())];
    for article in &articles {
        sections.push(format!(
            "### {}\n- Slug: {}\n- Tags: {}\n- Created: {}\n- Summary: {}\n",
            article.title,
            article.slug,
            join_or_none(&article.tags),
            created(article),
            summary(article, 150, true)
        ));
    }
    Ok(sections.join("\n"))
}

pub async fn get_articles_by_tag(store: &dyn ArticleStore, tag: &str) -> Result<String> {
    let articles = store.by_tag(tag).await?;
    if articles.is_empty() {
        return Ok(format!("No articles found with tag '{}'.", tag));
    }

    let mut sections = vec![format!(
        "**Articles tagged '{}'** ({} articles)\n",
        tag,
        articles.len()
    )];
    for article in &articles {
        sections.push(format!(
            "### {}\n- Slug: {}\n- Tags: {}\n- Summary: {}\n",
            article.title,
            article.slug,
            join_or_none(&article.tags),
            summary(article, 150, false)
        ));
    }
    Ok(sections.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn article(summary_text: &str) -> Article {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        Article {
            id: "1".to_string(),
            title: "Vector Search".to_string(),
            slug: "vector-search".to_string(),
            summary: summary_text.to_string(),
            content: "body".to_string(),
            tags: vec![],
            published: true,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn test_summary_truncation() {
        let long = "s".repeat(210);
        assert_eq!(summary(&article(&long), 200, true).len(), 203);
        assert_eq!(summary(&article(&long), 150, false).len(), 150);
        assert_eq!(summary(&article(""), 150, true), "No summary");
        assert_eq!(summary(&article("short"), 150, true), "short");
    }

    #[test]
    fn test_created_is_date_only() {
        assert_eq!(created(&article("x")), "2024-05-01");
    }
}
