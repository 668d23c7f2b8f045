//! Blog article storage.
//!
//! The blog agent only reads articles. [`ArticleStore`] is that read
//! surface; [`SqliteArticleStore`] backs it with a single SQLite table and
//! adds the schema setup and JSON import used by the CLI.
//!
//! Every query returns published articles only, newest first.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;
use uuid::Uuid;

/// Maximum articles returned by [`ArticleStore::list_all`].
pub const LIST_LIMIT: usize = 100;
/// Maximum articles returned by [`ArticleStore::search`].
pub const SEARCH_LIMIT: usize = 20;
/// Maximum articles returned by [`ArticleStore::by_tag`].
pub const TAG_LIMIT: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub summary: String,
    pub content: String,
    pub tags: Vec<String>,
    pub published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait ArticleStore: Send + Sync {
    async fn list_all(&self) -> Result<Vec<Article>>;

    /// Case-insensitive substring match over title, summary and content.
    /// When `tags` is non-empty an article must carry at least one of them.
    async fn search(&self, query: &str, tags: &[String]) -> Result<Vec<Article>>;

    async fn by_tag(&self, tag: &str) -> Result<Vec<Article>>;

    async fn recent(&self, limit: usize) -> Result<Vec<Article>>;

    async fn by_slug(&self, slug: &str) -> Result<Option<Article>>;
}

/// Whether an article matches a lowercase query.
pub fn matches_query(article: &Article, query_lower: &str) -> bool {
    article.title.to_lowercase().contains(query_lower)
        || article.summary.to_lowercase().contains(query_lower)
        || article.content.to_lowercase().contains(query_lower)
}

/// Whether an article carries any of `tags` (always true for no tags).
pub fn has_any_tag(article: &Article, tags: &[String]) -> bool {
    tags.is_empty() || article.tags.iter().any(|t| tags.contains(t))
}

/// An article as accepted by `folio articles import`.
#[derive(Debug, Deserialize)]
struct ImportedArticle {
    #[serde(default)]
    id: Option<String>,
    title: String,
    slug: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default = "default_published")]
    published: bool,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

fn default_published() -> bool {
    true
}

pub struct SqliteArticleStore {
    pool: SqlitePool,
}

impl SqliteArticleStore {
    /// Open (creating if missing) the database at `path`.
    pub async fn connect(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create articles directory: {}", parent.display())
            })?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open articles database: {}", path.display()))?;

        Ok(Self { pool })
    }

    /// Create the articles table if it does not exist.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS articles (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                slug TEXT NOT NULL UNIQUE,
                summary TEXT NOT NULL DEFAULT '',
                content TEXT NOT NULL DEFAULT '',
                tags_json TEXT NOT NULL DEFAULT '[]',
                published INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_articles_published_created ON articles(published, created_at)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert an article, replacing any existing one with the same slug.
    pub async fn upsert(&self, article: &Article) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO articles (id, title, slug, summary, content, tags_json, published, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(slug) DO UPDATE SET
                title = excluded.title,
                summary = excluded.summary,
                content = excluded.content,
                tags_json = excluded.tags_json,
                published = excluded.published,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&article.id)
        .bind(&article.title)
        .bind(&article.slug)
        .bind(&article.summary)
        .bind(&article.content)
        .bind(serde_json::to_string(&article.tags)?)
        .bind(article.published)
        .bind(article.created_at.timestamp())
        .bind(article.updated_at.timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Import a JSON array of articles. Returns how many were written.
    pub async fn import_json(&self, json: &str) -> Result<usize> {
        let imported: Vec<ImportedArticle> =
            serde_json::from_str(json).context("Failed to parse article JSON")?;
        let now = Utc::now();

        for item in &imported {
            let created_at = item.created_at.unwrap_or(now);
            let article = Article {
                id: item
                    .id
                    .clone()
                    .unwrap_or_else(|| Uuid::new_v4().to_string()),
                title: item.title.clone(),
                slug: item.slug.clone(),
                summary: item.summary.clone(),
                content: item.content.clone(),
                tags: item.tags.clone(),
                published: item.published,
                created_at,
                updated_at: item.updated_at.unwrap_or(created_at),
            };
            self.upsert(&article).await?;
        }

        Ok(imported.len())
    }

    async fn published(&self, limit: Option<usize>) -> Result<Vec<Article>> {
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let rows = sqlx::query(
            r#"
            SELECT id, title, slug, summary, content, tags_json, published, created_at, updated_at
            FROM articles
            WHERE published = 1
            ORDER BY created_at DESC, slug ASC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_article).collect()
    }
}

fn row_to_article(row: &sqlx::sqlite::SqliteRow) -> Result<Article> {
    let tags_json: String = row.get("tags_json");
    let created_at: i64 = row.get("created_at");
    let updated_at: i64 = row.get("updated_at");

    Ok(Article {
        id: row.get("id"),
        title: row.get("title"),
        slug: row.get("slug"),
        summary: row.get("summary"),
        content: row.get("content"),
        tags: serde_json::from_str(&tags_json).context("Invalid tags_json column")?,
        published: row.get("published"),
        created_at: DateTime::from_timestamp(created_at, 0).unwrap_or_default(),
        updated_at: DateTime::from_timestamp(updated_at, 0).unwrap_or_default(),
    })
}

#[async_trait]
impl ArticleStore for SqliteArticleStore {
    async fn list_all(&self) -> Result<Vec<Article>> {
        self.published(Some(LIST_LIMIT)).await
    }

    async fn search(&self, query: &str, tags: &[String]) -> Result<Vec<Article>> {
        let query = query.to_lowercase();
        Ok(self
            .published(None)
            .await?
            .into_iter()
            .filter(|a| matches_query(a, &query) && has_any_tag(a, tags))
            .take(SEARCH_LIMIT)
            .collect())
    }

    async fn by_tag(&self, tag: &str) -> Result<Vec<Article>> {
        Ok(self
            .published(None)
            .await?
            .into_iter()
            .filter(|a| a.tags.iter().any(|t| t == tag))
            .take(TAG_LIMIT)
            .collect())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<Article>> {
        self.published(Some(limit)).await
    }

    async fn by_slug(&self, slug: &str) -> Result<Option<Article>> {
        let row = sqlx::query(
            r#"
            SELECT id, title, slug, summary, content, tags_json, published, created_at, updated_at
            FROM articles
            WHERE slug = ? AND published = 1
            "#,
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_article).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn store_with_fixtures(tmp: &TempDir) -> SqliteArticleStore {
        let store = SqliteArticleStore::connect(&tmp.path().join("articles.sqlite"))
            .await
            .unwrap();
        store.migrate().await.unwrap();
        let count = store
            .import_json(
                r#"[
                {"title": "Async Rust", "slug": "async-rust", "summary": "Futures explained",
                 "content": "Pinning and wakers.", "tags": ["rust"], "created_at": "2024-03-01T00:00:00Z"},
                {"title": "Vector Search", "slug": "vector-search", "summary": "FAISS notes",
                 "content": "Inner product on normalized vectors.", "tags": ["ml", "search"],
                 "created_at": "2024-05-01T00:00:00Z"},
                {"title": "Draft", "slug": "draft", "content": "rust secrets", "tags": ["rust"],
                 "published": false, "created_at": "2024-06-01T00:00:00Z"}
            ]"#,
            )
            .await
            .unwrap();
        assert_eq!(count, 3);
        store
    }

    #[tokio::test]
    async fn test_list_all_is_published_newest_first() {
        let tmp = TempDir::new().unwrap();
        let store = store_with_fixtures(&tmp).await;
        let slugs: Vec<String> = store
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.slug)
            .collect();
        assert_eq!(slugs, vec!["vector-search", "async-rust"]);
    }

    #[tokio::test]
    async fn test_search_is_case_insensitive_and_tag_filtered() {
        let tmp = TempDir::new().unwrap();
        let store = store_with_fixtures(&tmp).await;

        let hits = store.search("PINNING", &[]).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].slug, "async-rust");

        let hits = store.search("rust", &[]).await.unwrap();
        assert!(hits.iter().all(|a| a.published));

        let hits = store.search("n", &["search".to_string()]).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].slug, "vector-search");
    }

    #[tokio::test]
    async fn test_recent_by_tag_and_slug() {
        let tmp = TempDir::new().unwrap();
        let store = store_with_fixtures(&tmp).await;

        assert_eq!(store.recent(1).await.unwrap()[0].slug, "vector-search");
        assert_eq!(store.by_tag("rust").await.unwrap().len(), 1);
        assert!(store.by_slug("draft").await.unwrap().is_none());
        let article = store.by_slug("async-rust").await.unwrap().unwrap();
        assert_eq!(article.tags, vec!["rust"]);
        assert_eq!(article.created_at.format("%Y-%m-%d").to_string(), "2024-03-01");
    }

    #[tokio::test]
    async fn test_import_upserts_by_slug() {
        let tmp = TempDir::new().unwrap();
        let store = store_with_fixtures(&tmp).await;
        store
            .import_json(r#"[{"title": "Async Rust, revised", "slug": "async-rust", "created_at": "2024-03-01T00:00:00Z"}]"#)
            .await
            .unwrap();
        let article = store.by_slug("async-rust").await.unwrap().unwrap();
        assert_eq!(article.title, "Async Rust, revised");
        assert_eq!(store.list_all().await.unwrap().len(), 2);
    }
}
