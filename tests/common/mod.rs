//! In-memory fakes for the trait seams of the chat graph.
#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use folio_chat::agents::{AgentContext, Persona};
use folio_chat::articles::{has_any_tag, matches_query, Article, ArticleStore};
use folio_chat::embedding::Embedder;
use folio_chat::github::{FileTree, RepoFile, Repository, RepositoryHost};
use folio_chat::graph::ChatGraph;
use folio_chat::llm::{LanguageModel, PromptMessage, TextStream};
use folio_chat::models::IndexedDocument;
use folio_chat::store::CodeIndex;

pub const DIMS: usize = 16;

// ============ Embedder ============

/// Bag-of-words hashing embedder: texts sharing words score high.
pub struct FakeEmbedder {
    pub fail: AtomicBool,
    pub calls: AtomicUsize,
}

impl FakeEmbedder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            fail: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    fn model_name(&self) -> &str {
        "fake"
    }
    fn dims(&self) -> usize {
        DIMS
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            bail!("embedding service unavailable");
        }
        Ok(texts
            .iter()
            .map(|text| {
                let mut v = vec![0.0; DIMS];
                for word in text
                    .to_lowercase()
                    .split(|c: char| !c.is_alphanumeric())
                    .filter(|w| !w.is_empty())
                {
                    let h = word
                        .bytes()
                        .fold(7usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize));
                    v[h % DIMS] += 1.0;
                }
                v
            })
            .collect())
    }
}

// ============ Language model ============

/// Which stage of the graph a prompt belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    Router,
    Specialist,
    Reply,
}

pub fn prompt_kind(prompt: &str) -> PromptKind {
    if prompt.contains("Your routing decision") {
        PromptKind::Router
    } else if prompt.contains("You are answering questions about") {
        PromptKind::Specialist
    } else {
        PromptKind::Reply
    }
}

/// A model that answers each stage with a fixed script and records every
/// prompt it receives.
pub struct ScriptedModel {
    pub route_label: String,
    pub specialist_answer: String,
    pub reply: String,
    pub stream_chunks: Vec<String>,
    pub fail_router: bool,
    pub fail_specialist: bool,
    pub fail_reply: bool,
    pub calls: Mutex<Vec<(PromptKind, String, f32)>>,
}

impl ScriptedModel {
    pub fn routing_to(label: &str) -> Self {
        Self {
            route_label: label.to_string(),
            specialist_answer: "SPECIALIST ANSWER".to_string(),
            reply: "Final reply".to_string(),
            stream_chunks: vec!["Hel".to_string(), String::new(), "lo".to_string()],
            fail_router: false,
            fail_specialist: false,
            fail_reply: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self, kind: PromptKind) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _, _)| *k == kind)
            .map(|(_, p, _)| p.clone())
            .collect()
    }

    pub fn temperatures(&self) -> Vec<(PromptKind, f32)> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(k, _, t)| (*k, *t))
            .collect()
    }

    fn record(&self, messages: &[PromptMessage], temperature: f32) -> PromptKind {
        let prompt = messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let kind = prompt_kind(&prompt);
        self.calls.lock().unwrap().push((kind, prompt, temperature));
        kind
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn generate(&self, messages: &[PromptMessage], temperature: f32) -> Result<String> {
        match self.record(messages, temperature) {
            PromptKind::Router if self.fail_router => bail!("router model down"),
            PromptKind::Router => Ok(self.route_label.clone()),
            PromptKind::Specialist if self.fail_specialist => bail!("specialist model down"),
            PromptKind::Specialist => Ok(self.specialist_answer.clone()),
            PromptKind::Reply if self.fail_reply => bail!("reply model down"),
            PromptKind::Reply => Ok(self.reply.clone()),
        }
    }

    async fn stream(&self, messages: &[PromptMessage], temperature: f32) -> Result<TextStream> {
        self.record(messages, temperature);
        if self.fail_reply {
            bail!("reply model down");
        }
        let chunks: Vec<Result<String>> = self.stream_chunks.iter().cloned().map(Ok).collect();
        Ok(Box::pin(futures::stream::iter(chunks)))
    }
}

// ============ Repository host ============

#[derive(Default)]
pub struct FakeHost {
    pub repos: Vec<Repository>,
    pub files: HashMap<String, Vec<(String, String)>>,
    pub broken: HashSet<String>,
    pub list_calls: AtomicUsize,
}

pub fn repository(name: &str) -> Repository {
    Repository {
        name: name.to_string(),
        full_name: format!("ada/{}", name),
        description: Some(format!("The {} project", name)),
        url: format!("https://github.com/ada/{}", name),
        language: Some("Rust".to_string()),
        default_branch: "main".to_string(),
        topics: vec![],
        fork: false,
    }
}

impl FakeHost {
    pub fn with_repo(mut self, name: &str, files: &[(&str, &str)]) -> Self {
        self.repos.push(repository(name));
        self.files.insert(
            name.to_string(),
            files
                .iter()
                .map(|(p, c)| (p.to_string(), c.to_string()))
                .collect(),
        );
        self
    }

    pub fn with_broken_repo(mut self, name: &str) -> Self {
        self.repos.push(repository(name));
        self.broken.insert(name.to_string());
        self
    }
}

#[async_trait]
impl RepositoryHost for FakeHost {
    async fn list_repositories(&self) -> Result<Vec<Repository>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.repos.clone())
    }

    async fn list_files(&self, repo: &str, branch: &str) -> Result<FileTree> {
        if self.broken.contains(repo) {
            bail!("tree for {} unavailable", repo);
        }
        let files = self
            .files
            .get(repo)
            .map(|files| {
                files
                    .iter()
                    .map(|(path, _)| RepoFile {
                        path: path.clone(),
                        size: None,
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(FileTree {
            branch: branch.to_string(),
            files,
        })
    }

    async fn fetch_file_content(&self, repo: &str, path: &str) -> Result<Option<String>> {
        Ok(self
            .files
            .get(repo)
            .and_then(|files| files.iter().find(|(p, _)| p == path))
            .map(|(_, content)| content.clone()))
    }

    fn browse_url(&self, repo: &str, branch: &str, path: &str) -> String {
        format!("https://github.com/ada/{}/blob/{}/{}", repo, branch, path)
    }
}

// ============ Articles ============

#[derive(Default)]
pub struct MemoryArticles {
    pub articles: Vec<Article>,
}

impl MemoryArticles {
    fn published(&self) -> Vec<Article> {
        let mut published: Vec<Article> =
            self.articles.iter().filter(|a| a.published).cloned().collect();
        published.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        published
    }
}

#[async_trait]
impl ArticleStore for MemoryArticles {
    async fn list_all(&self) -> Result<Vec<Article>> {
        Ok(self.published().into_iter().take(100).collect())
    }

    async fn search(&self, query: &str, tags: &[String]) -> Result<Vec<Article>> {
        let query = query.to_lowercase();
        Ok(self
            .published()
            .into_iter()
            .filter(|a| matches_query(a, &query) && has_any_tag(a, tags))
            .take(20)
            .collect())
    }

    async fn by_tag(&self, tag: &str) -> Result<Vec<Article>> {
        Ok(self
            .published()
            .into_iter()
            .filter(|a| a.tags.iter().any(|t| t == tag))
            .collect())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<Article>> {
        Ok(self.published().into_iter().take(limit).collect())
    }

    async fn by_slug(&self, slug: &str) -> Result<Option<Article>> {
        Ok(self.published().into_iter().find(|a| a.slug == slug))
    }
}

pub struct FailingArticles;

#[async_trait]
impl ArticleStore for FailingArticles {
    async fn list_all(&self) -> Result<Vec<Article>> {
        bail!("database offline")
    }
    async fn search(&self, _query: &str, _tags: &[String]) -> Result<Vec<Article>> {
        bail!("database offline")
    }
    async fn by_tag(&self, _tag: &str) -> Result<Vec<Article>> {
        bail!("database offline")
    }
    async fn recent(&self, _limit: usize) -> Result<Vec<Article>> {
        bail!("database offline")
    }
    async fn by_slug(&self, _slug: &str) -> Result<Option<Article>> {
        bail!("database offline")
    }
}

pub fn article(slug: &str, title: &str, summary: &str, tags: &[&str], day: u32) -> Article {
    use chrono::TimeZone;
    let at = chrono::Utc
        .with_ymd_and_hms(2024, 1, day, 9, 0, 0)
        .unwrap();
    Article {
        id: slug.to_string(),
        title: title.to_string(),
        slug: slug.to_string(),
        summary: summary.to_string(),
        content: format!("Full text of {}", title),
        tags: tags.iter().map(|t| t.to_string()).collect(),
        published: true,
        created_at: at,
        updated_at: at,
    }
}

// ============ Wiring ============

pub fn document(project: &str, path: &str, content: &str) -> IndexedDocument {
    let (folder_path, file_name, file_type) = folio_chat_core::filter::split_path(path);
    IndexedDocument {
        content: content.to_string(),
        project_name: project.to_string(),
        folder_path,
        file_name,
        file_type,
        file_url: format!("https://github.com/ada/{}/blob/main/{}", project, path),
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub embedder: Arc<FakeEmbedder>,
    pub index: Arc<CodeIndex>,
    pub host: Arc<FakeHost>,
    pub model: Arc<ScriptedModel>,
    pub graph: ChatGraph,
}

pub fn harness(
    host: FakeHost,
    articles: Arc<dyn ArticleStore>,
    model: ScriptedModel,
) -> Harness {
    let dir = TempDir::new().unwrap();
    let embedder = FakeEmbedder::new();
    let index = Arc::new(CodeIndex::new(embedder.clone(), dir.path().join("index"), DIMS));
    let host = Arc::new(host);
    let model = Arc::new(model);
    let graph = ChatGraph::new(AgentContext {
        index: index.clone(),
        host: host.clone(),
        articles,
        llm: model.clone(),
        persona: Persona::new("Ada", "I write Rust and blog about search."),
    });
    Harness {
        dir,
        embedder,
        index,
        host,
        model,
        graph,
    }
}
