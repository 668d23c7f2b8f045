//! Remote repository host access.
//!
//! The [`RepositoryHost`] trait is what ingestion and the repo agent need
//! from a code host: the owner's repositories, a branch's file tree, a file's
//! decoded content, and a browse URL. [`GitHubClient`] implements it over the
//! GitHub REST v3 API.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use folio_chat_core::filter::should_index_path;

use crate::config::GitHubConfig;
use crate::http::client_with_timeout;

/// Repository metadata as listed by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub name: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "html_url")]
    pub url: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default = "default_branch")]
    pub default_branch: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub fork: bool,
}

fn default_branch() -> String {
    "main".to_string()
}

/// One indexable entry of a branch tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoFile {
    pub path: String,
    pub size: Option<u64>,
}

/// Files of a repository at the branch that was actually resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTree {
    pub branch: String,
    pub files: Vec<RepoFile>,
}

#[async_trait]
pub trait RepositoryHost: Send + Sync {
    /// Public, non-fork repositories of the configured owner.
    async fn list_repositories(&self) -> Result<Vec<Repository>>;

    /// Indexable files of `repo` at `branch`.
    async fn list_files(&self, repo: &str, branch: &str) -> Result<FileTree>;

    /// Decoded UTF-8 content of a file, `None` when it cannot be fetched or
    /// is not text.
    async fn fetch_file_content(&self, repo: &str, path: &str) -> Result<Option<String>>;

    /// Human-facing URL of a file.
    fn browse_url(&self, repo: &str, branch: &str, path: &str) -> String;
}

/// GitHub REST v3 client for a single owner.
pub struct GitHubClient {
    client: Client,
    api_url: String,
    owner: String,
    token: Option<String>,
    primary_branch: String,
    fallback_branch: String,
}

impl GitHubClient {
    /// Build from config. The token is read from the `token_env` variable when
    /// it is set; unauthenticated access works with lower rate limits.
    pub fn new(config: &GitHubConfig) -> Result<Self> {
        let token = std::env::var(&config.token_env)
            .ok()
            .filter(|t| !t.trim().is_empty());
        Self::with_token(config, token)
    }

    pub fn with_token(config: &GitHubConfig, token: Option<String>) -> Result<Self> {
        Ok(Self {
            client: client_with_timeout(config.timeout_secs)?,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            owner: config.owner.clone(),
            token,
            primary_branch: config.primary_branch.clone(),
            fallback_branch: config.fallback_branch.clone(),
        })
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        let request = self
            .client
            .get(url)
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", "folio-chat");
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn fetch_tree(&self, repo: &str, branch: &str) -> Result<Vec<RepoFile>> {
        let url = format!(
            "{}/repos/{}/{}/git/trees/{}?recursive=1",
            self.api_url, self.owner, repo, branch
        );
        let response = self
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch tree for {}@{}", repo, branch))?;

        let status = response.status();
        if !status.is_success() {
            bail!("GitHub tree request for {}@{} failed: {}", repo, branch, status);
        }

        let tree: TreeResponse = response.json().await?;
        if tree.truncated {
            warn!(repo, branch, "GitHub tree listing was truncated");
        }

        Ok(tree
            .tree
            .into_iter()
            .filter(|entry| entry.kind == "blob" && should_index_path(&entry.path))
            .map(|entry| RepoFile {
                path: entry.path,
                size: entry.size,
            })
            .collect())
    }
}

#[derive(Deserialize)]
struct TreeResponse {
    #[serde(default)]
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    size: Option<u64>,
}

#[derive(Deserialize)]
struct ContentResponse {
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: String,
}

/// Decode a contents-API payload. GitHub wraps base64 at 60 columns.
fn decode_content(payload: &ContentResponse) -> Option<String> {
    if payload.encoding != "base64" {
        return None;
    }
    let compact: String = payload
        .content
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(compact)
        .ok()?;
    String::from_utf8(bytes).ok()
}

#[async_trait]
impl RepositoryHost for GitHubClient {
    async fn list_repositories(&self) -> Result<Vec<Repository>> {
        if self.owner.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!(
            "{}/users/{}/repos?type=public&sort=updated&per_page=100",
            self.api_url, self.owner
        );
        let response = self
            .get(&url)
            .send()
            .await
            .context("Failed to list GitHub repositories")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("GitHub repository listing failed {}: {}", status, body);
        }

        let repos: Vec<Repository> = response.json().await?;
        Ok(repos.into_iter().filter(|r| !r.fork).collect())
    }

    async fn list_files(&self, repo: &str, branch: &str) -> Result<FileTree> {
        match self.fetch_tree(repo, branch).await {
            Ok(files) => Ok(FileTree {
                branch: branch.to_string(),
                files,
            }),
            Err(e) if branch == self.primary_branch && self.fallback_branch != branch => {
                debug!(repo, error = %e, fallback = %self.fallback_branch, "retrying with fallback branch");
                let files = self.fetch_tree(repo, &self.fallback_branch).await?;
                Ok(FileTree {
                    branch: self.fallback_branch.clone(),
                    files,
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn fetch_file_content(&self, repo: &str, path: &str) -> Result<Option<String>> {
        let url = format!(
            "{}/repos/{}/{}/contents/{}",
            self.api_url, self.owner, repo, path
        );
        let response = self
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}/{}", repo, path))?;

        if !response.status().is_success() {
            debug!(repo, path, status = %response.status(), "file content unavailable");
            return Ok(None);
        }

        let payload: ContentResponse = match response.json().await {
            Ok(payload) => payload,
            Err(_) => return Ok(None),
        };
        Ok(decode_content(&payload))
    }

    fn browse_url(&self, repo: &str, branch: &str, path: &str) -> String {
        format!(
            "https://github.com/{}/{}/blob/{}/{}",
            self.owner, repo, branch, path
        )
    }
}
