//! The persistent code index.
//!
//! [`CodeIndex`] pairs a [`FlatIndex`] of normalized embeddings with the
//! parallel list of [`IndexedDocument`]s they were computed from. Position
//! `i` in one is position `i` in the other.
//!
//! # On-disk layout
//!
//! ```text
//! <index.path>/
//! ├── index-<sha256 prefix>.bin   FlatIndex binary (FOLIOIDX header + LE f32 vectors)
//! └── documents.json              { version, dims, index_file, index_sha256, documents: [...] }
//! ```
//!
//! `documents.json` is the manifest: it names the vector file it belongs to
//! and records that file's SHA-256. A write puts the new vector file next to
//! the old one, then replaces the manifest through a `.tmp` sibling and a
//! rename. That rename is the commit point; until it lands the old manifest
//! still names the old vector file, so a failed or interrupted write leaves
//! the previous index loadable. Vector files no manifest names are removed
//! after a successful commit.
//!
//! # Commit rule
//!
//! Writes build the next state off to the side, persist it, and only then
//! swap it into memory. A failed embedding call or a failed write leaves both
//! memory and disk at the previous state.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use folio_chat_core::embedding::{l2_normalize, Embedder};
use folio_chat_core::index::FlatIndex;
use folio_chat_core::models::{IndexStats, IndexedDocument, SearchResult};

use crate::embedding::DisabledEmbedder;

const DOCUMENTS_FILE: &str = "documents.json";
const DOCUMENTS_VERSION: u32 = 2;
const INDEX_FILE_PREFIX: &str = "index-";
const INDEX_FILE_SUFFIX: &str = ".bin";

/// One distinct file of a project, as listed by [`CodeIndex::project_files`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectFile {
    pub path: String,
    pub file_type: String,
}

#[derive(Serialize, Deserialize)]
struct DocumentsFile {
    version: u32,
    dims: usize,
    index_file: String,
    index_sha256: String,
    documents: Vec<IndexedDocument>,
}

#[derive(Clone)]
struct IndexState {
    vectors: FlatIndex,
    documents: Vec<IndexedDocument>,
}

impl IndexState {
    fn empty(dims: usize) -> Self {
        Self {
            vectors: FlatIndex::new(dims),
            documents: Vec::new(),
        }
    }
}

struct Inner {
    initialized: bool,
    state: IndexState,
}

/// Embedding index over source files, persisted under one directory.
pub struct CodeIndex {
    embedder: Arc<dyn Embedder>,
    dir: PathBuf,
    dims: usize,
    overfetch: usize,
    inner: RwLock<Inner>,
}

impl CodeIndex {
    /// Create an index handle. Nothing is read from disk until
    /// [`initialize`](Self::initialize) (or the first operation) runs.
    pub fn new(embedder: Arc<dyn Embedder>, dir: impl Into<PathBuf>, dims: usize) -> Self {
        Self {
            embedder,
            dir: dir.into(),
            dims,
            overfetch: 10,
            inner: RwLock::new(Inner {
                initialized: false,
                state: IndexState::empty(dims),
            }),
        }
    }

    /// Open an index for inspection only. Statistics and file lookups work;
    /// anything that needs embeddings fails.
    pub fn read_only(dir: impl Into<PathBuf>, dims: usize) -> Self {
        Self::new(Arc::new(DisabledEmbedder), dir, dims)
    }

    /// Multiplier applied to `k` when retrieving candidates before filtering.
    pub fn with_overfetch(mut self, overfetch: usize) -> Self {
        self.overfetch = overfetch.max(1);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load the persisted index, or start empty when there is none.
    ///
    /// Only the first call does any work.
    pub async fn initialize(&self) {
        if self.inner.read().await.initialized {
            return;
        }
        let mut inner = self.inner.write().await;
        if inner.initialized {
            return;
        }

        match load_state(&self.dir, self.dims).await {
            Ok(Some(state)) => {
                info!(
                    documents = state.documents.len(),
                    dir = %self.dir.display(),
                    "loaded code index"
                );
                inner.state = state;
            }
            Ok(None) => {
                info!(dims = self.dims, dir = %self.dir.display(), "created new code index");
                inner.state = IndexState::empty(self.dims);
            }
            Err(e) => {
                warn!(error = %e, dir = %self.dir.display(), "could not load code index, starting empty");
                inner.state = IndexState::empty(self.dims);
            }
        }
        inner.initialized = true;
    }

    /// Embed and append a batch of documents.
    ///
    /// All documents are embedded in one provider call. Nothing changes unless
    /// embedding and persisting both succeed.
    pub async fn add_documents(&self, documents: Vec<IndexedDocument>) -> Result<()> {
        if documents.is_empty() {
            return Ok(());
        }
        self.initialize().await;

        let contents: Vec<String> = documents.iter().map(|d| d.content.clone()).collect();
        let mut vectors = self
            .embedder
            .embed(&contents)
            .await
            .context("Failed to embed documents")?;

        if vectors.len() != documents.len() {
            bail!(
                "embedding provider returned {} vectors for {} documents",
                vectors.len(),
                documents.len()
            );
        }
        for vector in &mut vectors {
            if vector.len() != self.dims {
                bail!(
                    "embedding has {} dimensions, index expects {}",
                    vector.len(),
                    self.dims
                );
            }
            l2_normalize(vector);
        }

        let mut inner = self.inner.write().await;
        let mut next = inner.state.clone();
        next.vectors.add(&vectors)?;
        next.documents.extend(documents);

        persist_state(&self.dir, &next).await?;
        inner.state = next;
        Ok(())
    }

    /// Semantic search with optional exact-match filters.
    ///
    /// Retrieves `min(k × overfetch, len)` candidates, drops those that fail
    /// the filters, and keeps the best `k`.
    pub async fn search(
        &self,
        query: &str,
        k: usize,
        project: Option<&str>,
        file_type: Option<&str>,
    ) -> Result<Vec<SearchResult>> {
        self.initialize().await;
        if k == 0 || self.inner.read().await.state.documents.is_empty() {
            return Ok(Vec::new());
        }

        let mut embedded = self
            .embedder
            .embed(&[query.to_string()])
            .await
            .context("Failed to embed query")?;
        let mut query_vec = embedded
            .pop()
            .ok_or_else(|| anyhow::anyhow!("embedding provider returned no query vector"))?;
        l2_normalize(&mut query_vec);

        let inner = self.inner.read().await;
        let state = &inner.state;
        let search_k = k.saturating_mul(self.overfetch).min(state.documents.len());
        let hits = state.vectors.search(&query_vec, search_k)?;

        let results = hits
            .into_iter()
            .filter_map(|(position, score)| {
                state.documents.get(position).map(|doc| (doc, score))
            })
            .filter(|(doc, _)| project.map_or(true, |p| doc.project_name == p))
            .filter(|(doc, _)| file_type.map_or(true, |t| doc.file_type == t))
            .take(k)
            .map(|(doc, score)| SearchResult {
                document: doc.clone(),
                score,
            })
            .collect();

        Ok(results)
    }

    /// Drop every document and persist the empty index.
    pub async fn clear(&self) -> Result<()> {
        let mut inner = self.inner.write().await;
        let next = IndexState::empty(self.dims);
        persist_state(&self.dir, &next).await?;
        inner.state = next;
        inner.initialized = true;
        info!(dir = %self.dir.display(), "cleared code index");
        Ok(())
    }

    pub async fn stats(&self) -> IndexStats {
        self.initialize().await;
        IndexStats::from_documents(&self.inner.read().await.state.documents)
    }

    /// Distinct file paths of a project, sorted.
    ///
    /// The project name matches case-insensitively.
    pub async fn project_files(&self, project: &str, file_type: Option<&str>) -> Vec<ProjectFile> {
        self.initialize().await;
        let inner = self.inner.read().await;
        let project = project.to_lowercase();

        let files: BTreeMap<String, String> = inner
            .state
            .documents
            .iter()
            .filter(|d| d.project_name.to_lowercase() == project)
            .filter(|d| file_type.map_or(true, |t| d.file_type == t))
            .map(|d| (d.path(), d.file_type.clone()))
            .collect();

        files
            .into_iter()
            .map(|(path, file_type)| ProjectFile { path, file_type })
            .collect()
    }

    /// First document of `project` whose path matches `path`.
    ///
    /// A stored path matches when it equals the request, or when either one
    /// ends with the other at a `/` boundary (`"lexer.rs"` finds
    /// `"src/lexer.rs"`; `"repo/README.md"` finds `"README.md"`).
    pub async fn find_file(&self, project: &str, path: &str) -> Option<IndexedDocument> {
        self.initialize().await;
        let inner = self.inner.read().await;
        let project = project.to_lowercase();
        let wanted = path.trim_start_matches('/');

        inner
            .state
            .documents
            .iter()
            .filter(|d| d.project_name.to_lowercase() == project)
            .find(|d| {
                let stored = d.path();
                stored == wanted
                    || ends_with_segment(&stored, wanted)
                    || ends_with_segment(wanted, &stored)
            })
            .cloned()
    }
}

/// Whether `path` ends with `suffix` as whole trailing path segments.
fn ends_with_segment(path: &str, suffix: &str) -> bool {
    !suffix.is_empty()
        && path
            .strip_suffix(suffix)
            .is_some_and(|head| head.ends_with('/'))
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, bytes)
        .await
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("Failed to move {} into place", path.display()))?;
    Ok(())
}

/// Vector file name for an index with the given checksum.
fn index_file_name(sha256: &str) -> String {
    let prefix = sha256.get(..16).unwrap_or(sha256);
    format!("{}{}{}", INDEX_FILE_PREFIX, prefix, INDEX_FILE_SUFFIX)
}

fn is_index_file(name: &str) -> bool {
    name.starts_with(INDEX_FILE_PREFIX) && name.ends_with(INDEX_FILE_SUFFIX)
}

async fn persist_state(dir: &Path, state: &IndexState) -> Result<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create index directory: {}", dir.display()))?;

    let index_bytes = state.vectors.to_bytes();
    let index_sha256 = sha256_hex(&index_bytes);
    let index_file = index_file_name(&index_sha256);
    let file = DocumentsFile {
        version: DOCUMENTS_VERSION,
        dims: state.vectors.dims(),
        index_file: index_file.clone(),
        index_sha256,
        documents: state.documents.clone(),
    };
    let documents_bytes = serde_json::to_vec(&file)?;

    write_atomic(&dir.join(&index_file), &index_bytes).await?;
    write_atomic(&dir.join(DOCUMENTS_FILE), &documents_bytes).await?;

    remove_stale_index_files(dir, &index_file).await;
    Ok(())
}

/// Delete vector files other than `current`. Failures are logged only; a
/// leftover file is never loaded.
async fn remove_stale_index_files(dir: &Path, current: &str) {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "could not scan index directory");
            return;
        }
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if name == current || !is_index_file(name) {
            continue;
        }
        if let Err(e) = tokio::fs::remove_file(entry.path()).await {
            warn!(file = name, error = %e, "could not remove stale index file");
        }
    }
}

/// Read the persisted index. `Ok(None)` when there is no manifest, the
/// vector file it names is missing, or the pair is inconsistent.
async fn load_state(dir: &Path, dims: usize) -> Result<Option<IndexState>> {
    let documents_path = dir.join(DOCUMENTS_FILE);
    if !documents_path.exists() {
        return Ok(None);
    }

    let documents_bytes = tokio::fs::read(&documents_path)
        .await
        .with_context(|| format!("Failed to read {}", documents_path.display()))?;
    let file: DocumentsFile = serde_json::from_slice(&documents_bytes)
        .with_context(|| format!("Failed to parse {}", documents_path.display()))?;

    if !is_index_file(&file.index_file) || file.index_file.contains(['/', '\\']) {
        warn!(file = %file.index_file, "manifest names an invalid index file, ignoring stored index");
        return Ok(None);
    }
    let index_path = dir.join(&file.index_file);
    if !index_path.exists() {
        warn!(file = %index_path.display(), "index file named by the manifest is missing");
        return Ok(None);
    }
    let index_bytes = tokio::fs::read(&index_path)
        .await
        .with_context(|| format!("Failed to read {}", index_path.display()))?;

    if file.index_sha256 != sha256_hex(&index_bytes) {
        warn!(dir = %dir.display(), "index checksum mismatch, ignoring stored index");
        return Ok(None);
    }

    let vectors = FlatIndex::from_bytes(&index_bytes)?;
    if vectors.dims() != dims || file.dims != dims {
        warn!(
            stored = vectors.dims(),
            configured = dims,
            "index dimensionality changed, ignoring stored index"
        );
        return Ok(None);
    }
    if vectors.len() != file.documents.len() {
        warn!(
            vectors = vectors.len(),
            documents = file.documents.len(),
            "index and document list disagree, ignoring stored index"
        );
        return Ok(None);
    }

    Ok(Some(IndexState {
        vectors,
        documents: file.documents,
    }))
}
