//! Core data models shared by the index, the ingestion pipeline, and the agents.
//!
//! These types describe what flows through retrieval: the documents stored in
//! the code index, the hits returned from a search, and the chat turns that
//! make up a conversation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One vectorized unit of retrievable content: a single source file.
///
/// The embedding vector is not stored here. A document's position in the
/// index's document list is the same as its vector's position in the
/// [`FlatIndex`](crate::index::FlatIndex).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedDocument {
    /// Full decoded file content.
    pub content: String,
    /// Owning repository name.
    pub project_name: String,
    /// Folder path inside the repository (`""` for the repository root).
    pub folder_path: String,
    /// Base file name (e.g. `"main.rs"`).
    pub file_name: String,
    /// Extension with a leading dot (e.g. `".rs"`), or `""` when there is none.
    pub file_type: String,
    /// Canonical browse URL for the file.
    pub file_url: String,
}

impl IndexedDocument {
    /// Repository-relative path (`folder/file`, or just `file` at the root).
    pub fn path(&self) -> String {
        if self.folder_path.is_empty() {
            self.file_name.clone()
        } else {
            format!("{}/{}", self.folder_path, self.file_name)
        }
    }
}

/// A ranked retrieval hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    #[serde(flatten)]
    pub document: IndexedDocument,
    /// Inner product of the normalized query and document vectors (cosine
    /// similarity, `-1.0..=1.0`, higher is more similar).
    pub score: f32,
}

/// Summary of what the index currently holds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub total_documents: usize,
    pub projects: BTreeSet<String>,
    pub file_types: BTreeSet<String>,
}

impl IndexStats {
    /// Compute stats over a document list.
    pub fn from_documents(documents: &[IndexedDocument]) -> Self {
        let mut stats = IndexStats {
            total_documents: documents.len(),
            ..Default::default()
        };
        for doc in documents {
            stats.projects.insert(doc.project_name.clone());
            stats.file_types.insert(doc.file_type.clone());
        }
        stats
    }
}

/// Who authored a chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A single turn of caller-supplied conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}
