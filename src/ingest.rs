//! Repository ingestion.
//!
//! Turns one remote repository into [`IndexedDocument`]s: list the branch
//! tree (already filtered by the host), fetch file contents in concurrent
//! batches, drop what cannot be decoded or is too large, and split each path
//! into folder / name / extension.

use anyhow::Result;
use futures::future::join_all;
use tracing::{debug, info, warn};

use folio_chat_core::filter::{split_path, within_size_limit};
use folio_chat_core::models::IndexedDocument;

use crate::github::RepositoryHost;

/// Number of file fetches in flight at once.
pub const FETCH_BATCH_SIZE: usize = 10;

/// Fetch and convert every indexable file of `repo` at `branch`.
///
/// Batches run one after another; files within a batch are fetched
/// concurrently. Files that fail to fetch are skipped. Listing the tree is
/// the only step whose failure fails the whole repository.
pub async fn index_repository(
    host: &dyn RepositoryHost,
    repo: &str,
    branch: &str,
) -> Result<Vec<IndexedDocument>> {
    let tree = host.list_files(repo, branch).await?;
    info!(repo, branch = %tree.branch, files = tree.files.len(), "listed repository files");

    let mut documents = Vec::with_capacity(tree.files.len());

    for batch in tree.files.chunks(FETCH_BATCH_SIZE) {
        let fetches = batch
            .iter()
            .map(|file| host.fetch_file_content(repo, &file.path));
        let contents = join_all(fetches).await;

        for (file, content) in batch.iter().zip(contents) {
            let content = match content {
                Ok(Some(content)) => content,
                Ok(None) => {
                    debug!(repo, path = %file.path, "skipping file without text content");
                    continue;
                }
                Err(e) => {
                    warn!(repo, path = %file.path, error = %e, "failed to fetch file");
                    continue;
                }
            };
            if !within_size_limit(&content) {
                debug!(repo, path = %file.path, "skipping oversized file");
                continue;
            }

            let (folder_path, file_name, file_type) = split_path(&file.path);
            documents.push(IndexedDocument {
                content,
                project_name: repo.to_string(),
                folder_path,
                file_name,
                file_type,
                file_url: host.browse_url(repo, &tree.branch, &file.path),
            });
        }
    }

    Ok(documents)
}
