//! Code-index and repository-host tools.

use anyhow::Result;

use folio_chat_core::models::SearchResult;

use super::{join_or_none, truncate_chars};
use crate::github::RepositoryHost;
use crate::store::CodeIndex;

const SEARCH_PREVIEW_CHARS: usize = 2000;
const PROJECT_PREVIEW_CHARS: usize = 3000;
const MAX_LISTED_FILES: usize = 50;

fn fence_lang(file_type: &str) -> &str {
    file_type.trim_start_matches('.')
}

fn preview(content: &str, max_chars: usize) -> String {
    let (head, truncated) = truncate_chars(content, max_chars);
    if truncated {
        format!("{}\n... (truncated)", head)
    } else {
        head.to_string()
    }
}

fn render_hits(results: &[SearchResult], max_chars: usize, with_project: bool) -> String {
    results
        .iter()
        .enumerate()
        .map(|(i, hit)| {
            let doc = &hit.document;
            let mut entry = format!("**Result {}**\n", i + 1);
            if with_project {
                entry.push_str(&format!("- Project: {}\n", doc.project_name));
            }
            entry.push_str(&format!("- File: {}\n", doc.path()));
            entry.push_str(&format!("- Type: {}\n", doc.file_type));
            entry.push_str(&format!("- URL: {}\n", doc.file_url));
            if with_project {
                entry.push_str(&format!("- Relevance Score: {:.3}\n", hit.score));
            }
            entry.push_str(&format!(
                "\n```{}\n{}\n```\n",
                fence_lang(&doc.file_type),
                preview(&doc.content, max_chars)
            ));
            entry
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Semantic search across every indexed project.
pub async fn search_code(
    index: &CodeIndex,
    query: &str,
    project: Option<&str>,
    file_type: Option<&str>,
    limit: usize,
) -> Result<String> {
    let results = index.search(query, limit, project, file_type).await?;
    if results.is_empty() {
        return Ok("No matching code found for the query.".to_string());
    }
    Ok(render_hits(&results, SEARCH_PREVIEW_CHARS, true))
}

/// Semantic search restricted to one project.
pub async fn search_in_project(
    index: &CodeIndex,
    project: &str,
    query: &str,
    limit: usize,
) -> Result<String> {
    let results = index.search(query, limit, Some(project), None).await?;
    if results.is_empty() {
        return Ok(format!(
            "No matching code found in project '{}' for the query.",
            project
        ));
    }
    Ok(render_hits(&results, PROJECT_PREVIEW_CHARS, false))
}

/// Names of indexed projects plus index statistics.
pub async fn list_projects(index: &CodeIndex) -> Result<String> {
    let stats = index.stats().await;
    if stats.total_documents == 0 {
        return Ok("No projects have been indexed yet.".to_string());
    }

    let projects: Vec<String> = stats.projects.iter().cloned().collect();
    let file_types: Vec<String> = stats.file_types.iter().cloned().collect();
    Ok(format!(
        "**Indexed Projects ({} total)**\nProjects: {}\n\n**Statistics**\n- Total files indexed: {}\n- File types: {}",
        projects.len(),
        projects.join(", "),
        stats.total_documents,
        file_types.join(", ")
    ))
}

/// Sorted file listing of one project, capped at fifty entries.
pub async fn get_project_files(
    index: &CodeIndex,
    project: &str,
    file_type: Option<&str>,
) -> Result<String> {
    let files = index.project_files(project, file_type).await;
    if files.is_empty() {
        return Ok(format!("No files found for project '{}'.", project));
    }

    let mut lines = vec![format!("**Files in {}** ({} files)\n", project, files.len())];
    for file in files.iter().take(MAX_LISTED_FILES) {
        lines.push(format!("- {} ({})", file.path, file.file_type));
    }
    if files.len() > MAX_LISTED_FILES {
        lines.push(format!(
            "\n... and {} more files",
            files.len() - MAX_LISTED_FILES
        ));
    }
    Ok(lines.join("\n"))
}

/// Full content of one indexed file.
pub async fn get_file_content(index: &CodeIndex, project: &str, path: &str) -> Result<String> {
    match index.find_file(project, path).await {
        Some(doc) => Ok(format!(
            "**File: {}**\n- Project: {}\n- Path: {}\n- URL: {}\n\n```{}\n{}\n```",
            doc.file_name,
            doc.project_name,
            doc.path(),
            doc.file_url,
            fence_lang(&doc.file_type),
            doc.content
        )),
        None => Ok(format!(
            "File '{}' not found in project '{}'.",
            path, project
        )),
    }
}

/// Metadata of every repository on the host.
pub async fn get_repository_info(host: &dyn RepositoryHost) -> Result<String> {
    let repos = host.list_repositories().await?;
    if repos.is_empty() {
        return Ok("No repositories found.".to_string());
    }

    let mut sections = vec![format!("**GitHub Repositories** ({} total)\n", repos.len())];
    for repo in &repos {
        sections.push(format!(
            "### {}\n- Description: {}\n- Language: {}\n- Topics: {}\n- URL: {}\n",
            repo.name,
            repo.description.as_deref().unwrap_or("No description"),
            repo.language.as_deref().unwrap_or("Unknown"),
            join_or_none(&repo.topics),
            repo.url
        ));
    }
    Ok(sections.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_chat_core::models::IndexedDocument;

    fn hit(content: &str, score: f32) -> SearchResult {
        SearchResult {
            document: IndexedDocument {
                content: content.to_string(),
                project_name: "tokenizer".to_string(),
                folder_path: "src".to_string(),
                file_name: "lexer.rs".to_string(),
                file_type: ".rs".to_string(),
                file_url: "https://github.com/o/tokenizer/blob/main/src/lexer.rs".to_string(),
            },
            score,
        }
    }

    #[test]
    fn test_render_hits_with_project_and_score() {
        let text = render_hits(&[hit("fn lex() {}", 0.91234)], SEARCH_PREVIEW_CHARS, true);
        assert!(text.starts_with("**Result 1**\n- Project: tokenizer\n"));
        assert!(text.contains("- File: src/lexer.rs\n"));
        assert!(text.contains("- Relevance Score: 0.912\n"));
        assert!(text.contains("```rs\nfn lex() {}\n```"));
    }

    #[test]
    fn test_render_hits_truncates_long_content() {
        let long = "x".repeat(SEARCH_PREVIEW_CHARS + 10);
        let text = render_hits(&[hit(&long, 0.5)], SEARCH_PREVIEW_CHARS, true);
        assert!(text.contains("\n... (truncated)\n```"));

        let scoped = render_hits(&[hit(&long, 0.5)], PROJECT_PREVIEW_CHARS, false);
        assert!(!scoped.contains("truncated"));
        assert!(!scoped.contains("Relevance Score"));
    }
}
