//! Ingestion filters for remote repository trees.
//!
//! Decides which paths of a repository are worth embedding and splits a path
//! into the folder / file / extension triple stored on an
//! [`IndexedDocument`](crate::models::IndexedDocument).

/// Files whose decoded content exceeds this many characters are skipped.
pub const MAX_FILE_CHARS: usize = 50_000;

/// Directory names that exclude everything beneath them.
pub const IGNORED_DIRS: &[&str] = &[
    "node_modules",
    "__pycache__",
    ".git",
    ".venv",
    "venv",
    "env",
    ".env",
    "dist",
    "build",
    ".next",
    ".nuxt",
    "target",
    "vendor",
    ".idea",
    ".vscode",
    "coverage",
    ".pytest_cache",
    ".mypy_cache",
    ".ruff_cache",
];

/// Generated lockfiles, matched against the lowercase basename.
pub const LOCKFILES: &[&str] = &[
    "package-lock.json",
    "yarn.lock",
    "poetry.lock",
    "uv.lock",
    "cargo.lock",
    "pnpm-lock.yaml",
];

/// Extensions (with leading dot) that are indexed.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    ".py", ".js", ".ts", ".tsx", ".jsx", ".java", ".go", ".rs", ".cpp", ".c", ".h", ".hpp", ".cs",
    ".rb", ".php", ".swift", ".kt", ".scala", ".md", ".txt", ".json", ".yaml", ".yml", ".toml",
    ".xml", ".html", ".css", ".scss", ".sql", ".sh", ".bash", ".dockerfile",
];

/// Whether a repository-relative path should be fetched and indexed.
///
/// Rules, in order:
/// 1. any directory segment equal to an [`IGNORED_DIRS`] entry → excluded
/// 2. a basename in [`LOCKFILES`] → excluded
/// 3. a basename equal to `Dockerfile` (any case) → included
/// 4. a basename ending in `.env.example` → included
/// 5. otherwise the extension must be in [`SUPPORTED_EXTENSIONS`]
pub fn should_index_path(path: &str) -> bool {
    let lower = path.to_lowercase();
    let mut segments: Vec<&str> = lower.split('/').filter(|s| !s.is_empty()).collect();
    let file_name = match segments.pop() {
        Some(name) => name,
        None => return false,
    };

    if segments.iter().any(|seg| IGNORED_DIRS.contains(seg)) {
        return false;
    }
    if LOCKFILES.contains(&file_name) {
        return false;
    }
    if file_name == "dockerfile" || file_name.ends_with(".env.example") {
        return true;
    }

    let ext = extension_of(file_name);
    !ext.is_empty() && SUPPORTED_EXTENSIONS.contains(&ext.as_str())
}

/// Extension of a basename including the leading dot, or `""`.
pub fn extension_of(file_name: &str) -> String {
    match file_name.rsplit_once('.') {
        Some((_, ext)) => format!(".{}", ext),
        None => String::new(),
    }
}

/// Split a repository-relative path into `(folder, file_name, extension)`.
///
/// ```rust
/// use folio_chat_core::filter::split_path;
///
/// assert_eq!(
///     split_path("src/lexer/token.rs"),
///     ("src/lexer".to_string(), "token.rs".to_string(), ".rs".to_string())
/// );
/// assert_eq!(
///     split_path("Dockerfile"),
///     (String::new(), "Dockerfile".to_string(), String::new())
/// );
/// ```
pub fn split_path(path: &str) -> (String, String, String) {
    let (folder, file_name) = match path.rsplit_once('/') {
        Some((folder, name)) => (folder.to_string(), name.to_string()),
        None => (String::new(), path.to_string()),
    };
    let ext = extension_of(&file_name);
    (folder, file_name, ext)
}

/// Whether decoded content fits under [`MAX_FILE_CHARS`].
pub fn within_size_limit(content: &str) -> bool {
    content.chars().count() <= MAX_FILE_CHARS
}
