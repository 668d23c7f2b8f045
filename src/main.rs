//! # Folio CLI (`folio`)
//!
//! Composition root for Folio Chat: builds the embedder, code index,
//! repository host, article store and language model from the config file
//! and exposes them as commands.
//!
//! ## Usage
//!
//! ```bash
//! folio --config ./folio.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `folio init` | Create the article schema and the index directory |
//! | `folio index` | Clear and rebuild the code index from every repository |
//! | `folio stats` | Show what the code index holds |
//! | `folio search "<query>"` | Semantic code search |
//! | `folio chat "<message>"` | Run one chat turn |
//! | `folio articles import <file>` | Import articles from a JSON array |

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use folio_chat::agents::{AgentContext, Persona};
use folio_chat::articles::SqliteArticleStore;
use folio_chat::config::{self, Config};
use folio_chat::embedding::create_embedder;
use folio_chat::github::GitHubClient;
use folio_chat::graph::ChatGraph;
use folio_chat::llm::create_language_model;
use folio_chat::logging::init_tracing;
use folio_chat::models::ChatMessage;
use folio_chat::store::CodeIndex;

/// Folio: a portfolio assistant that answers in your voice, grounded in
/// your repositories and blog.
#[derive(Parser)]
#[command(
    name = "folio",
    about = "Folio — multi-agent portfolio assistant with semantic code search",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./folio.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the article database schema and the index directory.
    ///
    /// Idempotent; running it again changes nothing.
    Init,

    /// Clear the code index and rebuild it from every repository.
    Index,

    /// Show index statistics.
    Stats,

    /// Semantic search over indexed code.
    Search {
        /// Natural-language query.
        query: String,

        /// Only return files from this project.
        #[arg(long)]
        project: Option<String>,

        /// Only return files with this extension (e.g. `.rs`).
        #[arg(long)]
        file_type: Option<String>,

        /// Maximum number of results.
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },

    /// Send one message to the assistant.
    Chat {
        /// The message.
        message: String,

        /// JSON file with prior turns: `[{"role": "user", "content": "..."}]`.
        #[arg(long)]
        history: Option<PathBuf>,

        /// Print the reply as it is generated.
        #[arg(long)]
        stream: bool,
    },

    /// Manage blog articles.
    Articles {
        #[command(subcommand)]
        action: ArticlesAction,
    },
}

#[derive(Subcommand)]
enum ArticlesAction {
    /// Import (or update, by slug) articles from a JSON array.
    Import {
        /// Path to the JSON file.
        file: PathBuf,
    },
}

/// Index with a live embedder, for commands that embed queries or files.
fn build_index(config: &Config) -> Result<Arc<CodeIndex>> {
    let embedder = create_embedder(&config.embedding)?;
    Ok(Arc::new(
        CodeIndex::new(
            embedder,
            config.index.path.clone(),
            config.embedding.dims_or_zero(),
        )
        .with_overfetch(config.index.search_overfetch),
    ))
}

async fn open_articles(config: &Config) -> Result<SqliteArticleStore> {
    let store = SqliteArticleStore::connect(&config.articles.db_path).await?;
    store.migrate().await?;
    Ok(store)
}

async fn build_graph(config: &Config) -> Result<ChatGraph> {
    let ctx = AgentContext {
        index: build_index(config)?,
        host: Arc::new(GitHubClient::new(&config.github)?),
        articles: Arc::new(open_articles(config).await?),
        llm: create_language_model(&config.llm)?,
        persona: Persona::load(&config.persona.name, &config.persona.bio_path),
    };
    Ok(ChatGraph::new(ctx))
}

fn load_history(path: &Path) -> Result<Vec<ChatMessage>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read history file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse history file: {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            open_articles(&cfg).await?;
            std::fs::create_dir_all(&cfg.index.path).with_context(|| {
                format!("Failed to create index directory: {}", cfg.index.path.display())
            })?;
            println!("Initialized articles database at {}", cfg.articles.db_path.display());
            println!("Index directory: {}", cfg.index.path.display());
        }
        Commands::Index => {
            let graph = build_graph(&cfg).await?;
            graph.context().index.initialize().await;
            let report = graph.index_repositories().await?;

            println!("index");
            println!("  repositories indexed: {}", report.repositories_indexed);
            println!("  files indexed: {}", report.total_files);
            for name in &report.repositories {
                println!("    {}", name);
            }
            if !report.repositories_skipped.is_empty() {
                println!("  skipped:");
                for skipped in &report.repositories_skipped {
                    println!("    {}: {}", skipped.name, skipped.error);
                }
            }
            println!("ok");
        }
        Commands::Stats => {
            let index = CodeIndex::read_only(cfg.index.path.clone(), cfg.embedding.dims_or_zero());
            let stats = index.stats().await;

            println!("Folio — Code Index Stats");
            println!("========================");
            println!();
            println!("  Index:       {}", index.dir().display());
            println!("  Documents:   {}", stats.total_documents);
            println!("  Projects:    {}", stats.projects.len());
            for project in &stats.projects {
                println!("    {}", project);
            }
            let file_types: Vec<&str> = stats.file_types.iter().map(String::as_str).collect();
            println!("  File types:  {}", file_types.join(", "));
        }
        Commands::Search {
            query,
            project,
            file_type,
            limit,
        } => {
            let index = build_index(&cfg)?;
            let results = index
                .search(&query, limit, project.as_deref(), file_type.as_deref())
                .await?;

            if results.is_empty() {
                println!("No results.");
                return Ok(());
            }
            for (i, result) in results.iter().enumerate() {
                let doc = &result.document;
                println!("{}. [{:.3}] {} / {}", i + 1, result.score, doc.project_name, doc.path());
                println!("    url: {}", doc.file_url);
                let excerpt: String = doc.content.chars().take(160).collect();
                println!("    excerpt: \"{}\"", excerpt.replace('\n', " ").trim());
                println!();
            }
        }
        Commands::Chat {
            message,
            history,
            stream,
        } => {
            let history = match history {
                Some(path) => load_history(&path)?,
                None => Vec::new(),
            };
            let graph = build_graph(&cfg).await?;

            if stream {
                let mut chunks = graph.chat_stream(&message, history).await?;
                let mut stdout = std::io::stdout();
                while let Some(chunk) = chunks.next().await {
                    write!(stdout, "{}", chunk?)?;
                    stdout.flush()?;
                }
                println!();
            } else {
                println!("{}", graph.chat(&message, history).await?);
            }
        }
        Commands::Articles {
            action: ArticlesAction::Import { file },
        } => {
            let json = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let store = open_articles(&cfg).await?;
            let count = store.import_json(&json).await?;
            println!("Imported {} articles", count);
        }
    }

    Ok(())
}
