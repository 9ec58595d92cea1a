//! # Synthesis RAG CLI (`synrag`)
//!
//! Thin developer interface over the retrieval engine. The real contract
//! is the in-process library API ([`synthesis_rag::engine::RagEngine`]);
//! this binary exists for inspection and manual testing.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `synrag init` | Create both collection databases |
//! | `synrag add "<text>"` | Store a fragment (private by default) |
//! | `synrag search "<query>"` | Hybrid search with source-tagged results |
//! | `synrag audit` | Scan the public collection for suspected leaks |
//! | `synrag delete <visibility> <id>` | Remove a fragment |
//! | `synrag stats` | Per-collection fragment counts and sizes |
//!
//! ## Examples
//!
//! ```bash
//! synrag init
//! synrag add "User prefers coroutines over async/await" --category pattern
//! synrag add "Unity uses C# for scripting" --public
//! synrag search "unity scripting" --scope both --limit 5
//! synrag audit
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use synthesis_rag::config::{load_config, Config};
use synthesis_rag::embedding::create_provider;
use synthesis_rag::engine::RagEngine;
use synthesis_rag::models::{FragmentMetadata, Scope, Visibility};

/// Synthesis RAG: hybrid retrieval store with isolated public/private
/// collections.
#[derive(Parser)]
#[command(
    name = "synrag",
    about = "Hybrid lexical + semantic retrieval store with isolated public/private collections",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). Built-in defaults are used if
    /// the file does not exist.
    #[arg(long, global = true, default_value = "./synrag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create both collection databases. Idempotent.
    Init,

    /// Store a fragment of knowledge.
    ///
    /// Fragments are private unless `--public` is passed; the safe
    /// default prevents accidental leaks. Re-adding identical content
    /// returns the existing fragment id.
    Add {
        /// The text content to store.
        text: String,

        /// Store in the public (shareable) collection instead of private.
        #[arg(long)]
        public: bool,

        /// Tags to attach (repeatable).
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Category annotation (e.g. `pattern`, `decision`).
        #[arg(long)]
        category: Option<String>,

        /// Session identifier for provenance.
        #[arg(long)]
        session: Option<String>,

        /// Abort if the operation takes longer than this many seconds.
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Search one or both collections.
    Search {
        /// The search query string.
        query: String,

        /// Collections to search: `public`, `private`, or `both`.
        #[arg(long, default_value = "both")]
        scope: Scope,

        /// Maximum number of results.
        #[arg(long)]
        limit: Option<usize>,

        /// Abort if the operation takes longer than this many seconds.
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Scan the public collection for content that looks private.
    ///
    /// Advisory: findings are warnings for human review, not a gate.
    Audit,

    /// Remove a fragment from a collection.
    Delete {
        /// Which collection: `public` or `private`.
        visibility: Visibility,
        /// Fragment id.
        id: String,
    },

    /// Show per-collection statistics.
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = if cli.config.exists() {
        load_config(&cli.config)?
    } else {
        Config::default()
    };

    let provider = create_provider(&config.embedding)?;
    let engine = RagEngine::open(&config, provider).await?;

    match cli.command {
        Commands::Init => {
            // Opening the engine already created both databases.
            println!("Collections initialized.");
            println!("  public:  {}", config.storage.public_path.display());
            println!("  private: {}", config.storage.private_path.display());
        }
        Commands::Add {
            text,
            public,
            tags,
            category,
            session,
            timeout_secs,
        } => {
            let metadata = FragmentMetadata {
                tags,
                category,
                session_id: session,
                ..Default::default()
            };
            let timeout = timeout_secs.map(Duration::from_secs);

            let id = if public {
                engine.add_public(&text, metadata, timeout).await?
            } else {
                engine.add(&text, metadata, timeout).await?
            };

            let target = if public { "public" } else { "private" };
            println!("stored to {} collection: {}", target, id);
        }
        Commands::Search {
            query,
            scope,
            limit,
            timeout_secs,
        } => {
            let timeout = timeout_secs.map(Duration::from_secs);
            let results = engine.search(&query, scope, limit, timeout).await?;

            if results.is_empty() {
                println!("No results.");
                return Ok(());
            }

            for (i, result) in results.iter().enumerate() {
                println!(
                    "{}. [{:.4}] [{}] {}",
                    i + 1,
                    result.score,
                    result.source,
                    result.content
                );
                println!("    id: {}", result.fragment_id);
            }
        }
        Commands::Audit => {
            let warnings = engine.audit_public().await?;
            if warnings.is_empty() {
                println!("No suspected leaks in the public collection.");
                return Ok(());
            }

            println!("{} suspected leak(s), review required:", warnings.len());
            for w in &warnings {
                println!("  [{}] fragment {}", w.pattern, w.fragment_id);
                println!("      \"{}\"", w.excerpt);
            }
        }
        Commands::Delete { visibility, id } => {
            if engine.delete(visibility, &id).await? {
                println!("deleted {} from {} collection", id, visibility);
            } else {
                println!("no fragment {} in {} collection", id, visibility);
            }
        }
        Commands::Stats => {
            let stats = engine.stats().await?;
            for (name, s) in [("public", &stats.public), ("private", &stats.private)] {
                println!("{} collection", name);
                println!("  fragments: {}", s.fragments);
                println!("  db size:   {} bytes", s.db_size_bytes);
                match s.newest_added_at {
                    Some(ts) => {
                        let date = chrono::DateTime::from_timestamp(ts, 0)
                            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
                            .unwrap_or_else(|| ts.to_string());
                        println!("  newest:    {}", date);
                    }
                    None => println!("  newest:    (empty)"),
                }
            }
        }
    }

    Ok(())
}
