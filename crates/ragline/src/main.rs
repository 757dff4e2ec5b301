//! # Ragline CLI (`ragline`)
//!
//! ## Usage
//!
//! ```bash
//! ragline --config ./config/ragline.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ragline init` | Create the SQLite database and run schema migrations |
//! | `ragline workspace create <name>` | Create a workspace |
//! | `ragline workspace drop <id>` | Delete a workspace and its collection |
//! | `ragline doc add <workspace> <path>` | Register a plain-text document |
//! | `ragline doc embed <id>` | Chunk and embed one document |
//! | `ragline doc embed-all <workspace>` | Re-embed every document of a workspace |
//! | `ragline doc remove <id>` | Delete a document and its points |
//! | `ragline chat new <workspace>` | Start a chat |
//! | `ragline search <workspace> "<query>"` | Run hybrid retrieval |
//! | `ragline ask <chat> "<message>"` | Run one generation turn, streaming the answer |
//!
//! Logging goes to stderr and is controlled by `RUST_LOG`
//! (default `ragline=info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use ragline::{chat_cmd, config, doc_cmd, migrate, search_cmd, workspace_cmd};

/// Ragline: hybrid retrieval and streamed generation for document chat.
#[derive(Parser)]
#[command(
    name = "ragline",
    about = "Ragline: workspace-scoped hybrid retrieval and streamed generation",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ragline.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,

    /// Manage workspaces.
    Workspace {
        #[command(subcommand)]
        action: WorkspaceAction,
    },

    /// Manage documents.
    Doc {
        #[command(subcommand)]
        action: DocAction,
    },

    /// Manage chats.
    Chat {
        #[command(subcommand)]
        action: ChatAction,
    },

    /// Search a workspace.
    Search {
        workspace: i64,
        query: String,

        /// Maximum results (defaults to the workspace's top_n).
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Send a message to a chat and stream the answer.
    Ask {
        chat: i64,
        message: String,

        /// Attach a plain-text file to this turn only. Repeatable.
        #[arg(long = "file")]
        files: Vec<PathBuf>,

        /// Skip workspace retrieval for this turn.
        #[arg(long)]
        no_rag: bool,

        /// Print raw `data: {json}` event frames.
        #[arg(long)]
        sse: bool,
    },
}

#[derive(Subcommand)]
enum WorkspaceAction {
    /// Create a workspace.
    Create {
        name: String,

        /// `chat` answers without context; `query` refuses.
        #[arg(long, default_value = "chat")]
        mode: String,

        #[arg(long)]
        system_prompt: Option<String>,

        /// Results retrieved per turn (defaults to `retrieval.default_top_n`).
        #[arg(long)]
        top_n: Option<usize>,

        /// Minimum cosine similarity on the dense-only paths.
        #[arg(long)]
        threshold: Option<f32>,

        /// Disable the sparse channel and fusion.
        #[arg(long)]
        no_hybrid: bool,

        /// Consult the web-search agent on every turn.
        #[arg(long)]
        web_search: bool,
    },
    /// Delete a workspace, its chats, documents and collection.
    Drop { id: i64 },
}

#[derive(Subcommand)]
enum DocAction {
    /// Register a plain-text file with a workspace.
    Add { workspace: i64, path: PathBuf },
    /// Chunk and embed one document, replacing its previous points.
    Embed { id: i64 },
    /// Re-embed every document of a workspace.
    EmbedAll { workspace: i64 },
    /// Delete a document and its points.
    Remove { id: i64 },
}

#[derive(Subcommand)]
enum ChatAction {
    /// Start a chat in a workspace.
    New {
        workspace: i64,
        #[arg(long)]
        title: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ragline=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Workspace { action } => match action {
            WorkspaceAction::Create {
                name,
                mode,
                system_prompt,
                top_n,
                threshold,
                no_hybrid,
                web_search,
            } => {
                workspace_cmd::run_workspace_create(
                    &cfg,
                    workspace_cmd::CreateOptions {
                        name,
                        mode,
                        system_prompt,
                        top_n,
                        threshold,
                        no_hybrid,
                        web_search,
                    },
                )
                .await?;
            }
            WorkspaceAction::Drop { id } => {
                workspace_cmd::run_workspace_drop(&cfg, id).await?;
            }
        },
        Commands::Doc { action } => match action {
            DocAction::Add { workspace, path } => {
                doc_cmd::run_doc_add(&cfg, workspace, &path).await?;
            }
            DocAction::Embed { id } => {
                doc_cmd::run_doc_embed(&cfg, id).await?;
            }
            DocAction::EmbedAll { workspace } => {
                doc_cmd::run_doc_embed_all(&cfg, workspace).await?;
            }
            DocAction::Remove { id } => {
                doc_cmd::run_doc_remove(&cfg, id).await?;
            }
        },
        Commands::Chat { action } => match action {
            ChatAction::New { workspace, title } => {
                chat_cmd::run_chat_new(&cfg, workspace, title).await?;
            }
        },
        Commands::Search {
            workspace,
            query,
            limit,
        } => {
            search_cmd::run_search(&cfg, workspace, &query, limit).await?;
        }
        Commands::Ask {
            chat,
            message,
            files,
            no_rag,
            sse,
        } => {
            chat_cmd::run_ask(&cfg, chat, &message, &files, no_rag, sse).await?;
        }
    }

    Ok(())
}
