//! # Campus Assist CLI (`assist`)
//!
//! The `assist` binary initializes the database, manages the knowledge base
//! and staff accounts, answers one-off questions, prints usage stats and
//! starts the HTTP API server.
//!
//! ## Usage
//!
//! ```bash
//! assist --config ./config/assist.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `assist init` | Create the SQLite database and run schema migrations |
//! | `assist serve` | Start the HTTP API server |
//! | `assist ask "<message>"` | Answer one message through the chat pipeline |
//! | `assist faq list` | List knowledge-base entries |
//! | `assist faq import <file>` | Append entries from a TOML file |
//! | `assist user add <name>` | Create an account with a role |
//! | `assist user set-role <name> <role>` | Change an account's role |
//! | `assist stats` | Print the analytics report |

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use campus_assist::chat::ChatService;
use campus_assist::models::Role;
use campus_assist::store::{SqliteStore, Store};
use campus_assist::{auth, config, faqs, llm, logging, migrate, server, stats};

/// Campus Assist: FAQ-driven university chatbot backend.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/assist.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "assist",
    about = "Campus Assist — FAQ-driven university chatbot backend",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/assist.toml")]
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

    /// Start the HTTP API server on `[server].bind`.
    Serve,

    /// Answer a single message and log the exchange.
    Ask {
        /// The message to answer.
        message: String,

        /// Session id to log the exchange under.
        #[arg(long)]
        session: Option<String>,
    },

    /// Manage the FAQ knowledge base.
    Faq {
        #[command(subcommand)]
        action: FaqAction,
    },

    /// Manage staff and admin accounts.
    User {
        #[command(subcommand)]
        action: UserAction,
    },

    /// Print usage statistics.
    Stats,
}

#[derive(Subcommand)]
enum FaqAction {
    /// List all entries.
    List,
    /// Append entries from a TOML file of `[[faq]]` tables.
    Import {
        /// Path to the FAQ file.
        path: PathBuf,
    },
}

#[derive(Subcommand)]
enum UserAction {
    /// Create an account and provision its role.
    Add {
        username: String,

        #[arg(long)]
        password: String,

        /// `admin`, `staff` or `student`.
        #[arg(long, default_value = "student")]
        role: String,
    },
    /// Change the role of an existing account.
    SetRole {
        username: String,
        /// `admin`, `staff` or `student`.
        role: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = config::load_config(&cli.config)?;
    logging::init(&cfg.log.level)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Ask { message, session } => {
            let store: Arc<dyn Store> = Arc::new(SqliteStore::open(&cfg).await?);
            let model = llm::create_model(&cfg.llm)?;
            let service = ChatService::new(store, model, cfg.chat.clone());
            let reply = service
                .handle_message(&message, session.as_deref(), &[])
                .await?;
            println!("{}", reply.response);
        }
        Commands::Faq { action } => match action {
            FaqAction::List => faqs::run_list(&cfg).await?,
            FaqAction::Import { path } => faqs::run_import(&cfg, &path).await?,
        },
        Commands::User { action } => {
            let store = SqliteStore::open(&cfg).await?;
            match action {
                UserAction::Add {
                    username,
                    password,
                    role,
                } => {
                    let role: Role = role.parse()?;
                    let user = auth::register(&store, &username, &password, role)
                        .await
                        .with_context(|| format!("Failed to create user '{}'", username))?;
                    println!("created user: {} ({})", user.username, role);
                }
                UserAction::SetRole { username, role } => {
                    let role: Role = role.parse()?;
                    let user = auth::set_role(&store, &username, role).await?;
                    println!("updated user: {} ({})", user.username, role);
                }
            }
            store.pool().close().await;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
