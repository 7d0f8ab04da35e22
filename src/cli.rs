/*!
sheetsql Command Line Interface

Ingests spreadsheets into session stores and asks questions about them
without running the HTTP server.
*/

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use sheetsql::agent::ChatAgent;
use sheetsql::config::{load_dotenv, AgentArgs, StorageArgs};
use sheetsql::query::{list_tables, DEFAULT_TOP_K};
use sheetsql::{FsSessionRegistry, Ingestor, QueryService, SessionId, SessionRegistry, VERSION};

#[derive(Parser)]
#[command(name = "sheetsql")]
#[command(about = "Ask questions of CSV files and spreadsheets")]
#[command(version = VERSION)]
pub struct Cli {
    #[command(flatten)]
    pub storage: StorageArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ingest a CSV file or workbook into a new session
    Ingest {
        /// Path to the file to ingest
        file: PathBuf,
    },

    /// List the tables of a session
    Tables {
        /// Session id printed by `ingest`
        session_id: String,
    },

    /// Ask a question about a session's data
    Ask {
        /// Session id printed by `ingest`
        session_id: String,

        /// The question to answer
        question: String,

        /// Row limit hint for the agent's queries
        #[arg(long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,

        #[command(flatten)]
        agent: AgentArgs,
    },
}

fn main() -> anyhow::Result<()> {
    // .env first, so it can also set RUST_LOG
    let env_file = load_dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sheetsql=warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Some(path) = &env_file {
        info!("Loaded environment from {}", path.display());
    }

    let cli = Cli::parse();

    let layout = cli.storage.layout();
    layout.ensure_dirs()?;
    let registry: Arc<dyn SessionRegistry> = Arc::new(FsSessionRegistry::new(&layout.db_dir));

    match cli.command {
        Commands::Ingest { file } => {
            let filename = file
                .file_name()
                .and_then(|n| n.to_str())
                .context("File path has no usable file name")?
                .to_string();
            let bytes = std::fs::read(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;

            let ingestor = Ingestor::new(layout, registry);
            let report = ingestor.ingest(&SessionId::generate(), &filename, &bytes)?;

            println!("Session: {}", report.session_id);
            println!("Tables:");
            for table in &report.tables {
                println!("  {}", table);
            }
        }

        Commands::Tables { session_id } => {
            for table in list_tables(registry.as_ref(), &session_id)? {
                println!("{}", table);
            }
        }

        Commands::Ask {
            session_id,
            question,
            top_k,
            agent,
        } => {
            let agent = Arc::new(ChatAgent::new(agent.agent_config()));
            let service = QueryService::new(registry, agent);
            let outcome = service.ask(&session_id, &question, top_k)?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
    }

    Ok(())
}
