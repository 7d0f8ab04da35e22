//! Shared command-line configuration
//!
//! Both binaries flatten these argument groups into their own `Cli` structs,
//! so the storage layout and agent settings are spelled the same way
//! everywhere and can also be supplied through the environment.

use clap::Args;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{Result, SheetSqlError};

/// Subdirectory of the data dir holding raw upload copies
pub const UPLOAD_SUBDIR: &str = "uploads";

/// Subdirectory of the data dir holding one SQLite store per session
pub const DATABASE_SUBDIR: &str = "databases";

/// Load `.env` from the working directory or its ancestors into the process
/// environment, returning the file used. Variables already set are kept.
pub fn load_dotenv() -> Option<PathBuf> {
    dotenvy::dotenv().ok()
}

/// Load a specific env file; `false` when it is missing or malformed
pub fn load_env_file(path: &Path) -> bool {
    dotenvy::from_path(path).is_ok()
}

/// Storage arguments
#[derive(Args, Debug, Clone)]
pub struct StorageArgs {
    /// Directory holding uploaded files and session databases
    #[arg(long, env = "SHEETSQL_DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,
}

impl StorageArgs {
    pub fn layout(&self) -> StorageLayout {
        StorageLayout::under(&self.data_dir)
    }
}

/// On-disk layout: two sibling directories, uploads and databases
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    pub upload_dir: PathBuf,
    pub db_dir: PathBuf,
}

impl StorageLayout {
    pub fn under(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            upload_dir: data_dir.join(UPLOAD_SUBDIR),
            db_dir: data_dir.join(DATABASE_SUBDIR),
        }
    }

    /// Create both directories if they do not exist yet
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.upload_dir, &self.db_dir] {
            std::fs::create_dir_all(dir).map_err(|e| {
                SheetSqlError::InternalError(format!(
                    "Failed to create directory {}: {}",
                    dir.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }
}

/// Arguments for the LLM-backed SQL agent
#[derive(Args, Debug, Clone)]
pub struct AgentArgs {
    /// Base URL of an OpenAI-compatible chat completions API
    #[arg(
        long,
        env = "SHEETSQL_LLM_BASE_URL",
        default_value = "https://api.openai.com/v1"
    )]
    pub llm_base_url: String,

    /// API key sent as a bearer token
    #[arg(long, env = "SHEETSQL_LLM_API_KEY", hide_env_values = true)]
    pub llm_api_key: Option<String>,

    /// Chat model name
    #[arg(long, env = "SHEETSQL_LLM_MODEL", default_value = "gpt-4o-mini")]
    pub llm_model: String,

    /// Maximum model round-trips per question
    #[arg(long, default_value = "15")]
    pub agent_max_iterations: usize,

    /// Timeout for each model request in seconds (none when omitted)
    #[arg(long)]
    pub agent_timeout_secs: Option<u64>,
}

impl AgentArgs {
    pub fn agent_config(&self) -> AgentConfig {
        AgentConfig {
            base_url: self.llm_base_url.trim_end_matches('/').to_string(),
            api_key: self.llm_api_key.clone(),
            model: self.llm_model.clone(),
            max_iterations: self.agent_max_iterations,
            timeout: self.agent_timeout_secs.map(Duration::from_secs),
        }
    }
}

/// Resolved agent configuration
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub max_iterations: usize,
    pub timeout: Option<Duration>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            max_iterations: 15,
            timeout: None,
        }
    }
}
