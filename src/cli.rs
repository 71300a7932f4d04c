use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Command line interface for the application.
#[derive(Parser)]
#[command(name = "promptdeck", about = "Versioned LLM prompt manager")]
pub struct Cli {
    /// Directory holding tasks.json and config.json
    /// Default: the platform data directory under "promptdeck"
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Sets the logging verbosity level for the application
    /// Possible values: "error", "warn", "info", "debug", "trace"
    /// Default: "warn"
    #[arg(long, default_value_t = String::from("warn"))]
    pub logging_level: String,

    /// Also write logs to daily rotating files in ./logs
    #[arg(long)]
    pub log_to_file: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// List tasks, most recently modified first
    List,

    /// Create a new task
    Create { name: String },

    /// Rename a task
    Rename {
        /// Task id or unambiguous name
        task: String,
        name: String,
    },

    /// Delete a task and, irreversibly, all its versions and history
    Delete {
        task: String,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },

    /// Show a task: version timeline, variables and active prompt text
    Show { task: String },

    /// Create a new version on a task's timeline
    NewVersion {
        task: String,
        #[arg(long, default_value_t = String::new())]
        description: String,
        /// System prompt template
        #[arg(long)]
        system: Option<String>,
        /// User prompt template
        #[arg(long)]
        user: Option<String>,
    },

    /// Edit the active version in place (the auto-save path)
    Amend {
        task: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        system: Option<String>,
        #[arg(long)]
        user: Option<String>,
    },

    /// Set a variable default on a task
    SetVar {
        task: String,
        name: String,
        value: String,
    },

    /// Show placeholders across all versions and a rendered preview
    Vars { task: String },

    /// Execute a version against the active endpoint
    Run {
        task: String,
        /// Version number; defaults to the active version
        #[arg(long)]
        version: Option<u32>,
        /// Per-run variable override, NAME=VALUE (repeatable)
        #[arg(long = "var", value_parser = parse_key_val)]
        vars: Vec<(String, String)>,
    },

    /// List execution history for a version, newest first
    History {
        task: String,
        #[arg(long)]
        version: Option<u32>,
        #[arg(long, default_value_t = 50)]
        limit: usize,
        /// Skip this many newest records (paging)
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },

    /// Show the full detail of one execution record
    Result { record: String },

    /// Manage completion endpoints
    #[command(subcommand)]
    Endpoint(EndpointCommand),
}

#[derive(Subcommand)]
pub enum EndpointCommand {
    /// Add an endpoint; the API key falls back to $PROMPTDECK_API_KEY
    Add {
        name: String,
        base_url: String,
        model: String,
        #[arg(long)]
        api_key: Option<String>,
        /// Add without making it the active endpoint
        #[arg(long)]
        inactive: bool,
    },

    /// Make the named endpoint the active one
    Use { name: String },

    /// List configured endpoints
    List,
}

/// Parses a NAME=VALUE pair for --var.
fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", s))?;
    if name.is_empty() {
        return Err("variable name must not be empty".to_string());
    }
    Ok((name.to_string(), value.to_string()))
}
