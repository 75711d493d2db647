//! Command line front end for lmbridge.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Talk to a local LM Studio server.
#[derive(Parser, Debug)]
#[command(name = "lmbridge", version, about = "Local LLM bridge CLI")]
pub struct Cli {
    /// Config file (defaults to the platform config dir)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the resolved local LLM configuration
    Config,
    /// Send a chat prompt
    Chat(ChatArgs),
    /// Extract structured JSON matching a schema
    Extract(ExtractArgs),
}

/// Arguments for the `chat` subcommand.
#[derive(Parser, Debug)]
pub struct ChatArgs {
    /// Prompt text
    pub prompt: String,

    /// Chat model override
    #[arg(short, long)]
    pub model: Option<String>,

    /// System prompt
    #[arg(short, long)]
    pub system: Option<String>,

    /// Temperature (0.0 - 2.0)
    #[arg(short, long)]
    pub temperature: Option<f64>,

    /// Max tokens
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Stream the reply as it is generated
    #[arg(long)]
    pub stream: bool,
}

/// Arguments for the `extract` subcommand.
#[derive(Parser, Debug)]
pub struct ExtractArgs {
    /// Text to extract from
    pub prompt: String,

    /// Path to a JSON Schema file
    #[arg(long)]
    pub schema: PathBuf,

    /// Schema name shown to the model
    #[arg(long, default_value = "Response")]
    pub name: String,

    /// Attempts before giving up on an unusable answer
    #[arg(long, default_value_t = 2)]
    pub attempts: u32,
}
