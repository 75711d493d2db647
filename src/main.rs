//! lmbridge CLI binary entry point.

use std::io::Write;

use clap::Parser;
use futures::StreamExt;
use lmbridge::cli::{ChatArgs, Cli, Commands, ExtractArgs};
use lmbridge::prelude::*;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "lmbridge=debug" } else { "lmbridge=warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> lmbridge::error::Result<()> {
    let settings = match cli.config {
        Some(ref path) => Settings::load(path)?.with_env(),
        None => Settings::from_env()?,
    };

    match cli.command {
        Commands::Config => {
            let resolved = LocalLlmConfig::resolve(&settings, None)?;
            println!("model_name = {:?}", resolved.model_name);
            println!(
                "function_calling_model_name = {:?}",
                resolved.function_calling_model_name
            );
            println!("lmstudio_url = {:?}", resolved.lmstudio_url);
            Ok(())
        }
        Commands::Chat(args) => handle_chat(args, &settings).await,
        Commands::Extract(args) => handle_extract(args, &settings).await,
    }
}

async fn handle_chat(args: ChatArgs, settings: &Settings) -> lmbridge::error::Result<()> {
    let history = History::new();
    if let Some(system) = args.system {
        history.push(ChatMessage::system(system));
    }

    let generation = GenerationSettings::builder()
        .maybe_temperature(args.temperature)
        .maybe_max_tokens(args.max_tokens)
        .build();

    let llm = LmStudioInterface::new(history, None, args.model.as_deref(), settings)?
        .with_settings(generation);

    if args.stream {
        let mut stream = llm.stream_generate(&args.prompt).await?;
        while let Some(delta) = stream.next().await {
            print!("{}", delta?);
            let _ = std::io::stdout().flush();
        }
        println!();
    } else {
        println!("{}", llm.generate(&args.prompt).await?);
    }
    Ok(())
}

async fn handle_extract(args: ExtractArgs, settings: &Settings) -> lmbridge::error::Result<()> {
    let schema: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&args.schema)?)?;

    let llm = LmStudioInterface::new(History::new(), None, None, settings)?
        .with_structured_attempts(args.attempts);
    let value = llm
        .structured_value(vec![ChatMessage::user(args.prompt)], schema, &args.name)
        .await?;

    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}
