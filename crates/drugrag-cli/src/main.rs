//! DrugRAG CLI
//!
//! Question answering over an indexed drug-information corpus.

use anyhow::Result;
use clap::Parser;
use drugrag_core::error::exit_codes;
use drugrag_core::{Config, RagError};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod app;
mod commands;
mod output;

use app::{Cli, Commands};

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is normal
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(&cli);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            let code = e
                .downcast_ref::<RagError>()
                .map(RagError::exit_code)
                .unwrap_or(exit_codes::GENERAL_ERROR);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = match cli.config {
        Some(ref path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    config.apply_env();
    config.validate()?;

    match cli.command {
        Commands::Serve(args) => commands::serve::run(args, config).await,
        Commands::Query(args) => commands::query::run(args, config, cli.format).await,
        Commands::Index(args) => commands::index::run(args, config, cli.format).await,
        Commands::Status(args) => commands::status::run(args, &config, cli.format).await,
    }
}

/// `LOG_LEVEL` wins over `RUST_LOG`; `--verbose` forces debug
fn init_tracing(cli: &Cli) {
    let default_level = match cli.command {
        Commands::Serve(_) => "info",
        _ => "warn",
    };

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else if let Some(level) = std::env::var("LOG_LEVEL").ok().filter(|l| !l.trim().is_empty()) {
        EnvFilter::try_new(level.trim().to_lowercase())
            .unwrap_or_else(|_| EnvFilter::new(default_level))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
