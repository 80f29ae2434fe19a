//! Index command

use crate::app::{IndexArgs, OutputFormat};
use crate::output;
use anyhow::Result;
use drugrag_core::index::{build_index, load_metadata_csv, load_text_dir, snapshot_info};
use drugrag_core::{Config, Embedder, HttpEmbedder, HttpLLMClient, LLMClient, RagError};
use std::sync::Arc;

pub async fn run(args: IndexArgs, config: Config, format: OutputFormat) -> Result<()> {
    let out = args
        .out
        .clone()
        .or_else(|| config.corpus.snapshot.clone())
        .ok_or_else(|| RagError::Config("pass --out or set corpus.snapshot".to_string()))?;

    let drafts = match (&args.csv, &args.dir) {
        (Some(csv), _) => load_metadata_csv(csv)?,
        (None, Some(dir)) => load_text_dir(dir, &args.pattern)?,
        (None, None) => {
            return Err(RagError::InvalidInput("pass --csv or --dir".to_string()).into())
        }
    };
    if drafts.is_empty() {
        return Err(RagError::InvalidInput("corpus contains no text to index".to_string()).into());
    }

    let client: Arc<dyn LLMClient> =
        Arc::new(HttpLLMClient::new(config.llm_service.clone(), &config.retry)?);
    let embedder = HttpEmbedder::from_config(client, &config.llm_service)?;

    eprintln!(
        "Embedding {} chunks with {} ({} dimensions)...",
        drafts.len(),
        embedder.model_name(),
        embedder.dimensions()
    );
    let index = build_index(drafts, &embedder, args.batch_size).await?;
    index.save_snapshot(&out, Some(embedder.model_name()))?;

    let info = snapshot_info(&out)?;
    print!("{}", output::format_status(&out, &info, &config, format)?);
    Ok(())
}
