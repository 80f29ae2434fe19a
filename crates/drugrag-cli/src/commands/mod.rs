//! CLI command handlers

pub mod index;
pub mod query;
pub mod serve;
pub mod status;

use crate::app::SnapshotArgs;
use anyhow::Result;
use drugrag_core::{Config, RagError, SearchMode, VectorIndex};
use std::path::PathBuf;
use std::sync::Arc;

/// Snapshot path from the flag, else from configuration
pub(crate) fn snapshot_path(args: &SnapshotArgs, config: &Config) -> Result<PathBuf> {
    args.snapshot
        .clone()
        .or_else(|| config.corpus.snapshot.clone())
        .ok_or_else(|| {
            RagError::Config(
                "no index snapshot configured; pass --snapshot, set DRUGRAG_SNAPSHOT or run `drugrag index`"
                    .to_string(),
            )
            .into()
        })
}

/// Load the snapshot and prepare it for the configured search mode
pub(crate) fn load_index(args: &SnapshotArgs, config: &Config) -> Result<Arc<VectorIndex>> {
    let path = snapshot_path(args, config)?;
    let (index, model) = VectorIndex::load_snapshot(&path)?;

    if let Some(model) = model {
        if model != config.llm_service.embedding_model {
            tracing::warn!(
                "Snapshot was embedded with {} but queries will use {}",
                model,
                config.llm_service.embedding_model
            );
        }
    }
    if config.pipeline.search_mode == SearchMode::Approximate {
        index.build_ann(config.pipeline.ann_threshold)?;
    }

    tracing::info!("Loaded {} chunks from {}", index.len(), path.display());
    Ok(Arc::new(index))
}
