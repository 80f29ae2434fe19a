//! Corpus loading: metadata CSV rows or a directory of text files

use super::chunker::{chunk_text, CHUNK_OVERLAP_CHARS, CHUNK_SIZE_CHARS};
use super::VectorIndex;
use crate::error::{RagError, Result};
use crate::llm::Embedder;
use crate::types::{Chunk, ChunkId, SourceRef};
use serde::Deserialize;
use std::ops::Range;
use std::path::Path;
use walkdir::WalkDir;

pub const DEFAULT_BATCH_SIZE: usize = 32;

/// A chunk waiting for its embedding
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkDraft {
    pub id: ChunkId,
    pub text: String,
    pub source: SourceRef,
    pub range: Range<usize>,
}

impl ChunkDraft {
    fn into_chunk(self, vector: Vec<f32>) -> Chunk {
        Chunk {
            id: self.id,
            text: self.text,
            vector,
            source: self.source,
            range: self.range,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MetadataRow {
    #[serde(default)]
    drug_name: Option<String>,
    #[serde(default)]
    drugbank_id: Option<String>,
    #[serde(default)]
    chunk_index: Option<usize>,
    chunk_text: String,
}

/// Read a metadata CSV with `drug_name, drugbank_id, chunk_index, chunk_text` columns.
///
/// Rows are already chunked, so each row becomes one draft covering its
/// whole text. Rows with blank text are skipped.
pub fn load_metadata_csv(path: &Path) -> Result<Vec<ChunkDraft>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut drafts = Vec::new();

    for (row_num, row) in reader.deserialize::<MetadataRow>().enumerate() {
        let row = row?;
        if row.chunk_text.trim().is_empty() {
            tracing::debug!("Skipping empty chunk at row {}", row_num + 1);
            continue;
        }

        let document_id = row
            .drugbank_id
            .clone()
            .filter(|s| !s.trim().is_empty())
            .or_else(|| row.drug_name.clone())
            .unwrap_or_else(|| format!("row{}", row_num + 1));
        let position = row.chunk_index.unwrap_or(row_num);

        drafts.push(ChunkDraft {
            id: ChunkId::new(format!("{}#{}", document_id, position)),
            range: 0..row.chunk_text.len(),
            text: row.chunk_text,
            source: SourceRef {
                document_id,
                title: row.drug_name,
            },
        });
    }

    tracing::info!("Loaded {} chunks from {}", drafts.len(), path.display());
    Ok(drafts)
}

/// Walk `root` and chunk every file whose relative path matches `pattern`
pub fn load_text_dir(root: &Path, pattern: &str) -> Result<Vec<ChunkDraft>> {
    if !root.is_dir() {
        return Err(RagError::InvalidInput(format!(
            "not a directory: {}",
            root.display()
        )));
    }
    let matcher = glob::Pattern::new(pattern)?;
    let mut drafts = Vec::new();

    let mut entries: Vec<_> = WalkDir::new(root)
        .into_iter()
        .collect::<std::result::Result<Vec<_>, _>>()?;
    entries.sort_by(|a, b| a.path().cmp(b.path()));

    for entry in entries {
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .replace('\\', "/");
        if !matcher.matches(&relative) {
            continue;
        }

        let content = std::fs::read_to_string(entry.path())?;
        let title = entry
            .path()
            .file_stem()
            .map(|s| s.to_string_lossy().to_string());

        for (n, span) in chunk_text(&content, CHUNK_SIZE_CHARS, CHUNK_OVERLAP_CHARS)
            .into_iter()
            .enumerate()
        {
            drafts.push(ChunkDraft {
                id: ChunkId::new(format!("{}#{}", relative, n)),
                text: span.text,
                source: SourceRef {
                    document_id: relative.clone(),
                    title: title.clone(),
                },
                range: span.range,
            });
        }
    }

    tracing::info!(
        "Chunked {} spans from {} matching {}",
        drafts.len(),
        root.display(),
        pattern
    );
    Ok(drafts)
}

/// Embed drafts in batches and collect them into a new index
pub async fn build_index(
    drafts: Vec<ChunkDraft>,
    embedder: &dyn Embedder,
    batch_size: usize,
) -> Result<VectorIndex> {
    let index = VectorIndex::new(embedder.dimensions());
    let batch_size = if batch_size > 0 {
        batch_size
    } else {
        DEFAULT_BATCH_SIZE
    };
    let total = drafts.len();
    let mut done = 0;

    let mut drafts = drafts.into_iter().peekable();
    while drafts.peek().is_some() {
        let batch: Vec<ChunkDraft> = drafts.by_ref().take(batch_size).collect();
        let texts: Vec<String> = batch.iter().map(|d| d.text.clone()).collect();
        let vectors = embedder.embed_batch(&texts).await?;

        let chunks = batch
            .into_iter()
            .zip(vectors)
            .map(|(draft, vector)| draft.into_chunk(vector))
            .collect();
        index.add_batch(chunks)?;

        done += texts.len();
        tracing::debug!("Embedded {}/{} chunks", done, total);
    }

    tracing::info!("Built index of {} chunks with {}", index.len(), embedder.model_name());
    Ok(index)
}
