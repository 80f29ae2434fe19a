//! JSON persistence of a built index

use super::VectorIndex;
use crate::error::{RagError, Result};
use crate::types::Chunk;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    dimensions: usize,
    #[serde(default)]
    embedding_model: Option<String>,
    chunks: Vec<Chunk>,
}

/// Summary of a snapshot file without loading it into an index
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotInfo {
    pub dimensions: usize,
    pub embedding_model: Option<String>,
    pub chunk_count: usize,
    pub document_count: usize,
}

impl VectorIndex {
    /// Write every chunk and its vector to `path`
    pub fn save_snapshot(&self, path: &Path, embedding_model: Option<&str>) -> Result<()> {
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            dimensions: self.dimensions(),
            embedding_model: embedding_model.map(str::to_string),
            chunks: self
                .chunks()?
                .into_iter()
                .map(|c| Chunk::clone(&c))
                .collect(),
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut writer, &snapshot)?;
        writer.flush()?;

        tracing::info!(
            "Saved snapshot of {} chunks to {}",
            snapshot.chunks.len(),
            path.display()
        );
        Ok(())
    }

    /// Rebuild an index from a snapshot, returning it with its embedding model
    pub fn load_snapshot(path: &Path) -> Result<(Self, Option<String>)> {
        let snapshot = read_snapshot(path)?;
        let index = VectorIndex::new(snapshot.dimensions);
        index.add_batch(snapshot.chunks)?;
        Ok((index, snapshot.embedding_model))
    }
}

fn read_snapshot(path: &Path) -> Result<Snapshot> {
    let reader = BufReader::new(File::open(path)?);
    let snapshot: Snapshot = serde_json::from_reader(reader)?;
    if snapshot.version != SNAPSHOT_VERSION {
        return Err(RagError::Config(format!(
            "unsupported snapshot version {} in {}",
            snapshot.version,
            path.display()
        )));
    }
    Ok(snapshot)
}

/// Read summary information from a snapshot
pub fn snapshot_info(path: &Path) -> Result<SnapshotInfo> {
    let snapshot = read_snapshot(path)?;
    let documents: std::collections::HashSet<&str> = snapshot
        .chunks
        .iter()
        .map(|c| c.source.document_id.as_str())
        .collect();
    Ok(SnapshotInfo {
        dimensions: snapshot.dimensions,
        embedding_model: snapshot.embedding_model.clone(),
        chunk_count: snapshot.chunks.len(),
        document_count: documents.len(),
    })
}
