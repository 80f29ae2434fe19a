//! In-memory chunk store with cosine similarity search

use super::ann::AnnGraph;
use super::cosine_similarity;
use crate::config::SearchMode;
use crate::error::{RagError, Result};
use crate::types::{Chunk, ChunkId, ScoredChunk};
use std::collections::HashSet;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Chunk vectors of one fixed dimensionality.
///
/// Searches take the read lock and never await; `add`/`add_batch` take the
/// write lock, so a mutation excludes every reader until it finishes.
pub struct VectorIndex {
    dimensions: usize,
    state: RwLock<IndexState>,
}

#[derive(Default)]
struct IndexState {
    /// Insertion order; the position breaks score ties
    chunks: Vec<Arc<Chunk>>,
    ids: HashSet<ChunkId>,
    ann: Option<AnnGraph>,
}

impl VectorIndex {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            state: RwLock::new(IndexState::default()),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Chunk count; 0 when the lock is poisoned
    pub fn len(&self) -> usize {
        self.try_len().unwrap_or(0)
    }

    /// Chunk count, failing when the lock is poisoned
    pub fn try_len(&self) -> Result<usize> {
        Ok(self.read()?.chunks.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether an HNSW graph is currently built
    pub fn has_ann(&self) -> bool {
        self.read().map(|s| s.ann.is_some()).unwrap_or(false)
    }

    /// All chunks in insertion order
    pub fn chunks(&self) -> Result<Vec<Arc<Chunk>>> {
        Ok(self.read()?.chunks.clone())
    }

    /// Insert one chunk
    pub fn add(&self, chunk: Chunk) -> Result<()> {
        self.add_batch(vec![chunk])
    }

    /// Insert chunks atomically: either all are added or none
    pub fn add_batch(&self, chunks: Vec<Chunk>) -> Result<()> {
        let mut state = self.write()?;

        let mut batch_ids = HashSet::with_capacity(chunks.len());
        for chunk in &chunks {
            self.check_vector(&chunk.vector)?;
            if state.ids.contains(&chunk.id) || !batch_ids.insert(chunk.id.clone()) {
                return Err(RagError::InvalidInput(format!(
                    "duplicate chunk id: {}",
                    chunk.id
                )));
            }
        }

        for chunk in chunks {
            state.ids.insert(chunk.id.clone());
            state.chunks.push(Arc::new(chunk));
        }
        // Any graph built before this write no longer covers the corpus.
        state.ann = None;
        Ok(())
    }

    /// Build the HNSW graph when the corpus holds at least `threshold` chunks.
    ///
    /// Returns whether a graph is available afterwards.
    pub fn build_ann(&self, threshold: usize) -> Result<bool> {
        let mut state = self.write()?;
        if state.chunks.len() < threshold.max(1) {
            tracing::debug!(
                "Skipping ANN index build: {} chunks < {} threshold",
                state.chunks.len(),
                threshold
            );
            state.ann = None;
            return Ok(false);
        }
        let graph = AnnGraph::build(&state.chunks);
        tracing::info!("Built ANN index with {} chunks", state.chunks.len());
        state.ann = Some(graph);
        Ok(true)
    }

    /// Exact top-k search
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        self.search_with(query, k, SearchMode::Exact)
    }

    /// Top-k chunks by cosine similarity, best first.
    ///
    /// Equal scores keep insertion order. `Approximate` uses the HNSW graph
    /// when one is built and scans exactly otherwise.
    pub fn search_with(&self, query: &[f32], k: usize, mode: SearchMode) -> Result<Vec<ScoredChunk>> {
        let state = self.read()?;
        if state.chunks.is_empty() {
            return Err(RagError::EmptyIndex);
        }
        if query.len() != self.dimensions {
            return Err(RagError::DimensionMismatch {
                expected: self.dimensions,
                actual: query.len(),
            });
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, f32)> = match (&state.ann, mode) {
            (Some(graph), SearchMode::Approximate) => graph.search(query, k),
            _ => state
                .chunks
                .iter()
                .enumerate()
                .map(|(pos, chunk)| (pos, cosine_similarity(query, &chunk.vector)))
                .collect(),
        };

        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.dedup_by_key(|(pos, _)| *pos);
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(pos, score)| ScoredChunk {
                chunk: Arc::clone(&state.chunks[pos]),
                score,
            })
            .collect())
    }

    fn check_vector(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimensions {
            return Err(RagError::DimensionMismatch {
                expected: self.dimensions,
                actual: vector.len(),
            });
        }
        if vector.iter().any(|x| !x.is_finite()) {
            return Err(RagError::InvalidInput(
                "chunk vector contains non-finite values".to_string(),
            ));
        }
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, IndexState>> {
        self.state
            .read()
            .map_err(|e| RagError::Other(anyhow::anyhow!("index lock poisoned: {}", e)))
    }

    /// Poison the state lock by panicking while holding it
    #[cfg(test)]
    pub(crate) fn poison_lock(&self) {
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = self.state.write();
            panic!("poisoning index lock");
        }));
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, IndexState>> {
        self.state
            .write()
            .map_err(|e| RagError::Other(anyhow::anyhow!("index lock poisoned: {}", e)))
    }
}
