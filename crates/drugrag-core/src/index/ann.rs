//! HNSW approximate nearest neighbor graph over index positions

use super::cosine_similarity;
use crate::types::Chunk;
use instant_distance::{Builder, HnswMap, Search};
use std::sync::Arc;

/// Wrapper for f32 vectors implementing instant_distance::Point
#[derive(Clone)]
struct EmbeddingPoint {
    values: Vec<f32>,
}

impl instant_distance::Point for EmbeddingPoint {
    fn distance(&self, other: &Self) -> f32 {
        // Cosine distance = 1.0 - cosine_similarity
        1.0 - cosine_similarity(&self.values, &other.values)
    }
}

/// Graph mapping nearest points back to their insertion position
pub(crate) struct AnnGraph {
    map: HnswMap<EmbeddingPoint, usize>,
}

impl AnnGraph {
    pub(crate) fn build(chunks: &[Arc<Chunk>]) -> Self {
        let (points, positions): (Vec<EmbeddingPoint>, Vec<usize>) = chunks
            .iter()
            .enumerate()
            .map(|(pos, chunk)| {
                (
                    EmbeddingPoint {
                        values: chunk.vector.clone(),
                    },
                    pos,
                )
            })
            .unzip();

        Self {
            map: Builder::default().build(points, positions),
        }
    }

    /// Up to `k` (position, cosine similarity) pairs, unordered
    pub(crate) fn search(&self, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        let query_point = EmbeddingPoint {
            values: query.to_vec(),
        };
        let mut search = Search::default();

        self.map
            .search(&query_point, &mut search)
            .take(k)
            .map(|item| (*item.value, 1.0 - item.distance))
            .collect()
    }
}
