//! Vector index
//!
//! Chunk storage, similarity search, corpus ingest and snapshot
//! persistence.

mod ann;
mod chunker;
mod ingest;
mod snapshot;
mod vector_index;

pub use chunker::{chunk_text, TextSpan, CHUNK_OVERLAP_CHARS, CHUNK_SIZE_CHARS};
pub use ingest::{build_index, load_metadata_csv, load_text_dir, ChunkDraft, DEFAULT_BATCH_SIZE};
pub use snapshot::{snapshot_info, SnapshotInfo};
pub use vector_index::VectorIndex;

/// Cosine similarity between two vectors; 0.0 for mismatched or zero vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }
}
