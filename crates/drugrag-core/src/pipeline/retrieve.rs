//! Sub-question retrieval against the vector index

use crate::config::SearchMode;
use crate::error::{RagError, Result};
use crate::index::VectorIndex;
use crate::llm::Embedder;
use crate::types::RetrievalResult;
use std::sync::Arc;

pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<VectorIndex>,
    mode: SearchMode,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<VectorIndex>, mode: SearchMode) -> Self {
        Self {
            embedder,
            index,
            mode,
        }
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    /// Embed `text` and return its `k` nearest chunks.
    ///
    /// An empty index yields an empty result without an embedding call.
    /// Embedding errors, dimension mismatches and a poisoned index are
    /// returned to the caller.
    pub async fn retrieve(&self, ordinal: usize, text: &str, k: usize) -> Result<RetrievalResult> {
        if self.index.try_len()? == 0 {
            tracing::debug!("Index is empty; no context for sub-question {}", ordinal);
            return Ok(RetrievalResult::empty(ordinal));
        }

        let vector = self.embedder.embed(text).await?;
        let hits = match self.index.search_with(&vector, k, self.mode) {
            Ok(hits) => hits,
            Err(RagError::EmptyIndex) => Vec::new(),
            Err(e) => return Err(e),
        };

        tracing::debug!(
            "Retrieved {} chunks for sub-question {} (top score {:.3})",
            hits.len(),
            ordinal,
            hits.first().map(|h| h.score).unwrap_or(0.0)
        );
        Ok(RetrievalResult { ordinal, hits })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{hashed_embedding, HttpEmbedder, MockLLMClient};
    use crate::types::{Chunk, ChunkId, SourceRef};

    const DIMS: usize = 32;

    fn corpus(texts: &[&str]) -> Arc<VectorIndex> {
        let index = VectorIndex::new(DIMS);
        index
            .add_batch(
                texts
                    .iter()
                    .enumerate()
                    .map(|(i, text)| Chunk {
                        id: ChunkId::new(format!("c{}", i)),
                        text: text.to_string(),
                        vector: hashed_embedding(text, DIMS),
                        source: SourceRef {
                            document_id: "doc".into(),
                            title: None,
                        },
                        range: 0..text.len(),
                    })
                    .collect(),
            )
            .unwrap();
        Arc::new(index)
    }

    fn retriever(client: Arc<MockLLMClient>, dims: usize, index: Arc<VectorIndex>) -> Retriever {
        let embedder = Arc::new(HttpEmbedder::new(client, "mock", dims, 8191));
        Retriever::new(embedder, index, SearchMode::Exact)
    }

    #[tokio::test]
    async fn test_returns_most_similar_first() {
        let index = corpus(&[
            "metformin lowers blood glucose",
            "warfarin bleeding risk with nsaids",
            "aspirin platelet inhibition",
        ]);
        let r = retriever(Arc::new(MockLLMClient::new(DIMS)), DIMS, index);

        let result = r.retrieve(2, "warfarin bleeding", 2).await.unwrap();
        assert_eq!(result.ordinal, 2);
        assert_eq!(result.len(), 2);
        assert_eq!(result.hits[0].chunk.id.as_str(), "c1");
    }

    #[tokio::test]
    async fn test_empty_index_skips_embedding() {
        let client = Arc::new(MockLLMClient::new(DIMS));
        let r = retriever(client.clone(), DIMS, Arc::new(VectorIndex::new(DIMS)));

        let result = r.retrieve(0, "anything", 5).await.unwrap();
        assert!(result.is_empty());
        assert_eq!(client.embed_call_count(), 0);
    }

    #[tokio::test]
    async fn test_poisoned_index_is_an_error() {
        let client = Arc::new(MockLLMClient::new(DIMS));
        let index = corpus(&["warfarin"]);
        index.poison_lock();
        let r = retriever(client.clone(), DIMS, index);

        assert!(matches!(r.retrieve(0, "warfarin", 3).await, Err(RagError::Other(_))));
        assert_eq!(client.embed_call_count(), 0);
    }

    #[tokio::test]
    async fn test_embedding_failure_propagates() {
        let client = Arc::new(MockLLMClient::new(DIMS).with_embed_failure(|_| true));
        let r = retriever(client, DIMS, corpus(&["warfarin"]));
        assert!(matches!(
            r.retrieve(0, "warfarin", 3).await,
            Err(RagError::UpstreamUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_reported() {
        let client = Arc::new(MockLLMClient::new(8));
        let r = retriever(client, 8, corpus(&["warfarin"]));
        assert!(matches!(
            r.retrieve(0, "warfarin", 3).await,
            Err(RagError::DimensionMismatch {
                expected: DIMS,
                actual: 8
            })
        ));
    }
}
