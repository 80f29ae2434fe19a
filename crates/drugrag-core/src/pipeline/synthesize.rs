//! Per-sub-question answer generation

use crate::error::{RagError, Result};
use crate::llm::{ChatMessage, LLMClient};
use crate::types::{ChunkId, RetrievalResult, ScoredChunk, SubAnswer, SubAnswerStatus, SubQuestion};
use std::sync::Arc;

const SEPARATOR: &str = "\n\n";

pub struct Synthesizer {
    client: Arc<dyn LLMClient>,
    model: String,
    context_budget_chars: usize,
}

/// Passages selected for one prompt
#[derive(Debug, Clone, PartialEq)]
pub struct PromptContext {
    pub text: String,
    /// Ids of the chunks that made it into `text`, best first
    pub evidence: Vec<ChunkId>,
}

impl Synthesizer {
    pub fn new(client: Arc<dyn LLMClient>, model: impl Into<String>, context_budget_chars: usize) -> Self {
        Self {
            client,
            model: model.into(),
            context_budget_chars,
        }
    }

    /// Answer one sub-question from its retrieved chunks.
    ///
    /// With no chunks the model answers from general knowledge and the
    /// result is marked ungrounded. A failed or empty model reply becomes a
    /// failed sub-answer; only cancellation is returned as an error.
    pub async fn synthesize(&self, sub_question: &SubQuestion, retrieval: &RetrievalResult) -> Result<SubAnswer> {
        let (prompt, evidence, status) = if retrieval.is_empty() {
            (
                build_ungrounded_prompt(&sub_question.text),
                Vec::new(),
                SubAnswerStatus::Ungrounded,
            )
        } else {
            let context = select_context(&retrieval.hits, self.context_budget_chars);
            if context.evidence.len() < retrieval.len() {
                tracing::debug!(
                    "Dropped {} lowest-scoring chunks for sub-question {} to fit the context budget",
                    retrieval.len() - context.evidence.len(),
                    sub_question.ordinal
                );
            }
            (
                build_grounded_prompt(&context.text, &sub_question.text),
                context.evidence,
                SubAnswerStatus::Grounded,
            )
        };

        let messages = vec![
            ChatMessage::system("You are a medical expert answering questions about drugs."),
            ChatMessage::user(prompt),
        ];

        match self.client.chat_completion(&self.model, messages).await {
            Ok(text) if text.trim().is_empty() => {
                tracing::warn!(
                    "Answer generation returned nothing for '{}'",
                    sub_question.text
                );
                Ok(SubAnswer::failed(sub_question, "model returned an empty answer"))
            }
            Ok(text) => Ok(SubAnswer {
                ordinal: sub_question.ordinal,
                question: sub_question.text.clone(),
                text: text.trim().to_string(),
                evidence,
                status,
            }),
            Err(RagError::Cancelled) => Err(RagError::Cancelled),
            Err(e) => {
                tracing::warn!(
                    "Answer generation failed for '{}': {}",
                    sub_question.text,
                    e
                );
                Ok(SubAnswer::failed(sub_question, e.to_string()))
            }
        }
    }
}

/// Keep the longest best-first prefix of `hits` whose rendering fits `budget_chars`.
///
/// The top chunk is always kept, cut down to the budget when it alone is
/// too long.
pub fn select_context(hits: &[ScoredChunk], budget_chars: usize) -> PromptContext {
    let mut text = String::new();
    let mut used = 0;
    let mut evidence = Vec::new();

    for hit in hits {
        let passage = render_passage(hit);
        let separator = if evidence.is_empty() { 0 } else { SEPARATOR.len() };
        let cost = separator + passage.chars().count();

        if used + cost > budget_chars {
            if evidence.is_empty() {
                text = passage.chars().take(budget_chars.max(1)).collect();
                evidence.push(hit.chunk.id.clone());
            }
            break;
        }

        if separator > 0 {
            text.push_str(SEPARATOR);
        }
        text.push_str(&passage);
        used += cost;
        evidence.push(hit.chunk.id.clone());
    }

    PromptContext { text, evidence }
}

fn render_passage(hit: &ScoredChunk) -> String {
    match hit.chunk.source.title {
        Some(ref title) => format!("[{}] ({}) {}", hit.chunk.id, title, hit.chunk.text.trim()),
        None => format!("[{}] {}", hit.chunk.id, hit.chunk.text.trim()),
    }
}

fn build_grounded_prompt(context: &str, question: &str) -> String {
    format!(
        r#"Answer the question below using ONLY the information in the retrieved passages.
Do not make assumptions. Be concise and precise.

{}

Question: {}
Answer:"#,
        context, question
    )
}

fn build_ungrounded_prompt(question: &str) -> String {
    format!(
        r#"No reference passages were found for the question below.
Answer briefly from general medical knowledge and state that the answer is not backed by the reference corpus.

Question: {}
Answer:"#,
        question
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLLMClient;
    use crate::types::{Chunk, SourceRef};
    use uuid::Uuid;

    fn hit(id: &str, text: &str, score: f32) -> ScoredChunk {
        ScoredChunk {
            chunk: Arc::new(Chunk {
                id: ChunkId::new(id),
                text: text.to_string(),
                vector: vec![1.0],
                source: SourceRef {
                    document_id: "doc".into(),
                    title: None,
                },
                range: 0..text.len(),
            }),
            score,
        }
    }

    fn sub_question(text: &str) -> SubQuestion {
        SubQuestion {
            query_id: Uuid::new_v4(),
            ordinal: 1,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_select_context_keeps_best_prefix() {
        let hits = vec![
            hit("a", &"x".repeat(40), 0.9),
            hit("b", &"y".repeat(40), 0.8),
            hit("c", &"z".repeat(40), 0.7),
        ];
        // "[a] " + 40 = 44, second costs 2 + 44
        let context = select_context(&hits, 100);
        assert_eq!(context.evidence, vec![ChunkId::new("a"), ChunkId::new("b")]);
        assert!(context.text.contains("[b]"));
        assert!(!context.text.contains("[c]"));
    }

    #[test]
    fn test_select_context_truncates_oversized_top_chunk() {
        let hits = vec![hit("a", &"x".repeat(500), 0.9), hit("b", "short", 0.5)];
        let context = select_context(&hits, 50);
        assert_eq!(context.evidence, vec![ChunkId::new("a")]);
        assert_eq!(context.text.chars().count(), 50);
    }

    #[tokio::test]
    async fn test_grounded_answer_cites_sent_chunks() {
        let client = Arc::new(MockLLMClient::new(4));
        let synthesizer = Synthesizer::new(client.clone(), "answer", 10_000);
        let sq = sub_question("warfarin interactions");
        let retrieval = RetrievalResult {
            ordinal: 1,
            hits: vec![hit("w#0", "Warfarin interacts with NSAIDs.", 0.9)],
        };

        let answer = synthesizer.synthesize(&sq, &retrieval).await.unwrap();
        assert_eq!(answer.status, SubAnswerStatus::Grounded);
        assert_eq!(answer.ordinal, 1);
        assert_eq!(answer.text, "Answer to warfarin interactions");
        assert_eq!(answer.evidence, vec![ChunkId::new("w#0")]);

        let calls = client.chat_calls();
        assert_eq!(calls[0].model, "answer");
        assert!(calls[0].prompt().contains("Warfarin interacts with NSAIDs."));
    }

    #[tokio::test]
    async fn test_empty_retrieval_is_ungrounded() {
        let client = Arc::new(MockLLMClient::new(4));
        let synthesizer = Synthesizer::new(client.clone(), "answer", 10_000);
        let sq = sub_question("what is drug X?");

        let answer = synthesizer
            .synthesize(&sq, &RetrievalResult::empty(1))
            .await
            .unwrap();
        assert_eq!(answer.status, SubAnswerStatus::Ungrounded);
        assert!(answer.evidence.is_empty());
        assert!(client.chat_calls()[0].prompt().contains("general medical knowledge"));
    }

    #[tokio::test]
    async fn test_model_failure_is_recorded() {
        let client = Arc::new(MockLLMClient::new(4).with_chat(|_, _| {
            Err(RagError::RateLimited {
                retry_after_secs: None,
            })
        }));
        let synthesizer = Synthesizer::new(client, "answer", 10_000);
        let sq = sub_question("q");

        let answer = synthesizer
            .synthesize(&sq, &RetrievalResult::empty(1))
            .await
            .unwrap();
        assert!(answer.is_failed());
        assert_eq!(answer.text, "Error generating answer.");
    }

    #[tokio::test]
    async fn test_blank_reply_is_failure() {
        let client = Arc::new(MockLLMClient::new(4).with_chat(|_, _| Ok("  ".into())));
        let synthesizer = Synthesizer::new(client, "answer", 10_000);
        let answer = synthesizer
            .synthesize(&sub_question("q"), &RetrievalResult::empty(1))
            .await
            .unwrap();
        assert!(answer.is_failed());
    }
}
