//! Combining sub-answers into one final answer

use crate::error::{RagError, Result};
use crate::llm::{ChatMessage, LLMClient};
use crate::types::{FinalAnswer, Query, SubAnswer, SubAnswerStatus};
use std::sync::Arc;

pub const ALL_FAILED_TEXT: &str =
    "Sorry, this question could not be answered because the answering service failed for every part of it. Please try again later.";

pub struct Aggregator {
    client: Arc<dyn LLMClient>,
    model: String,
}

impl Aggregator {
    pub fn new(client: Arc<dyn LLMClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    /// Merge `sub_answers` (any order) into the answer for `query`.
    ///
    /// A lone grounded answer is returned verbatim without a model call.
    /// Failed and ungrounded parts are always called out in a trailing note,
    /// and a failed combine call falls back to listing the parts. Only
    /// cancellation is returned as an error.
    pub async fn aggregate(&self, query: &Query, mut sub_answers: Vec<SubAnswer>) -> Result<FinalAnswer> {
        sub_answers.sort_by_key(|a| a.ordinal);

        let usable: Vec<&SubAnswer> = sub_answers.iter().filter(|a| !a.is_failed()).collect();
        let notes = caveat_notes(&sub_answers);

        let text = match usable.as_slice() {
            [] => {
                tracing::warn!("All {} sub-answers failed", sub_answers.len());
                ALL_FAILED_TEXT.to_string()
            }
            [only] => with_notes(only.text.clone(), &notes),
            _ => {
                let combined = match self.combine(query, &usable).await {
                    Ok(text) => text,
                    Err(RagError::Cancelled) => return Err(RagError::Cancelled),
                    Err(e) => {
                        tracing::warn!("Final answer combination failed: {}", e);
                        concatenate(&usable)
                    }
                };
                with_notes(combined, &notes)
            }
        };

        Ok(FinalAnswer {
            query_id: query.id(),
            text,
            sub_answers,
        })
    }

    async fn combine(&self, query: &Query, usable: &[&SubAnswer]) -> Result<String> {
        let messages = vec![
            ChatMessage::system("You are a medical expert."),
            ChatMessage::user(build_combine_prompt(query.text(), usable)),
        ];
        let text = self.client.chat_completion(&self.model, messages).await?;
        if text.trim().is_empty() {
            return Err(RagError::UpstreamUnavailable(
                "model returned an empty final answer".to_string(),
            ));
        }
        Ok(text.trim().to_string())
    }
}

fn build_combine_prompt(query: &str, usable: &[&SubAnswer]) -> String {
    let parts = usable
        .iter()
        .enumerate()
        .map(|(i, a)| {
            let marker = if a.status == SubAnswerStatus::Ungrounded {
                " (not supported by the reference corpus)"
            } else {
                ""
            };
            format!("{}. {}{}\n   {}", i + 1, a.question, marker, a.text)
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"The user asked the following question:

{}

Here are the answers to its sub-questions:

{}

Combine these into a single, concise, coherent answer. Only use the provided information.
Final Answer:"#,
        query, parts
    )
}

fn concatenate(usable: &[&SubAnswer]) -> String {
    usable
        .iter()
        .enumerate()
        .map(|(i, a)| format!("{}. {}", i + 1, a.text))
        .collect::<Vec<_>>()
        .join("\n")
}

fn caveat_notes(sub_answers: &[SubAnswer]) -> Vec<String> {
    let list = |status_matches: fn(&SubAnswer) -> bool| {
        sub_answers
            .iter()
            .filter(|&a| status_matches(a))
            .map(|a| format!("\"{}\"", a.question))
            .collect::<Vec<_>>()
    };

    let mut notes = Vec::new();
    let ungrounded = list(|a| a.status == SubAnswerStatus::Ungrounded);
    if !ungrounded.is_empty() {
        notes.push(format!(
            "Note: no supporting evidence was found in the reference corpus for {}; that part of the answer relies on general knowledge and should be verified.",
            ungrounded.join(", ")
        ));
    }
    let failed = list(SubAnswer::is_failed);
    if !failed.is_empty() && failed.len() < sub_answers.len() {
        notes.push(format!(
            "Note: the answer is incomplete because {} could not be answered.",
            failed.join(", ")
        ));
    }
    notes
}

fn with_notes(text: String, notes: &[String]) -> String {
    if notes.is_empty() {
        return text;
    }
    format!("{}\n\n{}", text, notes.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLLMClient;
    use crate::types::{ChunkId, SubQuestion};

    fn query() -> Query {
        Query::new("What about ibuprofen and warfarin?", 1000).unwrap()
    }

    fn answer(ordinal: usize, text: &str, status: SubAnswerStatus) -> SubAnswer {
        SubAnswer {
            ordinal,
            question: format!("q{}", ordinal),
            text: text.to_string(),
            evidence: vec![ChunkId::new(format!("c{}", ordinal))],
            status,
        }
    }

    fn failed(ordinal: usize) -> SubAnswer {
        SubAnswer::failed(
            &SubQuestion {
                query_id: uuid::Uuid::new_v4(),
                ordinal,
                text: format!("q{}", ordinal),
            },
            "boom",
        )
    }

    #[tokio::test]
    async fn test_single_grounded_answer_passes_through() {
        let client = Arc::new(MockLLMClient::new(4));
        let aggregator = Aggregator::new(client.clone(), "answer");
        let q = query();

        let a = answer(0, "Warfarin is an anticoagulant.", SubAnswerStatus::Grounded);
        let result = aggregator.aggregate(&q, vec![a.clone()]).await.unwrap();
        assert_eq!(result.text, a.text);
        assert_eq!(result.query_id, q.id());
        assert_eq!(client.chat_call_count(), 0);

        // Feeding the result back in leaves it unchanged
        let again = aggregator
            .aggregate(&q, vec![answer(0, &result.text, SubAnswerStatus::Grounded)])
            .await
            .unwrap();
        assert_eq!(again.text, result.text);
    }

    #[tokio::test]
    async fn test_combines_in_ordinal_order() {
        let client = Arc::new(MockLLMClient::new(4).with_chat(|_, _| Ok("Combined.".into())));
        let aggregator = Aggregator::new(client.clone(), "answer");

        let result = aggregator
            .aggregate(
                &query(),
                vec![
                    answer(1, "second", SubAnswerStatus::Grounded),
                    answer(0, "first", SubAnswerStatus::Grounded),
                ],
            )
            .await
            .unwrap();
        assert_eq!(result.text, "Combined.");
        assert_eq!(result.sub_answers[0].ordinal, 0);

        let prompt = client.chat_calls()[0].prompt().to_string();
        let first = prompt.find("first").unwrap();
        let second = prompt.find("second").unwrap();
        assert!(first < second);
    }

    #[tokio::test]
    async fn test_failed_part_is_noted_and_excluded() {
        let client = Arc::new(MockLLMClient::new(4).with_chat(|_, _| Ok("Combined.".into())));
        let aggregator = Aggregator::new(client.clone(), "answer");

        let result = aggregator
            .aggregate(
                &query(),
                vec![
                    answer(0, "first", SubAnswerStatus::Grounded),
                    failed(1),
                    answer(2, "third", SubAnswerStatus::Grounded),
                ],
            )
            .await
            .unwrap();
        assert!(result.text.starts_with("Combined."));
        assert!(result.text.contains("\"q1\" could not be answered"));
        assert!(!client.chat_calls()[0].prompt().contains("Error generating answer."));
        assert_eq!(result.sub_answers.len(), 3);
    }

    #[tokio::test]
    async fn test_ungrounded_single_answer_gets_note() {
        let aggregator = Aggregator::new(Arc::new(MockLLMClient::new(4)), "answer");
        let result = aggregator
            .aggregate(&query(), vec![answer(0, "From memory.", SubAnswerStatus::Ungrounded)])
            .await
            .unwrap();
        assert!(result.text.starts_with("From memory."));
        assert!(result.text.contains("no supporting evidence"));
    }

    #[tokio::test]
    async fn test_all_failed_skips_model() {
        let client = Arc::new(MockLLMClient::new(4));
        let aggregator = Aggregator::new(client.clone(), "answer");
        let result = aggregator
            .aggregate(&query(), vec![failed(0), failed(1)])
            .await
            .unwrap();
        assert_eq!(result.text, ALL_FAILED_TEXT);
        assert_eq!(client.chat_call_count(), 0);
    }

    #[tokio::test]
    async fn test_combine_failure_falls_back_to_list() {
        let client = Arc::new(MockLLMClient::new(4).with_chat(|_, _| {
            Err(RagError::UpstreamUnavailable("down".into()))
        }));
        let aggregator = Aggregator::new(client, "answer");
        let result = aggregator
            .aggregate(
                &query(),
                vec![
                    answer(0, "first", SubAnswerStatus::Grounded),
                    answer(1, "second", SubAnswerStatus::Grounded),
                ],
            )
            .await
            .unwrap();
        assert_eq!(result.text, "1. first\n2. second");
    }
}
