//! Query decomposition into independent sub-questions

use crate::error::{RagError, Result};
use crate::llm::{ChatMessage, LLMClient};
use crate::types::{Query, SubQuestion};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;
use std::sync::Arc;

lazy_static! {
    /// Enumeration markers a model puts in front of list items. Numeric and
    /// letter markers need trailing whitespace so decimal doses survive.
    static ref LIST_MARKER: Regex =
        Regex::new(r"^\s*(?:(?:\d+|[a-zA-Z]|Q\d+)\s*[.):]\s+|[-*•]\s*)").unwrap();

    /// Words and separators that join several asks in one query
    static ref MULTI_PART: Regex = Regex::new(
        r"(?i)\b(?:and|or|versus|vs\.?|between|compare[ds]?|comparison|both|as well as|along with|interactions?)\b|[;,&/]"
    )
    .unwrap();
}

/// Splits queries with a generation model
pub struct Decomposer {
    client: Arc<dyn LLMClient>,
    model: String,
}

impl Decomposer {
    pub fn new(client: Arc<dyn LLMClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    /// Split `query` into between 1 and `max_sub_questions` sub-questions.
    ///
    /// A query without multi-part structure, or a model reply that yields
    /// fewer than two usable items, becomes a single sub-question holding
    /// the original text. Transient provider errors and cancellation are
    /// returned; any other model failure falls back to that identity case.
    pub async fn decompose(&self, query: &Query, max_sub_questions: usize) -> Result<Vec<SubQuestion>> {
        if max_sub_questions <= 1 || !has_decomposable_structure(query.text()) {
            tracing::debug!("Query has no decomposable structure; using it as-is");
            return Ok(identity(query));
        }

        let messages = vec![
            ChatMessage::system(
                "You are an expert in drug information. You split user questions into \
                 independent, self-contained sub-questions.",
            ),
            ChatMessage::user(build_decomposition_prompt(query.text(), max_sub_questions)),
        ];

        let response = match self.client.chat_completion(&self.model, messages).await {
            Ok(text) => text,
            Err(e) if e.is_transient() || matches!(e, RagError::Cancelled) => return Err(e),
            Err(e) => {
                tracing::warn!("Decomposition failed; using original query. Error: {}", e);
                return Ok(identity(query));
            }
        };

        let parts = parse_sub_questions(&response, max_sub_questions);
        if parts.len() < 2 {
            tracing::debug!(
                "Decomposition produced {} usable items; using original query",
                parts.len()
            );
            return Ok(identity(query));
        }

        tracing::debug!("Decomposed query into {} sub-questions", parts.len());
        Ok(parts
            .into_iter()
            .enumerate()
            .map(|(ordinal, text)| SubQuestion {
                query_id: query.id(),
                ordinal,
                text,
            })
            .collect())
    }
}

fn identity(query: &Query) -> Vec<SubQuestion> {
    vec![SubQuestion {
        query_id: query.id(),
        ordinal: 0,
        text: query.text().to_string(),
    }]
}

/// Whether the query plausibly asks more than one thing
pub fn has_decomposable_structure(text: &str) -> bool {
    text.matches('?').count() >= 2 || MULTI_PART.is_match(text)
}

fn build_decomposition_prompt(query: &str, max_sub_questions: usize) -> String {
    format!(
        r#"Split the following user query into up to {} independent sub-questions.
Return each sub-question on a separate line, with no numbering and no other text.
If the query asks only one thing, return it unchanged on a single line.

User query: "{}""#,
        max_sub_questions, query
    )
}

/// Extract sub-questions from a model reply.
///
/// Accepts a JSON array of strings or one item per line. List markers and
/// wrapping quotes are stripped; blank lines, headings ending in `:` and
/// case-insensitive duplicates are dropped.
pub fn parse_sub_questions(response: &str, max_sub_questions: usize) -> Vec<String> {
    let candidates: Vec<String> = match parse_json_array(response) {
        Some(items) => items,
        None => response.lines().map(str::to_string).collect(),
    };

    let mut seen = HashSet::new();
    candidates
        .iter()
        .map(|line| clean_item(line))
        .filter(|item| !item.is_empty() && !item.ends_with(':'))
        .filter(|item| seen.insert(item.to_lowercase()))
        .take(max_sub_questions)
        .collect()
}

fn parse_json_array(response: &str) -> Option<Vec<String>> {
    let start = response.find('[')?;
    let end = response.rfind(']')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Vec<String>>(&response[start..=end]).ok()
}

fn clean_item(line: &str) -> String {
    let stripped = LIST_MARKER.replace(line.trim(), "");
    stripped
        .trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '`')
        .trim()
        .to_string()
}
