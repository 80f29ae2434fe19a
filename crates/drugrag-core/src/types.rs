//! Query, chunk and answer records shared by every pipeline stage

use crate::error::{RagError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::sync::Arc;
use uuid::Uuid;

/// A user question as it arrived at the boundary
#[derive(Debug, Clone)]
pub struct Query {
    id: Uuid,
    text: String,
    received_at: DateTime<Utc>,
}

impl Query {
    /// Accept a query, rejecting empty or oversized text
    pub fn new(text: impl Into<String>, max_chars: usize) -> Result<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(RagError::InvalidInput(
                "`query` must be a non-empty string.".to_string(),
            ));
        }
        let len = text.chars().count();
        if len > max_chars {
            return Err(RagError::InvalidInput(format!(
                "`query` is {} characters, limit is {}",
                len, max_chars
            )));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            text,
            received_at: Utc::now(),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }
}

/// One independently answerable part of a [`Query`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubQuestion {
    pub query_id: Uuid,
    /// Position within the parent query, starting at 0
    pub ordinal: usize,
    pub text: String,
}

/// Stable identifier of a chunk within a corpus
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkId(pub String);

impl ChunkId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Document a chunk was cut from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub document_id: String,
    #[serde(default)]
    pub title: Option<String>,
}

/// A passage of source text with its embedding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub text: String,
    pub vector: Vec<f32>,
    pub source: SourceRef,
    /// Byte range within the source document
    pub range: Range<usize>,
}

impl Chunk {
    pub fn dimensions(&self) -> usize {
        self.vector.len()
    }
}

/// A chunk paired with its similarity to a query vector
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Arc<Chunk>,
    pub score: f32,
}

/// Hits for one sub-question, best first, at most k long
#[derive(Debug, Clone, Default)]
pub struct RetrievalResult {
    pub ordinal: usize,
    pub hits: Vec<ScoredChunk>,
}

impl RetrievalResult {
    pub fn empty(ordinal: usize) -> Self {
        Self {
            ordinal,
            hits: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }
}

/// How a sub-answer was produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SubAnswerStatus {
    /// Answered from retrieved chunks
    Grounded,
    /// No chunks were available; answered from model knowledge
    Ungrounded,
    /// Generation failed
    Failed { reason: String },
}

/// Answer to one sub-question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubAnswer {
    pub ordinal: usize,
    pub question: String,
    pub text: String,
    pub evidence: Vec<ChunkId>,
    pub status: SubAnswerStatus,
}

impl SubAnswer {
    /// Placeholder recorded when a sub-question could not be answered
    pub fn failed(sub_question: &SubQuestion, reason: impl Into<String>) -> Self {
        Self {
            ordinal: sub_question.ordinal,
            question: sub_question.text.clone(),
            text: "Error generating answer.".to_string(),
            evidence: Vec::new(),
            status: SubAnswerStatus::Failed {
                reason: reason.into(),
            },
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, SubAnswerStatus::Failed { .. })
    }

    pub fn is_grounded(&self) -> bool {
        self.status == SubAnswerStatus::Grounded
    }
}

/// Aggregated answer returned to the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalAnswer {
    pub query_id: Uuid,
    pub text: String,
    /// Ordered by sub-question ordinal
    pub sub_answers: Vec<SubAnswer>,
}

impl FinalAnswer {
    /// Every chunk id cited by any sub-answer, in first-seen order
    pub fn evidence(&self) -> Vec<&ChunkId> {
        let mut seen = std::collections::HashSet::new();
        self.sub_answers
            .iter()
            .flat_map(|a| a.evidence.iter())
            .filter(|id| seen.insert(*id))
            .collect()
    }
}
