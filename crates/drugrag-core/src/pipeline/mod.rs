//! Query pipeline: decompose, retrieve, synthesize, aggregate
//!
//! One [`Pipeline`] serves many queries at once. Each query fans its
//! sub-questions out with bounded concurrency and can be cancelled through
//! a [`CancellationToken`]; dropping the returned future also stops all of
//! its in-flight work.

mod aggregate;
mod decompose;
mod retrieve;
mod synthesize;

pub use aggregate::{Aggregator, ALL_FAILED_TEXT};
pub use decompose::{has_decomposable_structure, parse_sub_questions, Decomposer};
pub use retrieve::Retriever;
pub use synthesize::{select_context, PromptContext, Synthesizer};

use crate::config::{Config, LLMServiceConfig, PipelineConfig, RetrievalMode};
use crate::error::{RagError, Result};
use crate::index::VectorIndex;
use crate::llm::{Embedder, HttpEmbedder, HttpLLMClient, LLMClient};
use crate::types::{FinalAnswer, Query, RetrievalResult, SubAnswer, SubQuestion};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

/// Stage a query has reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryState {
    Received,
    Decomposed,
    Retrieving,
    Synthesizing,
    Aggregating,
    Completed,
    Failed,
}

impl QueryState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Per-request overrides, capped by the pipeline configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryOptions {
    pub top_k: Option<usize>,
    pub max_sub_questions: Option<usize>,
}

/// Everything a query produced, including the stages it went through
#[derive(Debug)]
pub struct QueryOutcome {
    pub query_id: Uuid,
    pub history: Vec<QueryState>,
    pub result: Result<FinalAnswer>,
}

impl QueryOutcome {
    pub fn final_state(&self) -> QueryState {
        self.history.last().copied().unwrap_or(QueryState::Received)
    }
}

/// Records stage transitions; sub-question tasks report through it concurrently
struct Lifecycle {
    history: Mutex<Vec<QueryState>>,
}

impl Lifecycle {
    fn new() -> Self {
        Self {
            history: Mutex::new(vec![QueryState::Received]),
        }
    }

    /// Record `state` the first time it is reached
    fn advance(&self, state: QueryState) {
        if let Ok(mut history) = self.history.lock() {
            if !history.contains(&state) {
                tracing::debug!("Query state -> {:?}", state);
                history.push(state);
            }
        }
    }

    fn into_history(self) -> Vec<QueryState> {
        self.history.into_inner().unwrap_or_default()
    }
}

pub struct Pipeline {
    decomposer: Decomposer,
    retriever: Retriever,
    synthesizer: Synthesizer,
    aggregator: Aggregator,
    config: PipelineConfig,
}

impl Pipeline {
    /// Assemble a pipeline from its collaborators.
    ///
    /// Fails with `DimensionMismatch` when the embedder and index disagree.
    pub fn new(
        llm: Arc<dyn LLMClient>,
        embedder: Arc<dyn Embedder>,
        index: Arc<VectorIndex>,
        service: &LLMServiceConfig,
        config: PipelineConfig,
    ) -> Result<Self> {
        if embedder.dimensions() != index.dimensions() {
            return Err(RagError::DimensionMismatch {
                expected: index.dimensions(),
                actual: embedder.dimensions(),
            });
        }

        Ok(Self {
            decomposer: Decomposer::new(Arc::clone(&llm), service.decompose_model.clone()),
            retriever: Retriever::new(embedder, index, config.search_mode),
            synthesizer: Synthesizer::new(
                Arc::clone(&llm),
                service.answer_model.clone(),
                config.context_budget_chars,
            ),
            aggregator: Aggregator::new(llm, service.answer_model.clone()),
            config,
        })
    }

    /// Pipeline backed by the configured HTTP provider
    pub fn from_config(config: &Config, index: Arc<VectorIndex>) -> Result<Self> {
        let client: Arc<dyn LLMClient> =
            Arc::new(HttpLLMClient::new(config.llm_service.clone(), &config.retry)?);
        let embedder = Arc::new(HttpEmbedder::from_config(
            Arc::clone(&client),
            &config.llm_service,
        )?);
        Self::new(
            client,
            embedder,
            index,
            &config.llm_service,
            config.pipeline.clone(),
        )
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        self.retriever.index()
    }

    /// Validate raw text into a [`Query`]
    pub fn query(&self, text: impl Into<String>) -> Result<Query> {
        Query::new(text, self.config.max_query_chars)
    }

    /// Answer `text` with default options and no external cancellation
    pub async fn answer(&self, text: &str) -> Result<FinalAnswer> {
        let query = self.query(text)?;
        self.execute(&query, QueryOptions::default(), &CancellationToken::new())
            .await
            .result
    }

    /// Run `query` to a terminal state.
    ///
    /// Only a decomposition failure, a fatal index error or cancellation
    /// ends in `Failed`; per-sub-question failures are folded into the
    /// final answer.
    pub async fn execute(
        &self,
        query: &Query,
        options: QueryOptions,
        cancel: &CancellationToken,
    ) -> QueryOutcome {
        let span = tracing::info_span!("query", id = %query.id());
        let lifecycle = Lifecycle::new();
        span.in_scope(|| tracing::info!("Received query: {}", truncate(query.text(), 200)));

        let result = self
            .run(query, options, cancel, &lifecycle)
            .instrument(span.clone())
            .await;

        let _enter = span.enter();
        match &result {
            Ok(answer) => {
                lifecycle.advance(QueryState::Completed);
                tracing::info!(
                    "Query completed with {} sub-answers ({} failed)",
                    answer.sub_answers.len(),
                    answer.sub_answers.iter().filter(|a| a.is_failed()).count()
                );
            }
            Err(e) => {
                lifecycle.advance(QueryState::Failed);
                tracing::warn!("Query failed: {}", e);
            }
        }

        QueryOutcome {
            query_id: query.id(),
            history: lifecycle.into_history(),
            result,
        }
    }

    async fn run(
        &self,
        query: &Query,
        options: QueryOptions,
        cancel: &CancellationToken,
        lifecycle: &Lifecycle,
    ) -> Result<FinalAnswer> {
        let max_sub_questions = cap(options.max_sub_questions, self.config.max_sub_questions);
        let top_k = cap(options.top_k, self.config.top_k);

        let sub_questions =
            cancellable(cancel, self.decomposer.decompose(query, max_sub_questions)).await?;
        lifecycle.advance(QueryState::Decomposed);
        tracing::info!("Processing {} sub-questions", sub_questions.len());

        lifecycle.advance(QueryState::Retrieving);
        let shared = match self.config.retrieval_mode {
            RetrievalMode::PerSubQuestion => None,
            RetrievalMode::OriginalQuery => {
                Some(cancellable(cancel, self.retrieve_for_query(query, top_k)).await?)
            }
        };

        let concurrency = self.config.concurrency.max(1);
        // Built up front so the stream is not generic over the borrow of each
        // sub-question; a lazily mapped iterator makes `execute` non-Send.
        let tasks: Vec<_> = sub_questions
            .iter()
            .map(|sq| self.answer_sub_question(sq, top_k, shared.as_ref(), lifecycle))
            .collect();
        let fan_out = stream::iter(tasks)
            .buffer_unordered(concurrency)
            .try_collect::<Vec<SubAnswer>>();
        let sub_answers = cancellable(cancel, fan_out).await?;

        lifecycle.advance(QueryState::Aggregating);
        cancellable(cancel, self.aggregator.aggregate(query, sub_answers)).await
    }

    /// Single retrieval shared by every sub-question; an embedding failure
    /// is kept as the reason each of them failed
    async fn retrieve_for_query(
        &self,
        query: &Query,
        top_k: usize,
    ) -> Result<std::result::Result<RetrievalResult, String>> {
        match self.retriever.retrieve(0, query.text(), top_k).await {
            Ok(result) => Ok(Ok(result)),
            Err(e) if e.is_fatal_index_error() || matches!(e, RagError::Cancelled) => Err(e),
            Err(e) => {
                tracing::warn!("Retrieval failed for the full query: {}", e);
                Ok(Err(e.to_string()))
            }
        }
    }

    async fn answer_sub_question(
        &self,
        sub_question: &SubQuestion,
        top_k: usize,
        shared: Option<&std::result::Result<RetrievalResult, String>>,
        lifecycle: &Lifecycle,
    ) -> Result<SubAnswer> {
        let retrieval = match shared {
            Some(Ok(result)) => RetrievalResult {
                ordinal: sub_question.ordinal,
                hits: result.hits.clone(),
            },
            Some(Err(reason)) => return Ok(SubAnswer::failed(sub_question, reason.clone())),
            None => match self
                .retriever
                .retrieve(sub_question.ordinal, &sub_question.text, top_k)
                .await
            {
                Ok(result) => result,
                Err(e) if e.is_fatal_index_error() || matches!(e, RagError::Cancelled) => {
                    return Err(e)
                }
                Err(e) => {
                    tracing::warn!(
                        "Retrieval failed for sub-question {}: {}",
                        sub_question.ordinal,
                        e
                    );
                    return Ok(SubAnswer::failed(sub_question, e.to_string()));
                }
            },
        };

        lifecycle.advance(QueryState::Synthesizing);
        self.synthesizer.synthesize(sub_question, &retrieval).await
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}

/// Apply a per-request override without exceeding the configured ceiling
fn cap(requested: Option<usize>, ceiling: usize) -> usize {
    let ceiling = ceiling.max(1);
    requested.map(|n| n.clamp(1, ceiling)).unwrap_or(ceiling)
}

async fn cancellable<T, F>(cancel: &CancellationToken, work: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(RagError::Cancelled),
        result = work => result,
    }
}
