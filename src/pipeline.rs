//! The retrieval pipeline orchestrator.
//!
//! One query flows through a linear state machine: embed the query, run the
//! tiered retrieval, assemble context, then either generate an answer or
//! return a diagnostic. At most one embedding call, at most three retrieval
//! attempts (short-circuited on the first hit), and at most one generation
//! call per invocation.

use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::RagConfig;
use crate::context;
use crate::generate::{self, AnswerModel};
use crate::normalize::normalize;
use crate::retriever;
use crate::store::SearchBackend;

/// Trait implemented by concrete embedding providers. Returns the raw
/// provider payload; shape normalization happens in the pipeline.
pub trait QueryEmbedder: Send + Sync {
    /// Embeds one query string with retrieval-query intent.
    fn embed_query(&self, text: &str) -> Result<Value>;
}

/// Terminal state of one pipeline invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerOutcome {
    /// The generation model produced an answer from retrieved context.
    Answer(String),
    /// No context was retrieved; carries the diagnostic message. No
    /// generation call was made.
    Diagnostic(String),
    /// The generation provider failed; carries its message.
    Failure(String),
}

impl AnswerOutcome {
    /// Collapses the outcome into user-facing text. Every variant yields a
    /// string; callers never see an error.
    pub fn into_text(self) -> String {
        match self {
            AnswerOutcome::Answer(text)
            | AnswerOutcome::Diagnostic(text)
            | AnswerOutcome::Failure(text) => text,
        }
    }
}

/// Orchestrates embed, retrieve, assemble, and generate for single queries.
///
/// Handles are explicit constructor arguments and shared read-only, so
/// independent queries can run concurrently against one pipeline.
pub struct RagPipeline {
    store: Arc<dyn SearchBackend>,
    embedder: Arc<dyn QueryEmbedder>,
    model: Arc<dyn AnswerModel>,
    config: RagConfig,
}

impl RagPipeline {
    /// Builds a pipeline over the given handles.
    pub fn new(
        store: Arc<dyn SearchBackend>,
        embedder: Arc<dyn QueryEmbedder>,
        model: Arc<dyn AnswerModel>,
        config: RagConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            model,
            config,
        }
    }

    /// Answers one query, returning the terminal outcome.
    pub async fn answer(&self, query: &str, top_k: Option<usize>) -> AnswerOutcome {
        let query = query.trim();
        if query.is_empty() {
            return AnswerOutcome::Diagnostic("Please provide a question.".to_string());
        }
        let k = self.config.effective_top_k(top_k);

        // A failed or unrecognizable embedding degrades retrieval to the
        // text tiers instead of failing the query.
        let query_vector = self.embed_query(query).await;
        let (candidates, tier) = retriever::retrieve(
            self.store.as_ref(),
            query,
            query_vector.as_deref(),
            k,
            self.config.num_candidates,
        )
        .await;
        debug!(?tier, candidates = candidates.len(), "retrieval finished");

        let Some(context_block) = context::assemble(&candidates) else {
            let message = context::diagnostic_message(
                self.store.as_ref(),
                &self.config.vector_column,
                &self.config.vector_index_name,
            )
            .await;
            return AnswerOutcome::Diagnostic(message);
        };

        let model = Arc::clone(&self.model);
        let owned_query = query.to_string();
        let generated = tokio::task::spawn_blocking(move || {
            generate::generate(model.as_ref(), &owned_query, &context_block)
        })
        .await;
        match generated {
            Ok(Ok(text)) => AnswerOutcome::Answer(text),
            Ok(Err(failure)) => AnswerOutcome::Failure(failure.to_string()),
            Err(join_err) => {
                AnswerOutcome::Failure(format!("Error generating final response: {join_err}"))
            }
        }
    }

    /// Answers one query as plain text; the user-facing contract always
    /// returns a string.
    pub async fn answer_text(&self, query: &str, top_k: Option<usize>) -> String {
        self.answer(query, top_k).await.into_text()
    }

    async fn embed_query(&self, query: &str) -> Option<Vec<f32>> {
        let embedder = Arc::clone(&self.embedder);
        let owned = query.to_string();
        let raw = match tokio::task::spawn_blocking(move || embedder.embed_query(&owned)).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(err)) => {
                warn!("query embedding failed, degrading to text retrieval: {err:#}");
                return None;
            }
            Err(join_err) => {
                warn!("embedding task failed, degrading to text retrieval: {join_err}");
                return None;
            }
        };
        let vector = normalize(&raw);
        if vector.is_none() {
            warn!("no recognizable embedding shape in provider response");
        }
        vector
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{StoredDoc, TableName};
    use async_trait::async_trait;

    struct EmptyBackend;

    #[async_trait]
    impl SearchBackend for EmptyBackend {
        async fn vector_search(
            &self,
            _vector: &[f32],
            _k: usize,
            _num_candidates: usize,
        ) -> Result<Vec<(StoredDoc, f64)>> {
            Ok(Vec::new())
        }

        async fn text_search(&self, _query: &str, _k: usize) -> Result<Vec<StoredDoc>> {
            Ok(Vec::new())
        }

        async fn token_search(&self, _tokens: &[String], _k: usize) -> Result<Vec<StoredDoc>> {
            Ok(Vec::new())
        }

        async fn embedded_count(&self) -> Result<i64> {
            Ok(0)
        }

        async fn sample_embedding_len(&self) -> Result<Option<usize>> {
            Ok(None)
        }

        async fn vector_index_exists(&self) -> Result<bool> {
            Ok(false)
        }
    }

    struct NullEmbedder;

    impl QueryEmbedder for NullEmbedder {
        fn embed_query(&self, _text: &str) -> Result<Value> {
            Ok(Value::Null)
        }
    }

    struct PanicModel;

    impl AnswerModel for PanicModel {
        fn answer(&self, _prompt: &str) -> Result<String> {
            unreachable!("generation must not run without context");
        }
    }

    fn pipeline() -> RagPipeline {
        let config = RagConfig::new(TableName::new("public", "programs").unwrap());
        RagPipeline::new(
            Arc::new(EmptyBackend),
            Arc::new(NullEmbedder),
            Arc::new(PanicModel),
            config,
        )
    }

    #[tokio::test]
    async fn blank_query_prompts_for_a_question() {
        let outcome = pipeline().answer("   ", None).await;
        assert_eq!(
            outcome,
            AnswerOutcome::Diagnostic("Please provide a question.".to_string())
        );
    }

    #[tokio::test]
    async fn outcome_always_collapses_to_text() {
        let text = pipeline().answer_text("anything at all", None).await;
        assert!(text.contains("I cannot find any relevant information"));
    }
}
