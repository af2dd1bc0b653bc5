//! Tiered candidate retrieval: vector search, then full-text search, then a
//! token substring fallback.
//!
//! Each tier is attempted only when every earlier tier produced zero
//! candidates, and a tier whose search primitive errors contributes an empty
//! result instead of propagating — the fallthrough policy is an explicit
//! state machine over per-tier outcomes, not exception suppression.

use tracing::warn;

use crate::store::{SearchBackend, StoredDoc};

/// Maximum number of query tokens used by the substring fallback.
pub const MAX_FALLBACK_TOKENS: usize = 12;
/// Tokens shorter than this are discarded as likely stopwords.
pub const MIN_TOKEN_LEN: usize = 3;

/// Which retrieval strategy produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// ANN similarity search.
    Vector,
    /// Indexed full-text search.
    FullText,
    /// Literal token substring fallback.
    RegexFallback,
}

/// The tier that ultimately supplied results for a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// Tier 1 supplied results.
    Vector,
    /// Tier 2 supplied results.
    FullText,
    /// Tier 3 supplied results.
    RegexFallback,
    /// Every tier came back empty.
    None,
}

/// A retrieved document projection plus its provenance.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// Stable record id.
    pub id: String,
    /// Page title.
    pub title: Option<String>,
    /// Program name.
    pub program_name: Option<String>,
    /// Canonical body text.
    pub text: Option<String>,
    /// Which tier produced this candidate.
    pub provenance: Provenance,
    /// Similarity score; only meaningful for [`Provenance::Vector`].
    pub score: Option<f64>,
}

impl Candidate {
    fn from_doc(doc: StoredDoc, provenance: Provenance, score: Option<f64>) -> Self {
        Self {
            id: doc.id,
            title: doc.title,
            program_name: doc.program_name,
            text: doc.text,
            provenance,
            score,
        }
    }
}

/// Runs the tiered retrieval strategy.
///
/// Tier 1 is attempted only when a query vector exists; tiers 2 and 3 only
/// when everything above them yielded nothing. Result order within a tier is
/// whatever the search primitive returned — no re-sorting here.
pub async fn retrieve(
    store: &dyn SearchBackend,
    query_text: &str,
    query_vector: Option<&[f32]>,
    k: usize,
    num_candidates: usize,
) -> (Vec<Candidate>, Tier) {
    if let Some(vector) = query_vector {
        match store.vector_search(vector, k, num_candidates).await {
            Ok(hits) if !hits.is_empty() => {
                let candidates = hits
                    .into_iter()
                    .map(|(doc, score)| Candidate::from_doc(doc, Provenance::Vector, Some(score)))
                    .collect();
                return (candidates, Tier::Vector);
            }
            Ok(_) => {}
            Err(err) => warn!("vector search tier unavailable: {err:#}"),
        }
    }

    match store.text_search(query_text, k).await {
        Ok(docs) if !docs.is_empty() => {
            let candidates = docs
                .into_iter()
                .map(|doc| Candidate::from_doc(doc, Provenance::FullText, None))
                .collect();
            return (candidates, Tier::FullText);
        }
        Ok(_) => {}
        Err(err) => warn!("full-text search tier unavailable: {err:#}"),
    }

    let tokens = tokenize_query(query_text);
    if !tokens.is_empty() {
        match store.token_search(&tokens, k).await {
            Ok(docs) if !docs.is_empty() => {
                let candidates = docs
                    .into_iter()
                    .map(|doc| Candidate::from_doc(doc, Provenance::RegexFallback, None))
                    .collect();
                return (candidates, Tier::RegexFallback);
            }
            Ok(_) => {}
            Err(err) => warn!("token fallback tier unavailable: {err:#}"),
        }
    }

    (Vec::new(), Tier::None)
}

/// Splits a query into lowercase whitespace-delimited tokens of at least
/// [`MIN_TOKEN_LEN`] characters, deduplicated in first-seen order and capped
/// at [`MAX_FALLBACK_TOKENS`].
pub fn tokenize_query(query: &str) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    for raw in query.split_whitespace() {
        if raw.chars().count() < MIN_TOKEN_LEN {
            continue;
        }
        let token = raw.to_lowercase();
        if !tokens.contains(&token) {
            tokens.push(token);
        }
        if tokens.len() == MAX_FALLBACK_TOKENS {
            break;
        }
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeBackend {
        vector_hits: Vec<(StoredDoc, f64)>,
        vector_error: bool,
        text_hits: Vec<StoredDoc>,
        text_error: bool,
        token_hits: Vec<StoredDoc>,
        vector_calls: AtomicUsize,
        text_calls: AtomicUsize,
        token_calls: AtomicUsize,
    }

    fn doc(id: &str) -> StoredDoc {
        StoredDoc {
            id: id.to_string(),
            title: Some(format!("{id} title")),
            program_name: Some(format!("{id} program")),
            text: Some(format!("{id} body")),
        }
    }

    #[async_trait]
    impl SearchBackend for FakeBackend {
        async fn vector_search(
            &self,
            _vector: &[f32],
            _k: usize,
            _num_candidates: usize,
        ) -> Result<Vec<(StoredDoc, f64)>> {
            self.vector_calls.fetch_add(1, Ordering::SeqCst);
            if self.vector_error {
                return Err(anyhow!("index \"vector_index\" does not exist"));
            }
            Ok(self.vector_hits.clone())
        }

        async fn text_search(&self, _query: &str, _k: usize) -> Result<Vec<StoredDoc>> {
            self.text_calls.fetch_add(1, Ordering::SeqCst);
            if self.text_error {
                return Err(anyhow!("column \"text_tsv\" does not exist"));
            }
            Ok(self.text_hits.clone())
        }

        async fn token_search(&self, _tokens: &[String], _k: usize) -> Result<Vec<StoredDoc>> {
            self.token_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.token_hits.clone())
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

    #[tokio::test]
    async fn vector_hit_short_circuits_lower_tiers() {
        let backend = FakeBackend {
            vector_hits: vec![(doc("a"), 0.92)],
            text_hits: vec![doc("b")],
            ..FakeBackend::default()
        };
        let (candidates, tier) =
            retrieve(&backend, "farm loans", Some(&[0.1, 0.2]), 4, 100).await;
        assert_eq!(tier, Tier::Vector);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].provenance, Provenance::Vector);
        assert_eq!(candidates[0].score, Some(0.92));
        assert_eq!(backend.text_calls.load(Ordering::SeqCst), 0);
        assert_eq!(backend.token_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_vector_skips_tier_one() {
        let backend = FakeBackend {
            text_hits: vec![doc("b")],
            ..FakeBackend::default()
        };
        let (candidates, tier) = retrieve(&backend, "farm loans", None, 4, 100).await;
        assert_eq!(tier, Tier::FullText);
        assert_eq!(candidates[0].provenance, Provenance::FullText);
        assert_eq!(candidates[0].score, None);
        assert_eq!(backend.vector_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn tier_errors_fall_through_in_order() {
        let backend = FakeBackend {
            vector_error: true,
            text_error: true,
            token_hits: vec![doc("c")],
            ..FakeBackend::default()
        };
        let (candidates, tier) =
            retrieve(&backend, "farm loans", Some(&[0.5; 4]), 4, 100).await;
        assert_eq!(tier, Tier::RegexFallback);
        assert_eq!(candidates[0].provenance, Provenance::RegexFallback);
        assert_eq!(backend.vector_calls.load(Ordering::SeqCst), 1);
        assert_eq!(backend.text_calls.load(Ordering::SeqCst), 1);
        assert_eq!(backend.token_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn all_tiers_empty_yields_none() {
        let backend = FakeBackend::default();
        let (candidates, tier) =
            retrieve(&backend, "farm loans", Some(&[0.5; 4]), 4, 100).await;
        assert!(candidates.is_empty());
        assert_eq!(tier, Tier::None);
    }

    #[tokio::test]
    async fn token_tier_is_skipped_for_stopword_only_queries() {
        let backend = FakeBackend {
            token_hits: vec![doc("c")],
            ..FakeBackend::default()
        };
        let (candidates, tier) = retrieve(&backend, "is it a do", None, 4, 100).await;
        assert!(candidates.is_empty());
        assert_eq!(tier, Tier::None);
        assert_eq!(backend.token_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn tokenize_drops_short_tokens_and_caps_at_twelve() {
        let query = "a an to How do I apply for the farm loan program in my state of Iowa today";
        let tokens = tokenize_query(query);
        assert!(tokens.len() <= MAX_FALLBACK_TOKENS);
        assert!(tokens.iter().all(|t| t.chars().count() >= MIN_TOKEN_LEN));
        assert!(tokens.contains(&"farm".to_string()));
        assert!(!tokens.contains(&"do".to_string()));
    }

    #[test]
    fn tokenize_lowercases_and_dedupes() {
        let tokens = tokenize_query("Loan LOAN loan Farm");
        assert_eq!(tokens, vec!["loan".to_string(), "farm".to_string()]);
    }

    #[test]
    fn tokenize_keeps_special_characters_literal() {
        let tokens = tokenize_query("farm.loan* application");
        assert_eq!(tokens[0], "farm.loan*");
    }
}
