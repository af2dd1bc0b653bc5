//! Blocking Gemini REST clients for embedding and answer generation.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::Serialize;
use serde_json::Value;

use crate::generate::AnswerModel;
use crate::pipeline::QueryEmbedder;

/// Default public Gemini API base.
pub const DEFAULT_GEMINI_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Intent tag attached to embedding requests; query-time and document-time
/// embeddings are optimized differently by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingIntent {
    /// Embedding a user query for retrieval.
    RetrievalQuery,
    /// Embedding a stored document for later retrieval.
    RetrievalDocument,
}

impl EmbeddingIntent {
    fn as_str(self) -> &'static str {
        match self {
            EmbeddingIntent::RetrievalQuery => "RETRIEVAL_QUERY",
            EmbeddingIntent::RetrievalDocument => "RETRIEVAL_DOCUMENT",
        }
    }
}

/// Blocking client for the Gemini embedding and generation endpoints.
///
/// The embedding surface returns the provider payload as raw JSON; shape
/// normalization is the caller's concern (see [`crate::normalize`]).
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    base_url: String,
    embedding_model: String,
    chat_model: String,
}

impl GeminiClient {
    /// Builds a new client. The API key is sent via the `x-goog-api-key`
    /// header on every request.
    pub fn new(
        api_key: String,
        base_url: String,
        embedding_model: String,
        chat_model: String,
        timeout: Duration,
    ) -> Result<Self> {
        anyhow::ensure!(!api_key.trim().is_empty(), "missing Gemini API key");
        anyhow::ensure!(
            !embedding_model.trim().is_empty(),
            "missing embedding model name"
        );
        anyhow::ensure!(!chat_model.trim().is_empty(), "missing chat model name");
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-goog-api-key",
            HeaderValue::from_str(api_key.trim()).context("invalid Gemini API key")?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("failed to build Gemini HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            embedding_model,
            chat_model,
        })
    }

    /// Embeds one input string and returns the raw provider response.
    pub fn embed_content(&self, input: &str, intent: EmbeddingIntent) -> Result<Value> {
        let url = format!(
            "{}/models/{}:embedContent",
            self.base_url, self.embedding_model
        );
        let model_path = format!("models/{}", self.embedding_model);
        let body = EmbedRequest {
            model: &model_path,
            content: ContentParts::from_text(input),
            task_type: intent.as_str(),
        };
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .context("failed to call Gemini embedContent")?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp
                .text()
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            bail!("Gemini embedContent returned {}: {}", status, text);
        }
        resp.json()
            .context("failed to parse Gemini embedding response")
    }

    /// Submits a single prompt and returns the generated text.
    pub fn generate_content(&self, prompt: &str) -> Result<String> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url, self.chat_model
        );
        let body = GenerateRequest {
            contents: vec![ContentParts::from_text(prompt)],
        };
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .context("failed to call Gemini generateContent")?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp
                .text()
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            bail!("Gemini generateContent returned {}: {}", status, text);
        }
        let parsed: Value = resp
            .json()
            .context("failed to parse Gemini generation response")?;
        extract_generated_text(&parsed)
    }
}

impl QueryEmbedder for GeminiClient {
    fn embed_query(&self, text: &str) -> Result<Value> {
        self.embed_content(text, EmbeddingIntent::RetrievalQuery)
    }
}

impl AnswerModel for GeminiClient {
    fn answer(&self, prompt: &str) -> Result<String> {
        self.generate_content(prompt)
    }
}

fn extract_generated_text(response: &Value) -> Result<String> {
    let parts = response
        .get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(Value::as_array);
    let Some(parts) = parts else {
        bail!("Gemini response missing candidate content");
    };
    let text = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("\n");
    if text.is_empty() {
        bail!("Gemini response missing text content");
    }
    Ok(text)
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    content: ContentParts<'a>,
    #[serde(rename = "taskType")]
    task_type: &'a str,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<ContentParts<'a>>,
}

#[derive(Serialize)]
struct ContentParts<'a> {
    parts: Vec<TextPart<'a>>,
}

impl<'a> ContentParts<'a> {
    fn from_text(text: &'a str) -> Self {
        Self {
            parts: vec![TextPart { text }],
        }
    }
}

#[derive(Serialize)]
struct TextPart<'a> {
    text: &'a str,
}
