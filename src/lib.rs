#![warn(missing_docs)]
//! Core library entry points for the agrag question-answering pipeline.

pub mod config;
pub mod context;
pub mod document;
pub mod gemini;
pub mod generate;
pub mod normalize;
pub mod pipeline;
pub mod retriever;
pub mod store;

pub use config::{RagConfig, DEFAULT_NUM_CANDIDATES, DEFAULT_TOP_K};
pub use context::{assemble, diagnostic_message, NO_CONTEXT_MESSAGE};
pub use document::{slugify, ProgramRecord, ScrapedProgram};
pub use gemini::{EmbeddingIntent, GeminiClient, DEFAULT_GEMINI_BASE};
pub use generate::{build_prompt, AnswerModel, GenerationFailure};
pub use normalize::normalize;
pub use pipeline::{AnswerOutcome, QueryEmbedder, RagPipeline};
pub use retriever::{retrieve, tokenize_query, Candidate, Provenance, Tier};
pub use store::{ProgramStore, SearchBackend, StoredDoc, TableName};
