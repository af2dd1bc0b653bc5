//! Runtime configuration shared by the pipeline and its binaries.

use crate::store::TableName;

/// Default number of documents returned per query.
pub const DEFAULT_TOP_K: usize = 4;
/// Default ANN candidate pool; must exceed the requested top-k so the search
/// engine has re-ranking headroom.
pub const DEFAULT_NUM_CANDIDATES: usize = 100;

/// Settings that shape a single pipeline instance.
///
/// Everything here is read-only after construction; binaries populate it from
/// CLI flags and environment variables.
#[derive(Debug, Clone)]
pub struct RagConfig {
    /// Table holding program records.
    pub table: TableName,
    /// Column storing document embeddings.
    pub vector_column: String,
    /// Column storing the canonical embeddable body.
    pub text_column: String,
    /// Column storing the structured overview text.
    pub overview_column: String,
    /// Name of the ANN index over the vector column.
    pub vector_index_name: String,
    /// Embedding model identifier.
    pub embedding_model: String,
    /// Chat model identifier used for answer synthesis.
    pub chat_model: String,
    /// Optional embedding dimension override.
    pub embedding_dimensions: Option<usize>,
    /// Documents returned per query unless the caller overrides it.
    pub top_k: usize,
    /// ANN candidate pool size.
    pub num_candidates: usize,
}

impl RagConfig {
    /// Builds a config with the stock column, index, and model defaults.
    pub fn new(table: TableName) -> Self {
        Self {
            table,
            vector_column: "embedding".to_string(),
            text_column: "text".to_string(),
            overview_column: "program_overview".to_string(),
            vector_index_name: "vector_index".to_string(),
            embedding_model: "text-embedding-004".to_string(),
            chat_model: "gemini-2.5-flash".to_string(),
            embedding_dimensions: Some(768),
            top_k: DEFAULT_TOP_K,
            num_candidates: DEFAULT_NUM_CANDIDATES,
        }
    }

    /// Clamps a caller-supplied top-k to a sane range.
    pub fn effective_top_k(&self, requested: Option<usize>) -> usize {
        requested.unwrap_or(self.top_k).max(1)
    }

    /// Whether a normalized embedding length satisfies the configured
    /// dimensionality. An unset override accepts any non-empty vector;
    /// stored embeddings must stay uniform within a table.
    pub fn accepts_dimension(&self, len: usize) -> bool {
        match self.embedding_dimensions {
            Some(dims) => len == dims,
            None => len > 0,
        }
    }
}
