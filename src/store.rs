//! Postgres + pgvector document store for program records.
//!
//! Exposes the three read-only search primitives consumed by the retriever
//! (ANN vector search, full-text search, token substring match) plus the
//! probes used for empty-result diagnostics, behind the [`SearchBackend`]
//! seam so the pipeline can run against test doubles.

use anyhow::{Context, Result};
use async_trait::async_trait;
use pgvector::Vector;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, NoTls, Row};

use crate::config::RagConfig;
use crate::document::ProgramRecord;

/// Schema-qualified name of the program table. Both components are quoted
/// on interpolation, so operator-supplied names cannot break the generated
/// SQL.
#[derive(Debug, Clone)]
pub struct TableName {
    schema: String,
    table: String,
}

impl TableName {
    /// Validates and wraps a schema/table pair.
    pub fn new<S, T>(schema: S, table: T) -> Result<Self>
    where
        S: Into<String>,
        T: Into<String>,
    {
        let schema = schema.into();
        let table = table.into();
        anyhow::ensure!(!schema.trim().is_empty(), "empty schema name");
        anyhow::ensure!(!table.trim().is_empty(), "empty table name");
        Ok(Self { schema, table })
    }

    /// `"schema"."table"` with both identifiers quoted.
    pub fn qualified(&self) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.table))
    }

    /// Schema component, unquoted.
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Table component, unquoted.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Name of the GIN index over the generated `text_tsv` column, derived
    /// from the table it covers so tables in different schemas never clash.
    pub fn fts_index_name(&self) -> String {
        format!(
            "{}_{}_text_tsv_idx",
            index_safe(&self.schema),
            index_safe(&self.table)
        )
    }
}

/// Double-quotes a SQL identifier, doubling any embedded quotes.
pub fn quote_ident(input: &str) -> String {
    format!("\"{}\"", input.replace('"', "\"\""))
}

// The candidate pool must exceed k or the ANN scan has no re-ranking
// headroom; undersized caller values are raised to k + 1.
fn ann_pool_size(k: usize, num_candidates: usize) -> usize {
    num_candidates.max(k + 1)
}

// Index names are unquoted in pg_indexes lookups, so squash anything that
// is not alphanumeric.
fn index_safe(input: &str) -> String {
    input
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() { ch } else { '_' })
        .collect()
}

/// Escapes LIKE/ILIKE metacharacters so a token matches only its literal
/// substring.
pub fn escape_like(token: &str) -> String {
    let mut escaped = String::with_capacity(token.len());
    for ch in token.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Document projection returned by the search primitives.
#[derive(Debug, Clone)]
pub struct StoredDoc {
    /// Stable record id.
    pub id: String,
    /// Page title.
    pub title: Option<String>,
    /// Program name.
    pub program_name: Option<String>,
    /// Canonical body text.
    pub text: Option<String>,
}

/// Read-only search and diagnostic surface consumed by the retriever and the
/// context assembler.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// ANN search over the embedding column; results are similarity-ordered
    /// and carry their score. Errors indicate the primitive itself failed
    /// (missing extension, column, or index); callers treat that as an empty
    /// tier.
    async fn vector_search(
        &self,
        vector: &[f32],
        k: usize,
        num_candidates: usize,
    ) -> Result<Vec<(StoredDoc, f64)>>;

    /// Indexed full-text search over the canonical text column.
    async fn text_search(&self, query: &str, k: usize) -> Result<Vec<StoredDoc>>;

    /// Case-insensitive literal substring disjunction across the text, title,
    /// and overview columns.
    async fn token_search(&self, tokens: &[String], k: usize) -> Result<Vec<StoredDoc>>;

    /// Number of records carrying a non-null embedding.
    async fn embedded_count(&self) -> Result<i64>;

    /// Dimensionality of one stored embedding, when any exist.
    async fn sample_embedding_len(&self) -> Result<Option<usize>>;

    /// Whether the configured ANN index name exists on the table.
    async fn vector_index_exists(&self) -> Result<bool>;
}

/// Postgres-backed program record store.
pub struct ProgramStore {
    client: Client,
    table: TableName,
    vector_column: String,
    text_column: String,
    overview_column: String,
    vector_index_name: String,
}

impl ProgramStore {
    /// Wraps an existing connection.
    pub fn new(client: Client, config: &RagConfig) -> Self {
        Self {
            client,
            table: config.table.clone(),
            vector_column: config.vector_column.clone(),
            text_column: config.text_column.clone(),
            overview_column: config.overview_column.clone(),
            vector_index_name: config.vector_index_name.clone(),
        }
    }

    /// Connects to Postgres and spawns the connection driver task.
    pub async fn connect(database_url: &str, config: &RagConfig) -> Result<Self> {
        let (client, connection) = tokio_postgres::connect(database_url, NoTls)
            .await
            .with_context(|| format!("failed to connect to Postgres at {database_url}"))?;
        tokio::spawn(async move {
            if let Err(err) = connection.await {
                tracing::error!("postgres connection error: {err}");
            }
        });
        Ok(Self::new(client, config))
    }

    /// Creates the extension and table when missing. `dims` fixes the vector
    /// column dimensionality for the whole table.
    pub async fn ensure_schema(&self, dims: usize) -> Result<()> {
        anyhow::ensure!(dims > 0, "embedding dimension must be positive");
        self.client
            .execute("CREATE EXTENSION IF NOT EXISTS vector", &[])
            .await
            .context("failed to ensure pgvector extension")?;
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id TEXT PRIMARY KEY,
                title TEXT,
                program_name TEXT,
                {overview} TEXT,
                overview_link TEXT,
                {text} TEXT,
                {vector} VECTOR({dims}),
                text_tsv TSVECTOR GENERATED ALWAYS AS (to_tsvector('english', coalesce({text}, ''))) STORED
            )",
            table = self.table.qualified(),
            overview = quote_ident(&self.overview_column),
            text = quote_ident(&self.text_column),
            vector = quote_ident(&self.vector_column),
        );
        self.client
            .execute(&ddl, &[])
            .await
            .context("failed to create program table")?;
        let fts = format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} USING GIN (text_tsv)",
            self.table.fts_index_name(),
            self.table.qualified()
        );
        self.client
            .execute(&fts, &[])
            .await
            .context("failed to ensure text_tsv GIN index")?;
        Ok(())
    }

    /// Creates the named ANN index over the vector column when missing.
    pub async fn ensure_vector_index(&self) -> Result<()> {
        let sql = format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} USING hnsw ({} vector_cosine_ops)",
            quote_ident(&self.vector_index_name),
            self.table.qualified(),
            quote_ident(&self.vector_column),
        );
        self.client
            .execute(&sql, &[])
            .await
            .context("failed to ensure vector index")?;
        Ok(())
    }

    /// Inserts or overwrites a record by id. The embedding column is left
    /// untouched here; embeddings are written separately once normalized.
    pub async fn upsert_record(&self, record: &ProgramRecord) -> Result<()> {
        let sql = format!(
            "INSERT INTO {table} (id, title, program_name, {overview}, overview_link, {text}) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (id) DO UPDATE SET \
                title = EXCLUDED.title, \
                program_name = EXCLUDED.program_name, \
                {overview} = EXCLUDED.{overview}, \
                overview_link = EXCLUDED.overview_link, \
                {text} = EXCLUDED.{text}",
            table = self.table.qualified(),
            overview = quote_ident(&self.overview_column),
            text = quote_ident(&self.text_column),
        );
        self.client
            .execute(
                &sql,
                &[
                    &record.id,
                    &record.title,
                    &record.program_name,
                    &record.program_overview,
                    &record.overview_link,
                    &record.text,
                ],
            )
            .await
            .with_context(|| format!("failed to upsert record {}", record.id))?;
        Ok(())
    }

    /// Writes a normalized embedding for one record.
    pub async fn set_embedding(&self, id: &str, embedding: &[f32]) -> Result<()> {
        anyhow::ensure!(!embedding.is_empty(), "refusing to store empty embedding");
        let sql = format!(
            "UPDATE {} SET {} = $1 WHERE id = $2",
            self.table.qualified(),
            quote_ident(&self.vector_column),
        );
        let vector = Vector::from(embedding.to_vec());
        let updated = self
            .client
            .execute(&sql, &[&vector, &id])
            .await
            .with_context(|| format!("failed to store embedding for {id}"))?;
        anyhow::ensure!(updated == 1, "no record with id {} to embed", id);
        Ok(())
    }

    /// Records missing an embedding, for the backfill batch.
    pub async fn records_missing_embedding(&self) -> Result<Vec<ProgramRecord>> {
        let sql = format!(
            "SELECT id, title, program_name, {overview}, overview_link, {text} \
             FROM {table} WHERE {vector} IS NULL ORDER BY id",
            overview = quote_ident(&self.overview_column),
            text = quote_ident(&self.text_column),
            table = self.table.qualified(),
            vector = quote_ident(&self.vector_column),
        );
        let rows = self
            .client
            .query(&sql, &[])
            .await
            .context("failed to list records missing embeddings")?;
        Ok(rows
            .iter()
            .map(|row| ProgramRecord {
                id: row.get(0),
                title: row.get(1),
                program_name: row.get(2),
                program_overview: row.get(3),
                overview_link: row.get(4),
                text: row.get(5),
                embedding: None,
            })
            .collect())
    }

    /// Names of all indexes present on the table.
    pub async fn list_index_names(&self) -> Result<Vec<String>> {
        let rows = self
            .client
            .query(
                "SELECT indexname FROM pg_indexes WHERE schemaname = $1 AND tablename = $2",
                &[&self.table.schema(), &self.table.table()],
            )
            .await
            .context("failed to list indexes")?;
        Ok(rows.iter().map(|row| row.get(0)).collect())
    }

    fn doc_from_row(&self, row: &Row) -> StoredDoc {
        StoredDoc {
            id: row.get("id"),
            title: row.get("title"),
            program_name: row.get("program_name"),
            text: row.get("text_body"),
        }
    }

    fn projection(&self) -> String {
        format!(
            "id, title, program_name, {} AS text_body",
            quote_ident(&self.text_column)
        )
    }
}

#[async_trait]
impl SearchBackend for ProgramStore {
    async fn vector_search(
        &self,
        vector: &[f32],
        k: usize,
        num_candidates: usize,
    ) -> Result<Vec<(StoredDoc, f64)>> {
        let query_vector = Vector::from(vector.to_vec());
        let sql = format!(
            "SELECT {projection}, 1 - ({col} <=> $1) AS score \
             FROM {table} WHERE {col} IS NOT NULL \
             ORDER BY {col} <=> $1 ASC LIMIT $2",
            projection = self.projection(),
            col = quote_ident(&self.vector_column),
            table = self.table.qualified(),
        );
        // ef_search is the ANN candidate pool; every query uses the same
        // configured headroom, so a session-level SET is sufficient.
        self.client
            .batch_execute(&format!(
                "SET hnsw.ef_search = {}",
                ann_pool_size(k, num_candidates)
            ))
            .await
            .context("failed to set ANN candidate pool")?;
        let rows = self
            .client
            .query(&sql, &[&query_vector, &(k as i64)])
            .await
            .context("vector search failed")?;
        Ok(rows
            .iter()
            .map(|row| (self.doc_from_row(row), row.get::<_, f64>("score")))
            .collect())
    }

    async fn text_search(&self, query: &str, k: usize) -> Result<Vec<StoredDoc>> {
        let sql = format!(
            "WITH query AS (SELECT plainto_tsquery('english', $1) AS q) \
             SELECT {projection} \
             FROM {table} CROSS JOIN query \
             WHERE numnode(query.q) > 0 AND text_tsv @@ query.q \
             ORDER BY ts_rank_cd(text_tsv, query.q) DESC LIMIT $2",
            projection = self.projection(),
            table = self.table.qualified(),
        );
        let rows = self
            .client
            .query(&sql, &[&query, &(k as i64)])
            .await
            .context("full-text search failed")?;
        Ok(rows.iter().map(|row| self.doc_from_row(row)).collect())
    }

    async fn token_search(&self, tokens: &[String], k: usize) -> Result<Vec<StoredDoc>> {
        if tokens.is_empty() {
            return Ok(Vec::new());
        }
        let patterns: Vec<String> = tokens
            .iter()
            .map(|token| format!("%{}%", escape_like(token)))
            .collect();
        let text = quote_ident(&self.text_column);
        let overview = quote_ident(&self.overview_column);
        let clauses: Vec<String> = (1..=patterns.len())
            .map(|idx| {
                format!(
                    "({text} ILIKE ${idx} OR title ILIKE ${idx} OR {overview} ILIKE ${idx})"
                )
            })
            .collect();
        let sql = format!(
            "SELECT {projection} FROM {table} WHERE {clauses} LIMIT ${limit_idx}",
            projection = self.projection(),
            table = self.table.qualified(),
            clauses = clauses.join(" OR "),
            limit_idx = patterns.len() + 1,
        );
        let limit = k as i64;
        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::with_capacity(patterns.len() + 1);
        for pattern in &patterns {
            params.push(pattern);
        }
        params.push(&limit);
        let rows = self
            .client
            .query(&sql, &params)
            .await
            .context("token substring search failed")?;
        Ok(rows.iter().map(|row| self.doc_from_row(row)).collect())
    }

    async fn embedded_count(&self) -> Result<i64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {} IS NOT NULL",
            self.table.qualified(),
            quote_ident(&self.vector_column),
        );
        let row = self
            .client
            .query_one(&sql, &[])
            .await
            .context("failed to count embedded records")?;
        Ok(row.get(0))
    }

    async fn sample_embedding_len(&self) -> Result<Option<usize>> {
        let sql = format!(
            "SELECT vector_dims({col}) FROM {table} WHERE {col} IS NOT NULL LIMIT 1",
            col = quote_ident(&self.vector_column),
            table = self.table.qualified(),
        );
        let rows = self
            .client
            .query(&sql, &[])
            .await
            .context("failed to sample embedding dimensionality")?;
        match rows.first() {
            Some(row) => {
                let dims: i32 = row.get(0);
                Ok(usize::try_from(dims).ok())
            }
            None => Ok(None),
        }
    }

    async fn vector_index_exists(&self) -> Result<bool> {
        let row = self
            .client
            .query_one(
                "SELECT EXISTS (
                    SELECT 1 FROM pg_indexes
                    WHERE schemaname = $1 AND tablename = $2 AND indexname = $3
                )",
                &[
                    &self.table.schema(),
                    &self.table.table(),
                    &self.vector_index_name.as_str(),
                ],
            )
            .await
            .context("failed to check vector index presence")?;
        Ok(row.get(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualified_table_quotes_identifiers() {
        let table = TableName::new("public", "programs").unwrap();
        assert_eq!(table.qualified(), "\"public\".\"programs\"");
        assert_eq!(table.fts_index_name(), "public_programs_text_tsv_idx");
    }

    #[test]
    fn blank_identifiers_are_rejected() {
        assert!(TableName::new("  ", "programs").is_err());
        assert!(TableName::new("public", "").is_err());
    }

    #[test]
    fn ann_pool_always_exceeds_k() {
        assert_eq!(ann_pool_size(4, 100), 100);
        assert_eq!(ann_pool_size(4, 4), 5);
        assert_eq!(ann_pool_size(10, 0), 11);
    }

    #[test]
    fn escape_like_neutralizes_wildcards() {
        assert_eq!(escape_like("farm.loan*"), "farm.loan*");
        assert_eq!(escape_like("100%_match"), "100\\%\\_match");
        assert_eq!(escape_like("back\\slash"), "back\\\\slash");
    }
}
