use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use agrag::gemini::{EmbeddingIntent, GeminiClient};
use agrag::normalize::normalize;
use agrag::store::{ProgramStore, TableName};
use agrag::RagConfig;
use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;

#[derive(Parser, Debug)]
#[command(
    name = "agrag-backfill",
    about = "Embed every stored program record that is still missing a vector"
)]
struct BackfillCli {
    /// Postgres connection string (postgres://...).
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// Schema for the program table.
    #[arg(long, env = "AGRAG_SCHEMA", default_value = "public")]
    schema: String,

    /// Table storing program records.
    #[arg(long, env = "AGRAG_TABLE", default_value = "programs")]
    table: String,

    /// Gemini API key used for embedding calls.
    #[arg(long, env = "GEMINI_API_KEY")]
    gemini_api_key: String,

    /// Base URL for the Gemini API.
    #[arg(
        long,
        env = "AGRAG_GEMINI_BASE",
        default_value = agrag::DEFAULT_GEMINI_BASE
    )]
    gemini_base_url: String,

    /// Embedding model identifier.
    #[arg(long, env = "EMBEDDING_MODEL", default_value = "text-embedding-004")]
    embedding_model: String,

    /// Expected embedding dimensionality; vectors of any other length are
    /// logged as failures instead of stored.
    #[arg(long, env = "EMBEDDING_DIMENSION", default_value_t = 768)]
    embedding_dimension: usize,

    /// Milliseconds slept between embedding calls to respect provider rate
    /// limits.
    #[arg(long, env = "AGRAG_BACKFILL_DELAY_MS", default_value_t = 350)]
    delay_ms: u64,

    /// JSONL sidecar recording per-record failures.
    #[arg(long, default_value = "failed_backfill.jsonl")]
    failure_log: PathBuf,

    /// Seconds before Gemini requests time out.
    #[arg(long, env = "AGRAG_GEMINI_TIMEOUT_SECS", default_value_t = 30)]
    gemini_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agrag=info".into()),
        )
        .init();
    let cli = BackfillCli::parse();

    let table = TableName::new(cli.schema, cli.table)?;
    let mut config = RagConfig::new(table);
    config.embedding_model = cli.embedding_model.clone();
    config.embedding_dimensions = Some(cli.embedding_dimension);
    let gemini = Arc::new(GeminiClient::new(
        cli.gemini_api_key,
        cli.gemini_base_url,
        cli.embedding_model,
        config.chat_model.clone(),
        Duration::from_secs(cli.gemini_timeout_secs.max(1)),
    )?);
    let store = ProgramStore::connect(&cli.database_url, &config).await?;

    let pending = store.records_missing_embedding().await?;
    println!("found {} record(s) missing embeddings", pending.len());

    let mut attempted = 0usize;
    let mut failed = 0usize;
    for record in pending {
        attempted += 1;
        // Embeddable text: canonical body, then overview, then title.
        let text = record
            .text
            .as_deref()
            .or(record.program_overview.as_deref())
            .or(record.title.as_deref())
            .map(str::trim)
            .filter(|t| !t.is_empty());
        let Some(text) = text else {
            println!("Skipping {} - no text available to embed", record.id);
            continue;
        };

        match embed_one(&gemini, text).await {
            // A wrong-length vector would break the table's uniform
            // dimensionality, so it is recorded as a failure, not stored.
            Ok(vector) if !config.accepts_dimension(vector.len()) => {
                failed += 1;
                let err = anyhow::anyhow!(
                    "embedding length {} does not match the configured dimension {}",
                    vector.len(),
                    cli.embedding_dimension
                );
                eprintln!("Failed to backfill {}: {err:#}", record.id);
                log_failure(&cli.failure_log, &record.id, &err);
            }
            Ok(vector) => match store.set_embedding(&record.id, &vector).await {
                Ok(()) => println!("Backfilled embedding for {} ({attempted})", record.id),
                Err(err) => {
                    failed += 1;
                    eprintln!("Failed to store embedding for {}: {err:#}", record.id);
                    log_failure(&cli.failure_log, &record.id, &err);
                }
            },
            Err(err) => {
                failed += 1;
                eprintln!("Failed to backfill {}: {err:#}", record.id);
                log_failure(&cli.failure_log, &record.id, &err);
            }
        }
        tokio::time::sleep(Duration::from_millis(cli.delay_ms)).await;
    }

    println!("Backfill complete. Attempted: {attempted}, failed: {failed}");
    Ok(())
}

async fn embed_one(gemini: &Arc<GeminiClient>, text: &str) -> Result<Vec<f32>> {
    let client = Arc::clone(gemini);
    let owned = text.to_string();
    let raw = tokio::task::spawn_blocking(move || {
        client.embed_content(&owned, EmbeddingIntent::RetrievalDocument)
    })
    .await
    .context("embedding task failed")??;
    normalize(&raw).context("could not extract embedding as list")
}

fn log_failure(path: &PathBuf, id: &str, err: &anyhow::Error) {
    let entry = json!({ "id": id, "error": format!("{err:#}") });
    let appended = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .and_then(|mut file| writeln!(file, "{entry}"));
    if let Err(io_err) = appended {
        eprintln!("could not record failure for {id}: {io_err}");
    }
}
