use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use agrag::document::ScrapedProgram;
use agrag::store::{ProgramStore, TableName};
use agrag::RagConfig;
use anyhow::{Context, Result};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "agrag-ingest",
    about = "Load scraped program pages (JSONL) into the document store"
)]
struct IngestCli {
    /// Path to the JSONL file of scraped program pages.
    #[arg(long, env = "AGRAG_INGEST_INPUT", default_value = "programs.jsonl")]
    input: PathBuf,

    /// Postgres connection string (postgres://...).
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// Schema for the program table.
    #[arg(long, env = "AGRAG_SCHEMA", default_value = "public")]
    schema: String,

    /// Table storing program records.
    #[arg(long, env = "AGRAG_TABLE", default_value = "programs")]
    table: String,

    /// Create the extension/table automatically when missing.
    #[arg(long, env = "AGRAG_INGEST_PREPARE", default_value_t = true)]
    prepare_table: bool,

    /// Embedding dimensionality used when creating the table.
    #[arg(long, env = "EMBEDDING_DIMENSION", default_value_t = 768)]
    embedding_dimension: usize,

    /// Also create the ANN index over the embedding column. Off by default
    /// so large backfills can run before the index is built.
    #[arg(long, env = "AGRAG_INGEST_CREATE_INDEX", default_value_t = false)]
    create_vector_index: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = IngestCli::parse();
    let file = File::open(&cli.input)
        .with_context(|| format!("failed to open ingest input {:?}", cli.input))?;
    let reader = BufReader::new(file);

    let table = TableName::new(cli.schema, cli.table)?;
    let mut config = RagConfig::new(table);
    config.embedding_dimensions = Some(cli.embedding_dimension);
    let store = ProgramStore::connect(&cli.database_url, &config).await?;
    if cli.prepare_table {
        if let Some(dims) = config.embedding_dimensions {
            store.ensure_schema(dims).await?;
        }
    }
    if cli.create_vector_index {
        store.ensure_vector_index().await?;
    }

    let mut upserted = 0usize;
    let mut skipped = 0usize;
    for (line_no, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read line {}", line_no + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        let page: ScrapedProgram = match serde_json::from_str(&line) {
            Ok(page) => page,
            Err(err) => {
                skipped += 1;
                eprintln!("skipping line {}: invalid scraped page: {err}", line_no + 1);
                continue;
            }
        };
        // Pages without a derivable stable id cannot be keyed and are
        // skipped rather than duplicated under a synthetic key.
        let Some(record) = page.into_record() else {
            skipped += 1;
            eprintln!("skipping line {}: no source url or title", line_no + 1);
            continue;
        };
        store.upsert_record(&record).await?;
        upserted += 1;
    }

    println!(
        "Ingest complete: {upserted} record(s) upserted, {skipped} skipped. \
         Run agrag-backfill to embed new records."
    );
    Ok(())
}
