use std::sync::Arc;
use std::time::Duration;

use agrag::gemini::{EmbeddingIntent, GeminiClient};
use agrag::normalize::normalize;
use agrag::store::{ProgramStore, SearchBackend, TableName};
use agrag::RagConfig;
use anyhow::Result;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "agrag-doctor",
    about = "Inspect search indexes and embedding dimensionality for the program table"
)]
struct DoctorCli {
    /// Postgres connection string (postgres://...).
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// Schema for the program table.
    #[arg(long, env = "AGRAG_SCHEMA", default_value = "public")]
    schema: String,

    /// Table storing program records.
    #[arg(long, env = "AGRAG_TABLE", default_value = "programs")]
    table: String,

    /// Name of the ANN index over the embedding column.
    #[arg(long, env = "AGRAG_VECTOR_INDEX", default_value = "vector_index")]
    vector_index: String,

    /// Optional Gemini API key; when set, a test embedding is requested and
    /// its length compared to the stored dimensionality.
    #[arg(long, env = "GEMINI_API_KEY")]
    gemini_api_key: Option<String>,

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
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DoctorCli::parse();
    let table = TableName::new(cli.schema, cli.table)?;
    println!("Table: {}", table.qualified());

    let mut config = RagConfig::new(table);
    config.vector_index_name = cli.vector_index.clone();
    config.embedding_model = cli.embedding_model.clone();
    let store = ProgramStore::connect(&cli.database_url, &config).await?;

    match store.list_index_names().await {
        Ok(indexes) if indexes.is_empty() => println!("\nNo indexes found."),
        Ok(indexes) => {
            println!("\nIndexes found:");
            for name in indexes {
                println!("- {name}");
            }
        }
        Err(err) => eprintln!("Error listing indexes: {err:#}"),
    }

    match store.vector_index_exists().await {
        Ok(true) => println!("Vector index '{}' present.", cli.vector_index),
        Ok(false) => println!("Vector index '{}' MISSING.", cli.vector_index),
        Err(err) => eprintln!("Error checking vector index: {err:#}"),
    }

    let stored_dims = match store.embedded_count().await {
        Ok(count) => {
            println!("\nDocuments with '{}' field: {count}", config.vector_column);
            match store.sample_embedding_len().await {
                Ok(Some(dims)) => {
                    println!("Sample stored vector length: {dims}");
                    Some(dims)
                }
                Ok(None) => {
                    println!("No document with an embedding found.");
                    None
                }
                Err(err) => {
                    eprintln!("Error sampling vector: {err:#}");
                    None
                }
            }
        }
        Err(err) => {
            eprintln!("Error counting embedded documents: {err:#}");
            None
        }
    };

    let Some(api_key) = cli.gemini_api_key else {
        println!("\nNo GEMINI_API_KEY set; skipping test embedding.");
        return Ok(());
    };
    let gemini = Arc::new(GeminiClient::new(
        api_key,
        cli.gemini_base_url,
        cli.embedding_model,
        config.chat_model.clone(),
        Duration::from_secs(30),
    )?);
    let raw = tokio::task::spawn_blocking(move || {
        gemini.embed_content(
            "This is a short test sentence to measure embedding length.",
            EmbeddingIntent::RetrievalDocument,
        )
    })
    .await?;
    match raw.map(|value| normalize(&value)) {
        Ok(Some(vector)) => {
            println!("\nTest embedding length: {}", vector.len());
            if let Some(dims) = stored_dims {
                if dims == vector.len() {
                    println!("Stored and model dimensionality agree.");
                } else {
                    println!(
                        "MISMATCH: stored vectors are {dims}-dimensional but the model \
                         returned {} values.",
                        vector.len()
                    );
                }
            }
        }
        Ok(None) => println!("\nCould not extract a vector from the test embedding response."),
        Err(err) => eprintln!("\nError requesting test embedding: {err:#}"),
    }
    Ok(())
}
