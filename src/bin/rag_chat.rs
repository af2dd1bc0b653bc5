use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::time::Duration;

use agrag::gemini::GeminiClient;
use agrag::pipeline::RagPipeline;
use agrag::store::{ProgramStore, TableName};
use agrag::RagConfig;
use anyhow::Result;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "agrag-chat",
    about = "Interactive terminal chat against the program knowledge base"
)]
struct ChatCli {
    /// Postgres connection string (postgres://...).
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// Schema for the program table.
    #[arg(long, env = "AGRAG_SCHEMA", default_value = "public")]
    schema: String,

    /// Table storing program records.
    #[arg(long, env = "AGRAG_TABLE", default_value = "programs")]
    table: String,

    /// Gemini API key used for embeddings and generation.
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

    /// Chat model used for answer synthesis.
    #[arg(long, env = "AGRAG_CHAT_MODEL", default_value = "gemini-2.5-flash")]
    chat_model: String,

    /// Documents retrieved per query.
    #[arg(long, default_value_t = 4)]
    top_k: usize,

    /// Seconds before Gemini requests time out.
    #[arg(long, env = "AGRAG_GEMINI_TIMEOUT_SECS", default_value_t = 60)]
    gemini_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agrag=warn".into()),
        )
        .init();
    let cli = ChatCli::parse();

    let table = TableName::new(cli.schema, cli.table)?;
    let mut config = RagConfig::new(table);
    config.embedding_model = cli.embedding_model.clone();
    config.chat_model = cli.chat_model.clone();
    config.top_k = cli.top_k.max(1);
    let gemini = Arc::new(GeminiClient::new(
        cli.gemini_api_key,
        cli.gemini_base_url,
        cli.embedding_model,
        cli.chat_model,
        Duration::from_secs(cli.gemini_timeout_secs.max(1)),
    )?);
    let store = Arc::new(ProgramStore::connect(&cli.database_url, &config).await?);
    let pipeline = RagPipeline::new(store, gemini.clone(), gemini, config);

    println!("Program knowledge-base chat initialized. Type 'quit' to exit.");
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    loop {
        print!("You: ");
        stdout.flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let question = line.trim();
        if question.eq_ignore_ascii_case("quit") {
            break;
        }
        if question.is_empty() {
            continue;
        }
        let answer = pipeline.answer_text(question, None).await;
        println!("\nAI:\n{answer}");
        println!("{}\n", "-".repeat(50));
    }

    println!("Chat closed.");
    Ok(())
}
