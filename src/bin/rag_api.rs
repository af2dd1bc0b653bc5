use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use agrag::gemini::GeminiClient;
use agrag::pipeline::RagPipeline;
use agrag::store::{ProgramStore, TableName};
use agrag::RagConfig;
use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use serde::{Deserialize, Serialize};

#[derive(Parser, Debug)]
#[command(
    name = "agrag-api",
    about = "HTTP API answering questions about assistance programs via retrieval-augmented generation"
)]
struct ApiCli {
    /// Address to bind the HTTP server to (host:port).
    #[arg(long, env = "AGRAG_BIND", default_value = "127.0.0.1:8080")]
    bind: String,

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

    /// Name of the ANN index over the embedding column.
    #[arg(long, env = "AGRAG_VECTOR_INDEX", default_value = "vector_index")]
    vector_index: String,

    /// Column storing document embeddings.
    #[arg(long, env = "AGRAG_VECTOR_FIELD", default_value = "embedding")]
    vector_field: String,

    /// Column storing the canonical text body.
    #[arg(long, env = "AGRAG_TEXT_FIELD", default_value = "text")]
    text_field: String,

    /// Documents retrieved per query.
    #[arg(long, default_value_t = 4)]
    top_k: usize,

    /// ANN candidate pool size; must exceed top-k.
    #[arg(long, default_value_t = 100)]
    num_candidates: usize,

    /// Seconds before Gemini requests time out.
    #[arg(long, env = "AGRAG_GEMINI_TIMEOUT_SECS", default_value_t = 60)]
    gemini_timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
struct UserQuery {
    query: String,
}

#[derive(Debug, Serialize)]
struct ChatResponse {
    response: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agrag=info".into()),
        )
        .init();
    let cli = ApiCli::parse();

    let table = TableName::new(cli.schema, cli.table)?;
    let mut config = RagConfig::new(table);
    config.vector_column = cli.vector_field;
    config.text_column = cli.text_field;
    config.vector_index_name = cli.vector_index;
    config.embedding_model = cli.embedding_model.clone();
    config.chat_model = cli.chat_model.clone();
    config.top_k = cli.top_k.max(1);
    config.num_candidates = cli.num_candidates.max(cli.top_k + 1);

    let gemini = Arc::new(GeminiClient::new(
        cli.gemini_api_key,
        cli.gemini_base_url,
        cli.embedding_model,
        cli.chat_model,
        Duration::from_secs(cli.gemini_timeout_secs.max(1)),
    )?);
    let store = Arc::new(ProgramStore::connect(&cli.database_url, &config).await?);
    let pipeline = Arc::new(RagPipeline::new(store, gemini.clone(), gemini, config));

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/chat", post(chat_handler))
        .with_state(pipeline);

    let addr: SocketAddr = cli
        .bind
        .parse()
        .with_context(|| format!("invalid bind address {}", cli.bind))?;
    println!("agrag-api listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app)
        .await
        .context("server shutdown")?;
    Ok(())
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn chat_handler(
    State(pipeline): State<Arc<RagPipeline>>,
    Json(request): Json<UserQuery>,
) -> Json<ChatResponse> {
    // Every terminal state is returned as ordinary text; the endpoint never
    // surfaces an error status for a well-formed request.
    let response = pipeline.answer_text(&request.query, None).await;
    Json(ChatResponse { response })
}
