//! dataqna HTTP server
//!
//! Answers natural-language questions about registered data sources with
//! generated, validated SQL, optionally running it and summarizing the rows.

use anyhow::Context;
use dataqna_core::SourceType;
use dataqna_exec::{DuckBackend, PgBackend, QueryExecutor};
use dataqna_pipeline::{Collaborators, Pipeline};
use dataqna_server::llm::{
    self, BuildAgent, ChatAgent, DebugAgent, OpenAiEmbedder, ResponderAgent, VisualizeAgent,
};
use dataqna_server::{logging, router, AppState, Config, Metrics};
use dataqna_store::DuckMetadataStore;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config_path =
        std::env::var("DATAQNA_CONFIG").unwrap_or_else(|_| "config.yaml".to_string());
    let config = if Path::new(&config_path).exists() {
        Config::load(&config_path).with_context(|| format!("loading {}", config_path))?
    } else {
        let mut config = Config::default();
        config.apply_env_overrides()?;
        config
    };

    logging::init(&config.logging);
    info!(config = %config_path, "Configuration loaded");

    let client = llm::client(Config::get_openai_api_key()?);
    info!(
        chat_model = %config.models.chat_model,
        embedding_model = %config.models.embedding_model,
        "Using OpenAI models"
    );

    if let Some(parent) = Path::new(&config.storage.metadata_db).parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let store = Arc::new(DuckMetadataStore::open(&config.storage.metadata_db)?);

    let mut executor = QueryExecutor::new();
    if let Some(path) = &config.storage.duckdb_path {
        executor = executor.with_backend(Arc::new(DuckBackend::open(path)?));
    }
    if let Some(url) = &config.storage.postgres_url {
        executor = executor.with_backend(Arc::new(PgBackend::connect_lazy(
            url,
            config.storage.postgres_max_connections,
        )?));
    }
    for source_type in [SourceType::DuckDb, SourceType::Postgres] {
        if !executor.supports(source_type) {
            warn!(%source_type, "No backend configured; queries against these sources will fail");
        }
    }

    let chat = ChatAgent::new(
        client.clone(),
        &config.models.chat_model,
        config.models.temperature,
    );
    let embedder = Arc::new(OpenAiEmbedder::new(client, &config.models.embedding_model));

    let pipeline = Pipeline::new(
        config.pipeline.clone(),
        Collaborators {
            catalog: store.clone(),
            store: store.clone(),
            embedder: embedder.clone(),
            builder: Arc::new(BuildAgent::new(chat.clone())),
            validator: Arc::new(DebugAgent::new(chat.clone(), executor.clone())),
            summarizer: Arc::new(ResponderAgent::new(chat.clone())),
            executor,
            audit: store.clone(),
        },
    );

    let state = AppState {
        pipeline: Arc::new(pipeline),
        catalog: store.clone(),
        examples: store,
        embedder,
        charts: Arc::new(VisualizeAgent::new(chat)),
        metrics: Arc::new(Metrics::new()?),
    };

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!(%addr, "dataqna server listening");

    axum::serve(listener, router(state)).await?;

    Ok(())
}
