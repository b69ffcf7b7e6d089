/*
cryptopulse - API service binary
Serves the HTTP API (default) or maintains the vector index from the command line.
*/

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use common::Config;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use common::init_db_pool;

use cryptopulse::llm::remote::RemoteLlmProvider;
use cryptopulse::llm::LlmProvider;
use cryptopulse::rag::{
    AnswerCache, Embedder, LocalEmbedder, PromptStyle, RagPipeline, RagSettings, RemoteEmbedder,
    VectorIndex,
};
use cryptopulse::server::{self, AppState};
use cryptopulse::{sources, storage};

#[derive(Parser, Debug)]
#[command(name = "cryptopulse", about = "CryptoPulse news assistant API")]
struct Args {
    /// Path to config.toml
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Override log level (info, debug, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API (default)
    Serve,
    /// Vector index maintenance
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },
}

#[derive(Subcommand, Debug)]
enum IndexAction {
    /// Rebuild the index from the configured sources and save it
    Build,
    /// Print size and dimensions of the saved index
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let config = load_config(args.config).await?;

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Index {
            action: IndexAction::Build,
        } => build_index(config).await,
        Command::Index {
            action: IndexAction::Stats,
        } => index_stats(config),
    }
}

async fn load_config(explicit: Option<PathBuf>) -> Result<Config> {
    let default_path = PathBuf::from("config.default.toml");

    let override_path = if let Some(p) = explicit {
        if !p.exists() {
            error!(path = ?p, "specified config file not found");
            return Err(anyhow::anyhow!("Config file not found: {}", p.display()));
        }
        Some(p)
    } else {
        let p = PathBuf::from("config.toml");
        if p.exists() {
            Some(p)
        } else {
            None
        }
    };

    let config = Config::load_with_defaults(
        if default_path.exists() {
            Some(&default_path)
        } else {
            None
        },
        override_path.as_deref(),
    )
    .await
    .map_err(|e| {
        error!(%e, "failed to load configuration");
        e
    })?;
    info!(default = ?default_path, override = ?override_path, "configuration loaded");
    Ok(config)
}

async fn serve(config: Config) -> Result<()> {
    // Resolve and log the absolute DB path before connecting
    let db_path_abs = match tokio::fs::canonicalize(&config.database.path).await {
        Ok(p) => p.to_string_lossy().to_string(),
        Err(_) => config.database.path.clone(),
    };
    info!(db_path = %db_path_abs, "resolved DB path");

    let db_pool = init_db_pool(&db_path_abs).await.map_err(|e| {
        error!(%e, db_path = %db_path_abs, "failed to initialize database pool");
        e
    })?;
    storage::ensure_schema(&db_pool).await?;

    let llm = create_llm_provider(&config)?;
    let embedder = create_embedder(&config)?;
    let settings = rag_settings(&config)?;
    let cache = create_cache(&config);
    let sources = sources::from_config(&config.sources);

    let pipeline = RagPipeline::initialize(settings, &sources, embedder, llm, cache)
        .await
        .context("failed to initialize the RAG pipeline")?;
    let (chunks, dimensions) = pipeline.stats();
    info!(chunks, dimensions, "RAG pipeline ready");

    let state = AppState {
        started_at: Utc::now(),
        db: db_pool,
        pipeline: Arc::new(pipeline),
        history_limit: config
            .history
            .as_ref()
            .and_then(|h| h.max_messages)
            .unwrap_or(50),
    };

    let (address, port) = config.server_address();
    server::launch(state, &address, port).await
}

async fn build_index(config: Config) -> Result<()> {
    let embedder = create_embedder(&config)?;
    let settings = rag_settings(&config)?;
    let sources = sources::from_config(&config.sources);
    if sources.is_empty() {
        anyhow::bail!("no sources configured: add [[sources.tables]] or [[sources.feeds]]");
    }

    let index = RagPipeline::build_index(&settings, embedder.as_ref(), &sources).await?;
    if index.is_empty() {
        anyhow::bail!("no documents were collected; the existing index was left untouched");
    }
    index.save(&settings.index_path)?;
    println!(
        "indexed {} chunks ({} dimensions) into {}",
        index.len(),
        index.dimensions(),
        settings.index_path.display()
    );
    Ok(())
}

fn index_stats(config: Config) -> Result<()> {
    let settings = rag_settings(&config)?;
    if !VectorIndex::exists(&settings.index_path) {
        println!("no index at {}", settings.index_path.display());
        return Ok(());
    }
    let index = VectorIndex::load(&settings.index_path)?;
    println!("path:       {}", settings.index_path.display());
    println!("chunks:     {}", index.len());
    println!("dimensions: {}", index.dimensions());
    println!("sources:    {}", index.sources().join(", "));
    Ok(())
}

fn rag_settings(config: &Config) -> Result<RagSettings> {
    let defaults = RagSettings::default();
    let index = config.index.as_ref();
    let llm = config.llm.as_ref();

    let prompt_style = match llm.and_then(|l| l.prompt_style.as_deref()) {
        Some(s) => s.parse::<PromptStyle>().map_err(anyhow::Error::msg)?,
        None => PromptStyle::default(),
    };

    Ok(RagSettings {
        index_path: index
            .map(|i| PathBuf::from(&i.path))
            .unwrap_or(defaults.index_path),
        chunk_size: index.and_then(|i| i.chunk_size).unwrap_or(defaults.chunk_size),
        chunk_overlap: index
            .and_then(|i| i.chunk_overlap)
            .unwrap_or(defaults.chunk_overlap),
        top_k: index.and_then(|i| i.top_k).unwrap_or(defaults.top_k),
        prompt_style,
        temperature: llm.and_then(|l| l.temperature),
        max_tokens: llm.and_then(|l| l.max_tokens),
    })
}

fn create_cache(config: &Config) -> Option<AnswerCache> {
    let cache = config.cache.as_ref();
    let capacity = cache.and_then(|c| c.capacity).unwrap_or(256);
    let ttl = Duration::from_secs(cache.and_then(|c| c.ttl_seconds).unwrap_or(900));
    let cache = AnswerCache::new(capacity, ttl);
    if cache.is_none() {
        info!("answer cache disabled");
    }
    cache
}

/// Create the answer generator from the [llm] section
fn create_llm_provider(config: &Config) -> Result<Arc<dyn LlmProvider>> {
    let llm_config = config
        .llm
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("missing [llm] configuration"))?;

    let api_key_env = llm_config.api_key_env.as_deref().unwrap_or("OPENAI_API_KEY");
    let api_key = std::env::var(api_key_env)
        .with_context(|| format!("LLM API key env var '{}' not set", api_key_env))?;

    let model = llm_config.model.clone().unwrap_or_else(|| "gpt-4o".to_string());
    let api_url = llm_config
        .api_url
        .clone()
        .unwrap_or_else(|| "https://api.openai.com/v1/chat/completions".to_string());

    let provider = RemoteLlmProvider::new(api_url.clone(), api_key, model.clone()).with_defaults(
        llm_config.timeout_seconds.unwrap_or(60),
        llm_config.max_tokens.unwrap_or(800),
        llm_config.temperature.unwrap_or(0.6),
    );
    info!("LLM provider initialized: remote ({}) at {}", model, api_url);
    Ok(Arc::new(provider))
}

/// Create the sentence embedder from the [embedding] section
fn create_embedder(config: &Config) -> Result<Arc<dyn Embedder>> {
    let emb = config.embedding.as_ref();
    let provider = emb.and_then(|e| e.provider.as_deref()).unwrap_or("local");
    match provider {
        "local" => {
            let model = emb
                .and_then(|e| e.model.as_deref())
                .unwrap_or("all-MiniLM-L6-v2");
            Ok(Arc::new(LocalEmbedder::new(model)?))
        }
        "remote" => {
            let emb = emb.ok_or_else(|| anyhow::anyhow!("missing [embedding] configuration"))?;
            let api_url = emb
                .api_url
                .as_deref()
                .unwrap_or("https://api.openai.com/v1/embeddings");
            let api_key_env = emb.api_key_env.as_deref().unwrap_or("OPENAI_API_KEY");
            let api_key = match std::env::var(api_key_env) {
                Ok(k) => k,
                Err(_) => {
                    // local OpenAI-compatible servers often run without auth
                    warn!("embedding API key env var '{}' not set", api_key_env);
                    String::new()
                }
            };
            let model = emb
                .model
                .clone()
                .unwrap_or_else(|| "text-embedding-3-small".to_string());
            info!("embedding provider initialized: remote ({}) at {}", model, api_url);
            Ok(Arc::new(RemoteEmbedder::new(
                api_url,
                api_key,
                model,
                emb.timeout_seconds.unwrap_or(30),
            )))
        }
        other => anyhow::bail!("Unknown embedding provider: {}", other),
    }
}
