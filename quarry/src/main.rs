use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use quarry::api::{create_router, AppState};
use quarry::config::Config;
use quarry::db::{Database, DatabaseBackend, LibSqlBackend, MetadataStore};
use quarry::embeddings::{ApiEmbedder, Embedder};
use quarry::llm::{LanguageModel, OpenAiLlm};
use quarry::processing::DocumentExtractor;
use quarry::tenancy::{OrphanSweeper, Reaper};

#[derive(Parser)]
#[command(name = "quarry")]
#[command(about = "Self-hostable multi-tenant RAG backend")]
struct Args {
    /// Run the anonymous-data sweep once and exit.
    #[arg(long)]
    reap_once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quarry=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    if config.auth.jwt_secret.len() < 32 {
        return Err(anyhow::anyhow!(
            "JWT_SECRET must be set to at least 32 bytes"
        ));
    }

    tracing::info!("Initializing database...");
    let raw_db = Database::new(&config.database, config.embeddings.dimensions).await?;
    let db: Arc<dyn DatabaseBackend> = Arc::new(LibSqlBackend::new(raw_db));

    // Dimensionality is fixed at collection creation; a mismatch means the
    // stored vectors are unreadable with this embedder and startup refuses.
    match db.get_embedding_dimensions().await? {
        Some(stored) if stored != config.embeddings.dimensions => {
            return Err(anyhow::anyhow!(
                "Embedding dimension mismatch: collections hold {stored}, EMBEDDING_DIMENSIONS is {}",
                config.embeddings.dimensions
            ));
        }
        Some(_) => {}
        None => {
            db.set_embedding_dimensions(config.embeddings.dimensions)
                .await?;
        }
    }

    tracing::info!("Initializing embedding provider: {}...", config.embeddings.model);
    let embedder: Arc<dyn Embedder> = Arc::new(ApiEmbedder::new(&config.embeddings)?);

    let llm: Option<Arc<dyn LanguageModel>> = match &config.llm {
        Some(llm_config) => {
            tracing::info!("Initializing LLM provider: {}...", llm_config.model);
            Some(Arc::new(OpenAiLlm::new(llm_config)?))
        }
        None => {
            tracing::warn!("LLM_MODEL not set - answers, summaries and graph lookup are disabled");
            None
        }
    };

    let cancel_token = CancellationToken::new();
    let state = AppState::new(
        config.clone(),
        db.clone(),
        embedder,
        llm,
        Arc::new(DocumentExtractor),
        cancel_token.clone(),
    )?;

    let reaper = Reaper::new(
        db.clone(),
        config.reaper.clone(),
        config.auth.anonymous_ttl_days,
    );
    let orphans = OrphanSweeper::new(db.clone(), config.reaper.batch_size);

    if args.reap_once {
        let summary = reaper.run_once().await?;
        let orphaned = orphans.run_once().await?;
        tracing::info!(?summary, orphaned, "One-shot sweep finished");
        return Ok(());
    }

    // Daily reaper + orphan diff at the configured hour.
    {
        let reaper = reaper.clone();
        let orphans = orphans.clone();
        let token = cancel_token.child_token();
        tokio::spawn(async move {
            loop {
                let wait_secs = reaper.seconds_until_next_run();
                tracing::info!(wait_secs, "Reaper sleeping until next sweep");
                tokio::select! {
                    _ = token.cancelled() => {
                        tracing::info!("Reaper shutting down...");
                        break;
                    }
                    _ = tokio::time::sleep(tokio::time::Duration::from_secs(wait_secs)) => {
                        if let Err(e) = reaper.run_once().await {
                            tracing::error!("Reaper error: {}", e);
                        }
                        if let Err(e) = orphans.run_once().await {
                            tracing::error!("Orphan sweep error: {}", e);
                        }
                    }
                }
            }
        });
    }

    // Hourly task-record TTL sweep.
    {
        let tasks = state.ingestor.tasks().clone();
        let token = cancel_token.child_token();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(tokio::time::Duration::from_secs(3600)) => {
                        let swept = tasks.sweep();
                        if swept > 0 {
                            tracing::debug!(swept, "Swept stale task records");
                        }
                    }
                }
            }
        });
    }

    let app = create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!("Quarry starting on http://{}", addr);
    tracing::info!("  Health check: http://{}/api/v1/health", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel_token))
        .await?;

    Ok(())
}

async fn shutdown_signal(cancel_token: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, cancelling background tasks...");
    cancel_token.cancel();
}
