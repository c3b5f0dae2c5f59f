use anyhow::{Context, Result};
use presence_core::{CandidateMatcher, Classifier, Clock, CosineScorer, Scorer, SystemClock};
use presence_store::Store;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod api;
mod broadcast;
mod config;
mod pipeline;
mod scorer;

use broadcast::Broadcaster;
use config::{Config, ScorerKind};
use pipeline::{Collaborators, Pipeline};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("presenced starting");

    let config = Config::load().context("failed to load configuration")?;
    tracing::info!(
        bind_addr = %config.bind_addr,
        db_path = %config.db_path.display(),
        threshold = config.similarity_threshold,
        check_in_before = %config.check_in_before,
        scorer = ?config.scorer,
        "configuration loaded"
    );

    let store = Store::open(&config.db_path)
        .await
        .with_context(|| format!("failed to open database {}", config.db_path.display()))?;

    let scorer: Arc<dyn Scorer> = match config.scorer {
        ScorerKind::Cosine => Arc::new(CosineScorer),
        ScorerKind::Http => {
            let url = config
                .scorer_url
                .clone()
                .context("scorer_url is required for the http scorer")?;
            let timeout = Duration::from_secs(config.scorer_timeout_secs);
            Arc::new(scorer::HttpScorer::new(url, timeout).context("failed to build scorer client")?)
        }
    };

    let broadcaster = Broadcaster::new(config.broadcast_capacity);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let pipeline = Pipeline::new(
        Collaborators::from_store(store.clone()),
        CandidateMatcher::new(scorer, config.similarity_threshold, config.scorer_parallelism),
        Classifier::new(config.check_in_before()?),
        clock.clone(),
        broadcaster.clone(),
    );

    let app = api::router(api::AppState {
        pipeline,
        store,
        broadcaster,
        clock,
    });

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    tracing::info!(addr = %listener.local_addr()?, "presenced ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    tracing::info!("presenced shutting down");
    Ok(())
}
