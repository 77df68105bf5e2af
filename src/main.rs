//! Situation room worker: wires the MongoDB collaborators, the analysis worker and the room
//! sweeper around one shared state.

use std::sync::Arc;

use tokio::time::sleep;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use situation_room::{
    config::{AppConfig, StorageConnectConfig},
    dao::store::mongodb::{MongoConfig, MongoStore, RetryPolicy},
    services::{
        analysis::{AnalysisPipeline, HeuristicAnalyzer, run_worker},
        review_policy::AllowListPolicy,
        room_sweeper,
    },
    state::{AppState, Collaborators},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let store = Arc::new(connect_store(&config.storage_connect).await);

    let collaborators = Collaborators {
        rooms: store.clone(),
        scenarios: store.clone(),
        messages: store.clone(),
        directory: store,
        review_policy: Arc::new(AllowListPolicy::new(config.reviewers.clone())),
    };
    let pipeline = build_pipeline(&config)?;
    let (state, queue) = AppState::new(config, collaborators);

    tokio::spawn(run_worker(state.clone(), queue, pipeline));
    tokio::spawn(room_sweeper::run(state.clone()));
    info!("situation room worker running");

    shutdown_signal().await;
    info!(
        pending_analysis = state.analysis().in_flight(),
        "shutting down"
    );
    Ok(())
}

/// Keep trying to reach MongoDB with exponential backoff until it answers.
async fn connect_store(settings: &StorageConnectConfig) -> MongoStore {
    let mut delay = settings.initial_delay;
    loop {
        let attempt = match MongoConfig::from_env().await {
            Ok(config) => {
                MongoStore::connect(config.with_retry(RetryPolicy::from(settings))).await
            }
            Err(err) => Err(err),
        };
        match attempt {
            Ok(store) => {
                info!("connected to MongoDB");
                return store;
            }
            Err(err) => {
                warn!(error = %err, retry_in_ms = delay.as_millis() as u64, "MongoDB connection attempt failed");
                sleep(delay).await;
                delay = (delay * 2).min(settings.max_delay);
            }
        }
    }
}

#[cfg(feature = "http-pipeline")]
fn build_pipeline(config: &AppConfig) -> anyhow::Result<Arc<dyn AnalysisPipeline>> {
    use anyhow::Context;
    use situation_room::services::analysis::HttpPipeline;

    match config.analysis.endpoint.as_deref() {
        Some(endpoint) => {
            let pipeline = HttpPipeline::new(endpoint, config.storage_timeout)
                .context("building analysis pipeline client")?;
            info!(endpoint, "using remote analysis pipeline");
            Ok(Arc::new(pipeline))
        }
        None => Ok(Arc::new(HeuristicAnalyzer::new())),
    }
}

#[cfg(not(feature = "http-pipeline"))]
fn build_pipeline(config: &AppConfig) -> anyhow::Result<Arc<dyn AnalysisPipeline>> {
    if config.analysis.endpoint.is_some() {
        warn!("analysis endpoint configured but http-pipeline is disabled; using heuristics");
    }
    Ok(Arc::new(HeuristicAnalyzer::new()))
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,situation_room=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
