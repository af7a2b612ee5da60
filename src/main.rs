use std::sync::Arc;

use tokio::sync::mpsc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use watchfeed::api::{create_router, AppState};
use watchfeed::config::Config;
use watchfeed::services::{
    Aggregator, Clock, InstanceRegistry, JustWatchClient, PollContext, Registry, SystemClock,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let (notifier, notifications) = mpsc::unbounded_channel();

    let ctx = PollContext {
        source: Arc::new(JustWatchClient::new(
            config.justwatch_api_url.clone(),
            Arc::clone(&clock),
        )),
        aggregator: Arc::new(Aggregator::new(config.image_base_url.clone())),
        registry: Arc::new(Registry::new()),
        clock,
        notifier,
    };

    let instances = Arc::new(InstanceRegistry::new(ctx));
    let state = AppState::new(Arc::clone(&instances));
    let pump = state.spawn_notification_pump(notifications);

    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(config.bind_address()).await?;
    tracing::info!(address = %config.bind_address(), "Server running");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    instances.shutdown().await;
    pump.abort();

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
