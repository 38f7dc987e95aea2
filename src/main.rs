use axum::{routing::get, Router};
use barline::config::Config;
use barline::services::{
    ChartPublisher, Notifier, Pipeline, PipelineRunner, RecordingNotifier, WebhookNotifier,
};
use barline::sources::{FeedClient, HistoryClient};
use barline::{api, websocket, AppState};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "barline=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Arc::new(Config::from_env());
    info!("Starting Barline server on {}:{}", config.host, config.port);

    let settings = config.pipeline_settings();
    info!(
        "Following {} @ {} as {} (overlays: {:?})",
        settings.symbol,
        settings.resolution.label,
        settings.chart_type.as_str(),
        settings.overlays.iter().map(|o| o.id()).collect::<Vec<_>>()
    );

    // Signal delivery
    let notifier: Arc<dyn Notifier> = match &config.webhook_url {
        Some(url) => {
            info!("Signals will be posted to {}", url);
            Arc::new(WebhookNotifier::new(
                url.clone(),
                config.webhook_template.clone(),
                Duration::from_millis(config.notifier_timeout_ms),
            )?)
        }
        None => {
            warn!("WEBHOOK_URL not set, signals are only logged");
            Arc::new(RecordingNotifier::new())
        }
    };

    // Historical backfill (optional)
    let history = match &config.history_url {
        Some(url) => Some(Arc::new(HistoryClient::new(url.clone())?)),
        None => {
            warn!("HISTORY_URL not set, starting without backfill");
            None
        }
    };

    // Start the pipeline task
    let publisher = ChartPublisher::default();
    let pipeline = Pipeline::new(settings, publisher.clone(), notifier);
    let (runner, handle) = PipelineRunner::new(pipeline, history);
    runner.spawn();

    // Start the upstream feed
    match &config.feed_ws_url {
        Some(url) => {
            let feed = FeedClient::new(url.clone(), handle.subscription.clone(), handle.commands.clone());
            tokio::spawn(async move {
                if let Err(e) = feed.connect().await {
                    tracing::error!("Feed WebSocket error: {}", e);
                }
            });
        }
        None => warn!("FEED_WS_URL not set, no live data will arrive"),
    }

    // Create application state
    let state = AppState {
        config: config.clone(),
        pipeline: handle,
        publisher,
    };

    // Build CORS layer
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build the router
    let app = Router::new()
        .merge(api::router())
        .route("/ws", get(websocket::ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start the server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Barline server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
