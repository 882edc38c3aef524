use std::sync::Arc;
use axum::{
    http::{HeaderValue, Method},
    routing::get,
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tracing::{error, info, warn};

use booking_notify::{
    config::Config,
    models::session::Session,
    routes,
    services::{
        FileKeyValueStore, HttpNotificationBackend, KeyValueStore, NotificationPoller,
        NotificationSyncAgent, PopupPreference,
    },
    state::AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 加载配置
    dotenv::dotenv().ok();
    let config = Config::from_env()?;

    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.log_level))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting booking-notify...");

    // 没有会话时不启动同步，提示先登录
    let session = Session::from_config(&config);
    if !session.is_authenticated() {
        error!("No authenticated session configured (SESSION_SUBJECT_ID); sign in first");
        return Err(anyhow::anyhow!("Not authenticated"));
    }

    let file_store = FileKeyValueStore::new(&config.preferences_path);
    info!("Using preference file {}", file_store.path().display());
    let store: Arc<dyn KeyValueStore> = Arc::new(file_store);
    let preference = PopupPreference::load(store).await;

    let backend = Arc::new(HttpNotificationBackend::new(&config)?);
    let agent = Arc::new(NotificationSyncAgent::new(backend, &session, preference)?);

    agent.initialize().await;
    let poller = NotificationPoller::spawn(agent.clone(), config.poll_interval());

    let app_state = Arc::new(AppState::new(config.clone(), agent));

    let cors = build_cors(&app_state);

    let app = Router::new()
        .route("/health", get(health_check))
        .nest("/api/notifications", routes::notifications::router())
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state);

    let addr = format!("{}:{}", config.server_host, config.server_port);
    info!("Starting server on http://{}", addr);

    axum::Server::bind(&addr.parse()?)
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    poller.shutdown().await;
    info!("booking-notify stopped");

    Ok(())
}

async fn health_check() -> &'static str {
    "booking-notify is running!"
}

fn build_cors(state: &AppState) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers(Any);

    if state.is_development() {
        return cors.allow_origin(Any);
    }

    let origins = state
        .config
        .cors_allowed_origins
        .split(',')
        .filter_map(|origin| match origin.trim().parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Ignoring invalid CORS origin {:?}: {}", origin, e);
                None
            }
        })
        .collect::<Vec<_>>();

    cors.allow_origin(origins)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");
}
