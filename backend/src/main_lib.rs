use std::sync::Arc;

use axum::{http::HeaderValue, routing::get, Router};
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::{
    config::Config,
    db,
    handler::{
        create_post, delete_post, get_author_stats, get_config, get_post, get_posts,
        get_posts_by_author, health, search_posts,
    },
    repository::{MysqlPostRepository, PostRepositoryTrait},
};

pub struct AppState {
    pub config: Arc<Config>,
    pub posts: Arc<dyn PostRepositoryTrait>,
}

impl AppState {
    pub fn new(config: Config, posts: Arc<dyn PostRepositoryTrait>) -> Arc<Self> {
        Arc::new(AppState {
            config: Arc::new(config),
            posts,
        })
    }
}

pub fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));
    let registry = tracing_subscriber::registry().with(filter);

    if config.log_format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .init();
    }
}

/// Connects to MySQL, prepares the schema and wires the repository.
pub async fn build_state(config: Config) -> anyhow::Result<Arc<AppState>> {
    let pool = db::connect(&config.database).await?;
    db::init_schema(&pool, config.database.seed_sample_data).await?;
    let posts: Arc<dyn PostRepositoryTrait> = Arc::new(MysqlPostRepository::new(pool));
    Ok(AppState::new(config, posts))
}

pub fn configure_routes(state: Arc<AppState>) -> Router {
    let allowed = if state.config.cors_allow.iter().any(|o| o == "*") {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins = state
            .config
            .cors_allow
            .iter()
            .filter_map(|o| match o.parse::<HeaderValue>() {
                Ok(origin) => Some(origin),
                Err(_) => {
                    tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect::<Vec<HeaderValue>>();
        CorsLayer::new().allow_origin(origins)
    };
    let cors = allowed.allow_methods(Any).allow_headers(Any);

    let timeout = state.config.request_timeout;

    Router::new()
        .route("/health", get(health))
        .route("/config", get(get_config))
        .route("/posts", get(get_posts).post(create_post))
        .route("/posts/search", get(search_posts))
        .route("/posts/author/:author", get(get_posts_by_author))
        .route("/posts/:id", get(get_post).delete(delete_post))
        .route("/authors/:author/stats", get(get_author_stats))
        .with_state(state)
        .layer(cors)
        .layer(TimeoutLayer::new(timeout))
        .layer(TraceLayer::new_for_http())
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::warn!("Received Ctrl+C, shutting down"),
        _ = terminate => tracing::warn!("Received SIGTERM, shutting down"),
    }
}
