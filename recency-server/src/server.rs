//! Router assembly, tracing setup and the serve loop.

use std::{
    sync::{Arc, OnceLock},
    time::Duration,
};

use axum::{
    Extension, Router,
    http::{HeaderValue, Method, StatusCode, header},
    middleware,
    response::IntoResponse,
    routing::get,
    serve,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use recency_shared::config::server::{Config, DatabaseConfig, LogFormat};
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::{EnvFilter, fmt};

use crate::{
    app_state::AppState,
    clock::SystemClock,
    db::bootstrap::{self, BootstrapError},
    middleware::request_context::{self, RequestIdState},
    routes,
    services::{MemorySummaryStore, PgSummaryStore, SharedSummaryStore},
    tracer,
};

/// Failures that stop the server from starting or serving.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The database pool could not be created.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    /// Schema bootstrap or a health check failed.
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),
    /// The listener could not bind or the serve loop failed.
    #[error("failed to bind or serve: {0}")]
    Io(#[from] std::io::Error),
}

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Process-wide Prometheus handle. The recorder is installed on first use.
pub fn metrics_handle() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let recorder = PrometheusBuilder::new().build_recorder();
            let handle = recorder.handle();
            if metrics::set_global_recorder(recorder).is_err() {
                warn!("a metrics recorder was already installed; /metrics will be empty");
            }
            handle
        })
        .clone()
}

async fn metrics_endpoint(Extension(handle): Extension<PrometheusHandle>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; version=0.0.4"),
        )],
        handle.render(),
    )
}

/// Initializes the tracing subscriber for logging using the provided configuration.
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn initialize_tracing(config: &Config) -> String {
    let fmt_builder = fmt::fmt()
        .with_env_filter(build_env_filter(config))
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false);

    // A subscriber may already be installed (tests, embedding).
    let installed = if matches!(config.logging.format, LogFormat::Json) {
        fmt_builder.json().with_ansi(false).try_init()
    } else {
        fmt_builder.with_ansi(true).try_init()
    };
    if installed.is_err() {
        warn!("tracing subscriber already installed; keeping it");
    }

    config.logging.level.clone()
}

fn build_env_filter(config: &Config) -> EnvFilter {
    let default_level = config
        .logging
        .level
        .parse::<LevelFilter>()
        .unwrap_or(LevelFilter::INFO);

    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::builder()
            .with_default_directive(default_level.into())
            .parse_lossy("")
    })
}

/// Creates a database connection pool.
///
/// # Errors
/// Returns an error if the database connection pool cannot be created.
pub async fn create_database_pool(
    db: &DatabaseConfig,
    url: &str,
) -> Result<sqlx::PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(db.max_connections)
        .connect(url)
        .await?;
    metrics::gauge!("db_pool_max_connections").set(f64::from(db.max_connections));
    Ok(pool)
}

/// Picks the summary store: Postgres when a database URL is configured,
/// the in-process store otherwise.
///
/// # Errors
/// Returns an error if the database is unreachable or bootstrap fails.
pub async fn create_summary_store(config: &Config) -> Result<SharedSummaryStore, ServerError> {
    let Some(url) = config.db.url.as_deref() else {
        warn!("no database url configured; summaries are kept in memory");
        return Ok(Arc::new(MemorySummaryStore::new()));
    };

    let pool = create_database_pool(&config.db, url).await?;
    bootstrap::ensure_liveness(&pool).await?;
    if config.db.run_bootstrap {
        bootstrap::run(&pool, &config.db).await?;
    }
    bootstrap::ensure_readiness(&pool).await?;

    info!(max_connections = config.db.max_connections, "using postgres summary store");
    Ok(Arc::new(PgSummaryStore::new(pool)))
}

/// Creates the CORS layer. No configured origins means any origin.
pub fn create_cors_layer(config: &Config) -> CorsLayer {
    let methods = vec![Method::GET, Method::POST, Method::PATCH, Method::OPTIONS];

    let cors = CorsLayer::new()
        .allow_methods(AllowMethods::list(methods))
        .allow_headers(AllowHeaders::any())
        .max_age(Duration::from_secs(600));

    if config.server.cors_allowed_origins.is_empty() {
        cors.allow_origin(AllowOrigin::any())
    } else {
        let origins = config
            .server
            .cors_allowed_origins
            .iter()
            .filter_map(|origin| HeaderValue::from_str(origin).ok())
            .collect::<Vec<_>>();
        cors.allow_origin(AllowOrigin::list(origins))
    }
}

/// Routes mounted under `/api`.
pub fn create_api_router() -> Router<Arc<AppState>> {
    routes::conversations::create_router_conversations()
}

/// Creates the main application router with all middleware and routes.
pub fn create_app_router(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let cors = create_cors_layer(state.config());
    let request_id_state = RequestIdState::from_config(state.config());

    Router::new()
        .nest("/api", create_api_router())
        .merge(routes::health::create_health_router())
        .route("/metrics", get(metrics_endpoint))
        .merge(routes::openapi::openapi_routes())
        .layer(Extension(metrics_handle))
        .layer(cors)
        .layer(tracer::create_trace_layer())
        .layer(middleware::from_fn_with_state(
            request_id_state,
            request_context::assign_request_id,
        ))
        .with_state(state)
}

/// Resolves when the process receives Ctrl+C.
pub async fn create_shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
        return;
    }
    info!("Shutting down...");
}

/// Starts the server with the fully resolved configuration.
///
/// # Errors
/// Returns an error if the store cannot be created or the listener fails.
pub async fn run(config: Config) -> Result<(), ServerError> {
    initialize_tracing(&config);
    info!(profile = ?config.profile, "Starting server...");

    let metrics_handle = metrics_handle();
    let store = create_summary_store(&config).await?;
    let address = format!("{}:{}", config.server.host, config.server.port);

    let state = Arc::new(AppState::new(config, store, Arc::new(SystemClock)));
    let app = create_app_router(state, metrics_handle);

    let listener = TcpListener::bind(&address).await?;
    info!("Listening on {}", address);

    serve(listener, app)
        .with_graceful_shutdown(create_shutdown_signal())
        .await?;

    Ok(())
}
