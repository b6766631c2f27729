use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::Request,
    middleware::Next,
    response::Response,
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::GlobalKeyExtractor, GovernorLayer,
};
use tracing::{info, warn};

use dialogue_core::{GenerationEngine, ToneModel, VoiceRegistry};
use server::{build_router, config::ServerConfig, routes, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let _ = dotenv::dotenv();

    async_main().await
}

async fn async_main() -> anyhow::Result<()> {
    info!("Starting dialogue generation server...");

    let config = ServerConfig::from_env();
    info!(
        "Server configuration loaded: port={}, sample_rate={}, generation_timeout={}s, rate_limit={}/min",
        config.port,
        config.sample_rate,
        config.generation_timeout().as_secs(),
        config.rate_limit_per_minute
    );

    info!("Scanning voices directory: {}", config.voices_dir);
    let voices = Arc::new(VoiceRegistry::scan_dir(&config.voices_dir, config.sample_rate));

    let engine = Arc::new(GenerationEngine::new(config.sample_rate));
    match config.model_backend.as_str() {
        "tone" => {
            info!(
                "Installing tone backend (model_path={}, device={}, steps={})",
                config.model_path, config.device, config.inference_steps
            );
            engine.install(Arc::new(ToneModel::new(&config.model_config())));
        }
        other => {
            warn!("Unknown MODEL_BACKEND '{other}'; serving in not-ready state");
        }
    }

    if config.api_key.is_none() {
        warn!("API_KEY not set, generation endpoints are unauthenticated (development mode)");
    }

    let _ = routes::START_TIME.get_or_init(std::time::Instant::now);

    let state = AppState::new(engine, voices, config.clone());

    // CORS configuration - environment-aware
    let cors = if let Some(ref allowed_origins) = config.cors_allowed_origins {
        let origins: Vec<axum::http::HeaderValue> = allowed_origins
            .iter()
            .filter_map(|origin: &String| origin.parse::<axum::http::HeaderValue>().ok())
            .collect();

        if origins.is_empty() {
            warn!("CORS_ALLOWED_ORIGINS is empty, falling back to permissive CORS");
            permissive_cors()
        } else {
            info!("CORS configured for {} origin(s)", origins.len());
            CorsLayer::new()
                .allow_origin(tower_http::cors::AllowOrigin::list(origins))
                .allow_methods([
                    axum::http::Method::GET,
                    axum::http::Method::POST,
                    axum::http::Method::OPTIONS,
                ])
                .allow_headers(tower_http::cors::Any)
                .allow_credentials(false)
        }
    } else {
        warn!("CORS_ALLOWED_ORIGINS not set, allowing all origins (development mode)");
        permissive_cors()
    };

    // Global rate limit; per-IP extraction is unreliable behind proxies.
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second((config.rate_limit_per_minute / 60).max(1) as u64)
            .burst_size(config.rate_limit_per_minute)
            .key_extractor(GlobalKeyExtractor)
            .finish()
            .unwrap(),
    );

    // Request ID middleware for tracing
    async fn add_request_id(mut request: Request, next: Next) -> Response {
        let request_id = uuid::Uuid::new_v4().to_string();
        request.headers_mut().insert(
            "x-request-id",
            axum::http::HeaderValue::from_str(&request_id).unwrap(),
        );
        let mut response = next.run(request).await;
        response.headers_mut().insert(
            "x-request-id",
            axum::http::HeaderValue::from_str(&request_id).unwrap(),
        );
        response
    }

    let middleware_stack = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(GovernorLayer::new(governor_conf))
        .layer(TimeoutLayer::new(config.request_timeout()))
        .layer(cors)
        .into_inner();

    let app = build_router(state)
        .layer(axum::middleware::from_fn(add_request_id))
        .layer(middleware_stack);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind {addr}: {e}. Try a different SERVER_PORT."))?;

    info!("Server listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

fn permissive_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers(tower_http::cors::Any)
        .allow_credentials(false)
}
