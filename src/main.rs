use jemallocator::Jemalloc;

#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use axum::{
    Router,
    routing::{get, post, delete},
    middleware::from_fn_with_state,
};

use http::{Method, header};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_governor::governor::GovernorConfigBuilder;
use tower_http::{
    trace::{TraceLayer, DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, DefaultOnFailure},
    cors::{Any, CorsLayer},
};

use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use courier::config::Config;
use courier::state::AppState;
use courier::{handlers, middleware_layer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    tracing::info!("✅ Configuration loaded successfully");

    let state = AppState::new(&config).await?;
    tracing::info!("✅ AppState initialized");

    // Probe the gateway once at startup so a bad GATEWAY_URL is visible
    // immediately instead of on the first user request.
    if state.gateway.health_check().await {
        tracing::info!("✅ Action gateway online at {}", config.gateway_url);
    } else {
        tracing::warn!(
            "⚠️ Action gateway offline at {} - requests will be retried per call",
            config.gateway_url
        );
    }

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::ACCEPT,
            "x-api-key".parse().unwrap(),
        ]);

    let protected_governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10_000)
            .burst_size(50_000)
            .use_headers()
            .finish()
            .unwrap(),
    );

    let public_routes = Router::new()
        .route("/api/health", get(handlers::health::health))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/api/execute", post(handlers::execute::execute))
        .route("/api/session/{user_id}", get(handlers::sessions::get_session))
        .route("/api/session/{user_id}", delete(handlers::sessions::clear_session))
        .route(
            "/api/session/{user_id}/history",
            get(handlers::sessions::get_history),
        )
        .route(
            "/api/session/{user_id}/user-context",
            post(handlers::sessions::update_user_context),
        )
        .route(
            "/api/rate-limit/{user_id}",
            get(handlers::sessions::rate_limit_status),
        )
        .layer(tower_governor::GovernorLayer::new(
            protected_governor_conf.clone(),
        ))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::auth::require_api_key,
        ))
        .with_state(state.clone());

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(true))
                .on_request(DefaultOnRequest::default().level(Level::DEBUG))
                .on_response(DefaultOnResponse::default().level(Level::DEBUG))
                .on_failure(DefaultOnFailure::default().level(Level::ERROR)),
        )
        .layer(cors);

    // Periodic probe so a degraded downstream shows up in the logs even when
    // no requests are flowing.
    let probe_state = state.clone();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(300)).await;
            if !probe_state.gateway.health_check().await {
                tracing::warn!("⚠️ Action gateway health probe failed");
            }
        }
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("🚀 Server listening on http://{}", addr);
    tracing::info!("✅ All systems operational");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
