//! Taleweaver Engine - Main entry point.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderValue, Method};
use axum::http::header::HeaderName;
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use taleweaver_engine::api::websocket::WsState;
use taleweaver_engine::api::{self, ConnectionManager};
use taleweaver_engine::app::App;
use taleweaver_engine::infrastructure::{
    clock::{SystemClock, SystemRandom},
    comfyui::ComfyUIClient,
    content::InMemoryContent,
    identity::HeaderIdentity,
    ollama::OllamaClient,
    resilient_llm::{ResilientLlmClient, RetryConfig},
    state_store::SqliteStateStore,
    telemetry::TracingTelemetry,
};
use taleweaver_engine::use_cases::session::SessionConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Local overrides first, then the checked-in defaults.
    for filename in [".env.local", ".env"] {
        let path = std::path::Path::new(filename);
        if path.exists() {
            let _ = dotenvy::from_path(path);
        }
    }

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "taleweaver_engine=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Taleweaver Engine");

    // Load configuration
    let ollama_url = std::env::var("OLLAMA_URL")
        .or_else(|_| std::env::var("OLLAMA_BASE_URL"))
        .unwrap_or_else(|_| "http://localhost:11434".into());
    let ollama_model = std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| "llama3.2".into());
    let comfyui_url = std::env::var("COMFYUI_URL")
        .or_else(|_| std::env::var("COMFYUI_BASE_URL"))
        .unwrap_or_else(|_| "http://localhost:8188".into());
    let server_host = std::env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let server_port: u16 = std::env::var("SERVER_PORT")
        .or_else(|_| std::env::var("PORT"))
        .unwrap_or_else(|_| "3000".into())
        .parse()
        .unwrap_or(3000);
    let state_db = std::env::var("STATE_DB").unwrap_or_else(|_| "adventures.db".into());
    let images_enabled = std::env::var("IMAGES_ENABLED")
        .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
        .unwrap_or(true);
    let image_timeout_secs: u64 = std::env::var("IMAGE_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(45);

    let clock = Arc::new(SystemClock::new());

    // Infrastructure clients
    let ollama_client = Arc::new(OllamaClient::new(&ollama_url, &ollama_model));
    let retry_config = RetryConfig::default();
    tracing::info!(
        "LLM client configured with retry: max_retries={}, base_delay_ms={}",
        retry_config.max_retries,
        retry_config.base_delay_ms
    );
    let llm = Arc::new(ResilientLlmClient::new(ollama_client, retry_config));
    let image_gen = Arc::new(ComfyUIClient::new(&comfyui_url));

    tracing::info!(db = %state_db, "Opening adventure state store");
    let store = Arc::new(SqliteStateStore::new(&state_db, clock.clone()).await?);

    // Lesson content is constructed here and injected; nothing global.
    let content = Arc::new(InMemoryContent::with_defaults());

    let session_config = SessionConfig {
        images_enabled,
        image_timeout: Duration::from_secs(image_timeout_secs),
        ..SessionConfig::default()
    };

    let app = Arc::new(App::new(
        llm,
        image_gen,
        store,
        content,
        Arc::new(TracingTelemetry::new()),
        Arc::new(HeaderIdentity::new()),
        clock,
        Arc::new(SystemRandom::new()),
        session_config,
    ));

    let connections = Arc::new(ConnectionManager::new());

    let ws_state = Arc::new(WsState {
        app,
        connections: connections.clone(),
    });

    // Build router with separate states for HTTP and WebSocket
    let mut router = api::http::routes()
        .with_state(connections)
        .route(
            "/ws",
            get(api::websocket::ws_handler).with_state(ws_state),
        )
        .layer(TraceLayer::new_for_http());

    if let Some(cors) = build_cors_layer_from_env() {
        router = router.layer(cors);
    }

    // Start server
    let addr: SocketAddr = format!("{server_host}:{server_port}").parse()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}

fn build_cors_layer_from_env() -> Option<CorsLayer> {
    let allowed_origins = std::env::var("CORS_ALLOWED_ORIGINS")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())?;

    let mut cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        // Clients send X-User-Id and JSON content types which trigger
        // CORS preflights.
        .allow_headers([
            HeaderName::from_static("x-user-id"),
            axum::http::header::CONTENT_TYPE,
        ]);

    if allowed_origins == "*" {
        cors = cors.allow_origin(Any);
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .filter_map(|s| HeaderValue::from_str(s).ok())
            .collect();

        if origins.is_empty() {
            return None;
        }

        cors = cors.allow_origin(origins);
    }

    Some(cors)
}
