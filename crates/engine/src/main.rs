//! WorldArchitect Engine - Main entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::http::header::HeaderName;
use axum::http::{HeaderValue, Method};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use worldarchitect_engine::api;
use worldarchitect_engine::app::{App, NarratorSettings};
use worldarchitect_engine::infrastructure::{
    clock::SystemClock,
    config::AppConfig,
    gemini::GeminiClient,
    mock_llm::ScriptedNarrator,
    ports::{ClockPort, LlmPort},
    sqlite_store::SqliteCampaignRepo,
};
use worldarchitect_engine::use_cases::narrative::HistoryBudget;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment from repo root (the engine may be started from `crates/engine`).
    load_dotenv_from_repo_root();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "worldarchitect_engine=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting WorldArchitect Engine");

    let config = AppConfig::from_env()?;
    if config.firebase_config.is_some() {
        tracing::debug!("FIREBASE_CONFIG is set but authentication is handled upstream");
    }

    let clock: Arc<dyn ClockPort> = Arc::new(SystemClock::new());

    tracing::info!(path = %config.database_path, "Opening campaign store");
    let repo = Arc::new(SqliteCampaignRepo::new(&config.database_path, clock.clone()).await?);

    let llm: Arc<dyn LlmPort> = match (&config.gemini_api_key, config.testing) {
        (Some(api_key), false) => {
            tracing::info!(
                base_url = %config.gemini_base_url,
                models = ?config.model_fallbacks,
                timeout_secs = config.model_timeout.as_secs(),
                "Narrator configured"
            );
            Arc::new(
                GeminiClient::new(&config.gemini_base_url, api_key, config.model_timeout)
                    .context("building the Gemini HTTP client")?,
            )
        }
        _ => {
            tracing::warn!("TESTING mode: using the scripted narrator, no model calls are made");
            Arc::new(ScriptedNarrator::new())
        }
    };

    let default_lore = match &config.world_lore_path {
        Some(path) => {
            let lore = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading world lore from {}", path.display()))?;
            tracing::info!(path = %path.display(), bytes = lore.len(), "Loaded world lore");
            Some(lore)
        }
        None => None,
    };

    let app = Arc::new(App::new(
        repo,
        llm,
        clock,
        NarratorSettings {
            models: config.model_fallbacks.clone(),
            budget: HistoryBudget {
                max_tokens: config.history_token_budget,
                keep_recent: config.keep_recent_turns,
            },
            default_lore,
        },
    ));

    let mut router = api::routes()
        .with_state(app)
        .layer(TraceLayer::new_for_http());

    if let Some(cors) = build_cors_layer(config.cors_allowed_origins.as_deref()) {
        router = router.layer(cors);
    }

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server_host, config.server_port).parse()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}

fn load_dotenv_from_repo_root() {
    let repo_root = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..");

    // Prefer local overrides.
    for filename in [".env.local", ".env"] {
        let path = repo_root.join(filename);
        if path.exists() {
            let _ = dotenvy::from_path(path);
        }
    }
}

fn build_cors_layer(allowed_origins: Option<&str>) -> Option<CorsLayer> {
    let allowed_origins = allowed_origins.map(str::trim).filter(|s| !s.is_empty())?;

    let mut cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::OPTIONS,
        ])
        // Clients send X-User-Id and JSON content types which trigger CORS preflights.
        .allow_headers([
            HeaderName::from_static(api::http::USER_ID_HEADER),
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
