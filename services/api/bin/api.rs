//! Main Entrypoint for the Voiceboard API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Building the search provider, LLM client and persona workflow.
//! 3. Constructing the Axum router and applying middleware.
//! 4. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use async_openai::config::OpenAIConfig;
use std::{collections::HashMap, fs, net::SocketAddr, path::Path, sync::Arc};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use voiceboard_api::{config::Config, router::create_router, state::AppState};
use voiceboard_core::{
    SessionRegistry, WorkflowCoordinator,
    cache::ResearchCache,
    evaluator::RecencyEvaluator,
    fetcher::{ContentFetcher, TavilySearchProvider},
    generator::{PersonaResponseGenerator, PromptLimits, PromptTemplates},
    llm_client::{CompletionOptions, OpenAICompatibleClient},
    workflow::WorkflowSettings,
};

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal. Shutting down gracefully..."),
        Err(e) => error!(error = %e, "Failed to listen for Ctrl+C; shutting down"),
    }
}

/// A helper function to load prompt overrides from a directory.
fn load_prompts(prompts_path: &Path) -> anyhow::Result<HashMap<String, String>> {
    let mut prompts = HashMap::new();
    for entry in fs::read_dir(prompts_path)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("md") {
            let prompt_key = path
                .file_stem()
                .and_then(|s| s.to_str())
                .context("Could not get file stem")?
                .to_string();
            let content = fs::read_to_string(&path)?;
            prompts.insert(prompt_key, content);
        }
    }
    Ok(prompts)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 3. Initialize Shared Services ---
    let templates = match load_prompts(&config.prompts_path) {
        Ok(prompts) => {
            info!(count = prompts.len(), path = %config.prompts_path.display(), "Loaded prompt overrides");
            PromptTemplates::default().with_overrides(&prompts)
        }
        Err(e) => {
            warn!(error = %e, path = %config.prompts_path.display(), "Using built-in prompts");
            PromptTemplates::default()
        }
    };

    let api_key = config
        .llm_api_key()
        .context("No API key configured for the selected provider")?;
    info!(provider = ?config.provider, "Using LLM provider.");
    let openai_config = OpenAIConfig::new()
        .with_api_key(api_key)
        .with_api_base(config.provider.api_base());
    let llm_client = Arc::new(OpenAICompatibleClient::new(
        openai_config,
        config.chat_model.clone(),
        CompletionOptions {
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout: config.request_timeout,
        },
    ));

    let search = Arc::new(
        TavilySearchProvider::new(
            config.tavily_api_key.clone(),
            config.tavily_search_depth.clone(),
            config.request_timeout,
        )
        .context("Failed to build search client")?,
    );

    let cache = config
        .cache_enabled
        .then(|| Arc::new(ResearchCache::new(config.cache_ttl)));

    let coordinator = WorkflowCoordinator::new(
        ContentFetcher::new(search, config.tavily_max_results),
        Arc::new(RecencyEvaluator::default()),
        PersonaResponseGenerator::new(llm_client, templates, PromptLimits::default()),
        cache,
        WorkflowSettings {
            max_history: config.max_history,
            ..WorkflowSettings::default()
        },
    );
    let registry = Arc::new(SessionRegistry::new(Arc::new(coordinator)));
    let app_state = Arc::new(AppState::new(registry, Arc::new(config.clone())));

    // --- 4. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // --- 5. Start Server ---
    info!(
        provider = ?config.provider,
        model = %config.chat_model,
        cache = config.cache_enabled,
        bind_address = %config.bind_address,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_address))?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server has shut down.");
    Ok(())
}
