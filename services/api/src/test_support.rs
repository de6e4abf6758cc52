//! Builders shared by the server's unit tests.

use crate::{
    config::{Config, Provider},
    state::AppState,
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{Datelike, Utc};
use std::{
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use tracing::Level;
use voiceboard_core::{
    SessionRegistry, WorkflowCoordinator,
    cache::ResearchCache,
    evaluator::RecencyEvaluator,
    fetcher::{ContentFetcher, MockSearchProvider, SearchHit, SearchProvider},
    generator::{PersonaResponseGenerator, PromptLimits, PromptTemplates},
    llm_client::{EchoLLMClient, LLMClient, PromptMessage},
    workflow::WorkflowSettings,
};

/// Search provider returning 20 current-year hits and counting calls.
pub struct CountingSearch {
    inner: MockSearchProvider,
    pub calls: AtomicUsize,
}

#[async_trait]
impl SearchProvider for CountingSearch {
    async fn search(&self, query: &str, max_results: u32) -> Result<Vec<SearchHit>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.search(query, max_results).await
    }
}

/// Echoing LLM that counts completions.
pub struct CountingLLM {
    pub calls: AtomicUsize,
}

#[async_trait]
impl LLMClient for CountingLLM {
    async fn complete(&self, messages: Vec<PromptMessage>) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        EchoLLMClient.complete(messages).await
    }
}

/// Search provider that never answers in time.
pub struct StalledSearch;

#[async_trait]
impl SearchProvider for StalledSearch {
    async fn search(&self, _query: &str, _max_results: u32) -> Result<Vec<SearchHit>> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(Vec::new())
    }
}

/// Search provider whose every call panics.
pub struct PanickingSearch;

#[async_trait]
impl SearchProvider for PanickingSearch {
    async fn search(&self, _query: &str, _max_results: u32) -> Result<Vec<SearchHit>> {
        panic!("search backend crashed");
    }
}

pub fn test_config() -> Config {
    Config {
        bind_address: "127.0.0.1:0".parse().expect("valid address"),
        provider: Provider::OpenAI,
        openai_api_key: Some("test-openai-key".to_string()),
        gemini_api_key: None,
        tavily_api_key: "test-tavily-key".to_string(),
        chat_model: "gpt-4o".to_string(),
        temperature: 0.7,
        max_tokens: None,
        tavily_max_results: 20,
        tavily_search_depth: "basic".to_string(),
        max_history: 20,
        cache_enabled: true,
        cache_ttl: Duration::from_secs(3600),
        request_timeout: Duration::from_secs(5),
        log_level: Level::INFO,
        prompts_path: PathBuf::from("./prompts"),
    }
}

pub struct TestApp {
    pub state: Arc<AppState>,
    pub search: Arc<CountingSearch>,
    pub llm: Arc<CountingLLM>,
}

fn app_with_provider(provider: Arc<dyn SearchProvider>, llm: Arc<CountingLLM>) -> Arc<AppState> {
    let config = test_config();
    let coordinator = WorkflowCoordinator::new(
        ContentFetcher::new(provider, config.tavily_max_results),
        Arc::new(RecencyEvaluator::default()),
        PersonaResponseGenerator::new(llm, PromptTemplates::default(), PromptLimits::default()),
        Some(Arc::new(ResearchCache::new(config.cache_ttl))),
        WorkflowSettings::default(),
    );
    let registry = Arc::new(SessionRegistry::new(Arc::new(coordinator)));
    Arc::new(AppState::new(registry, Arc::new(config)))
}

/// An app whose persona research is sufficient on the first search.
pub fn test_app() -> TestApp {
    let search = Arc::new(CountingSearch {
        inner: MockSearchProvider {
            hits_per_call: 20,
            year: Utc::now().year(),
        },
        calls: AtomicUsize::new(0),
    });
    let llm = Arc::new(CountingLLM {
        calls: AtomicUsize::new(0),
    });
    let state = app_with_provider(search.clone(), llm.clone());
    TestApp { state, search, llm }
}

/// An app whose searches hang until cancelled.
pub fn stalled_app() -> Arc<AppState> {
    app_with_provider(
        Arc::new(StalledSearch),
        Arc::new(CountingLLM {
            calls: AtomicUsize::new(0),
        }),
    )
}

/// An app whose first search panics mid-initialization.
pub fn panicking_app() -> Arc<AppState> {
    app_with_provider(
        Arc::new(PanickingSearch),
        Arc::new(CountingLLM {
            calls: AtomicUsize::new(0),
        }),
    )
}
