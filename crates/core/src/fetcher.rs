//! Content Fetching Service
//!
//! This module gathers public material about a persona from a web search
//! provider. Provider failures never escape this module: they are logged and
//! turned into an empty batch so the workflow can keep going.

use crate::snippet::Snippet;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};

/// A single ranked hit returned by a search provider.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SearchHit {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub score: f64,
}

/// Defines the contract for any web search backend.
///
/// Keeping the provider behind a trait lets the workflow be driven by
/// deterministic stubs in tests while production talks to Tavily.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Runs one keyword search and returns the provider's hits.
    async fn search(&self, query: &str, max_results: u32) -> Result<Vec<SearchHit>>;
}

/// Which template a query was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Initial,
    Style,
    Recent,
    Latest,
}

impl QueryKind {
    /// Template for a follow-up attempt (1-based).
    pub fn for_attempt(attempt: u32) -> Self {
        match attempt {
            0 => QueryKind::Initial,
            1 => QueryKind::Style,
            2 => QueryKind::Recent,
            _ => QueryKind::Latest,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            QueryKind::Initial => "initial",
            QueryKind::Style => "style",
            QueryKind::Recent => "recent",
            QueryKind::Latest => "latest",
        }
    }
}

/// A search request for a persona.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub person_name: String,
    pub kind: QueryKind,
    /// Year to bias the search towards, when the template uses one.
    pub recency_hint: Option<i32>,
}

impl SearchQuery {
    pub fn new(person_name: impl Into<String>, kind: QueryKind, recency_hint: Option<i32>) -> Self {
        Self {
            person_name: person_name.into(),
            kind,
            recency_hint,
        }
    }

    /// Renders the keyword string sent to the provider.
    pub fn text(&self) -> String {
        let name = &self.person_name;
        match (self.kind, self.recency_hint) {
            (QueryKind::Initial, _) => format!(
                "{name} quotes that were said by themself and reflect their personality and way of thinking"
            ),
            (QueryKind::Style, _) => format!("{name} talking style personality communication"),
            (QueryKind::Recent, Some(year)) => format!("{name} interview {year}"),
            (QueryKind::Recent, None) => format!("{name} interview"),
            (QueryKind::Latest, Some(year)) => {
                format!("{name} latest statements news {} {year}", year - 1)
            }
            (QueryKind::Latest, None) => format!("{name} latest statements news"),
        }
    }
}

/// Turns provider hits into snippets, swallowing provider failures.
#[derive(Clone)]
pub struct ContentFetcher {
    provider: Arc<dyn SearchProvider>,
    max_results: u32,
}

impl ContentFetcher {
    pub fn new(provider: Arc<dyn SearchProvider>, max_results: u32) -> Self {
        Self {
            provider,
            max_results,
        }
    }

    /// Issues exactly one provider call and returns the ranked snippets.
    pub async fn fetch(&self, query: &SearchQuery) -> Vec<Snippet> {
        let text = query.text();
        let hits = match self.provider.search(&text, self.max_results).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!(persona = %query.person_name, query = %text, error = ?e, "Search provider failed; continuing with an empty batch");
                return Vec::new();
            }
        };

        let snippets = rank_hits(hits)
            .into_iter()
            .map(|hit| {
                let mut tags = vec![query.kind.tag().to_string()];
                if !hit.url.is_empty() {
                    tags.push(format!("source:{}", hit.url));
                }
                Snippet::new(hit.content, tags)
            })
            .collect::<Vec<_>>();

        info!(persona = %query.person_name, kind = query.kind.tag(), count = snippets.len(), "Fetched snippets");
        snippets
    }
}

/// Keeps hits with a URL and some content, best score first.
fn rank_hits(hits: Vec<SearchHit>) -> Vec<SearchHit> {
    let mut ranked: Vec<SearchHit> = hits
        .into_iter()
        .filter(|h| !h.url.trim().is_empty() && !h.content.trim().is_empty())
        .collect();
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
    ranked
}

#[derive(Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

/// `SearchProvider` backed by the Tavily search API.
pub struct TavilySearchProvider {
    client: reqwest::Client,
    api_key: String,
    search_depth: String,
    endpoint: String,
}

impl TavilySearchProvider {
    /// Creates a provider whose requests are bounded by `timeout`.
    pub fn new(api_key: String, search_depth: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client for Tavily")?;
        Ok(Self {
            client,
            api_key,
            search_depth,
            endpoint: "https://api.tavily.com/search".to_string(),
        })
    }

    /// Points the provider at a different search URL.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl SearchProvider for TavilySearchProvider {
    async fn search(&self, query: &str, max_results: u32) -> Result<Vec<SearchHit>> {
        let body = serde_json::json!({
            "api_key": self.api_key,
            "query": query,
            "max_results": max_results,
            "search_depth": self.search_depth,
            "topic": "general",
            "include_answer": false,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .context("Tavily request failed")?
            .error_for_status()
            .context("Tavily returned an error status")?;

        let parsed: TavilyResponse = response
            .json()
            .await
            .context("Failed to parse Tavily response")?;
        Ok(parsed.results)
    }
}

/// A `SearchProvider` for development that returns canned, current-year hits.
pub struct MockSearchProvider {
    pub hits_per_call: usize,
    pub year: i32,
}

#[async_trait]
impl SearchProvider for MockSearchProvider {
    async fn search(&self, query: &str, _max_results: u32) -> Result<Vec<SearchHit>> {
        Ok((0..self.hits_per_call)
            .map(|i| SearchHit {
                title: format!("Result {i}"),
                url: format!("https://example.com/{i}"),
                content: format!("In {}, about \"{query}\": statement number {i}.", self.year),
                score: 1.0 - i as f64 / 100.0,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_partial_json, method, path},
    };

    struct FailingProvider;

    #[async_trait]
    impl SearchProvider for FailingProvider {
        async fn search(&self, _query: &str, _max_results: u32) -> Result<Vec<SearchHit>> {
            Err(anyhow!("connection refused"))
        }
    }

    struct FixedProvider(Vec<SearchHit>);

    #[async_trait]
    impl SearchProvider for FixedProvider {
        async fn search(&self, _query: &str, _max_results: u32) -> Result<Vec<SearchHit>> {
            Ok(self.0.clone())
        }
    }

    fn hit(url: &str, content: &str, score: f64) -> SearchHit {
        SearchHit {
            title: String::new(),
            url: url.to_string(),
            content: content.to_string(),
            score,
        }
    }

    #[test]
    fn test_query_templates_are_distinct_per_attempt() {
        let texts: Vec<String> = (0..4)
            .map(|a| SearchQuery::new("Ada", QueryKind::for_attempt(a), Some(2026)).text())
            .collect();
        for (i, a) in texts.iter().enumerate() {
            assert!(a.contains("Ada"));
            for b in texts.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
        assert!(texts[2].contains("2026"));
        assert!(texts[3].contains("2025 2026"));
        assert_eq!(QueryKind::for_attempt(7), QueryKind::Latest);
    }

    #[tokio::test]
    async fn test_provider_failure_yields_empty_batch() {
        let fetcher = ContentFetcher::new(Arc::new(FailingProvider), 5);
        let query = SearchQuery::new("Ada", QueryKind::Initial, None);
        assert!(fetcher.fetch(&query).await.is_empty());
    }

    #[tokio::test]
    async fn test_hits_are_filtered_ranked_and_tagged() {
        let provider = FixedProvider(vec![
            hit("https://a", "low", 0.2),
            hit("", "no url", 0.9),
            hit("https://b", "high", 0.8),
            hit("https://c", "   ", 0.95),
        ]);
        let fetcher = ContentFetcher::new(Arc::new(provider), 5);
        let snippets = fetcher
            .fetch(&SearchQuery::new("Ada", QueryKind::Style, None))
            .await;

        let texts: Vec<&str> = snippets.iter().map(|s| s.source_text.as_str()).collect();
        assert_eq!(texts, vec!["high", "low"]);
        assert!(snippets[0].tags.contains("style"));
        assert!(snippets[0].tags.contains("source:https://b"));
    }

    #[test]
    fn test_tavily_response_tolerates_missing_fields() {
        let json = r#"{"results":[{"url":"https://x","content":"c"}],"response_time":0.4}"#;
        let parsed: TavilyResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.results.len(), 1);
        assert_eq!(parsed.results[0].score, 0.0);
    }

    fn tavily(server: &MockServer) -> TavilySearchProvider {
        TavilySearchProvider::new(
            "tvly-test".to_string(),
            "basic".to_string(),
            Duration::from_secs(5),
        )
        .unwrap()
        .with_endpoint(format!("{}/search", server.uri()))
    }

    #[tokio::test]
    async fn test_tavily_posts_query_and_parses_results() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .and(body_partial_json(json!({
                "api_key": "tvly-test",
                "query": "Ada interview",
                "max_results": 7,
                "search_depth": "basic",
                "include_answer": false,
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "query": "Ada interview",
                "results": [
                    {"title": "T", "url": "https://a", "content": "said things", "score": 0.7}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let hits = tavily(&server).search("Ada interview", 7).await.unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "T");
        assert_eq!(hits[0].url, "https://a");
        assert_eq!(hits[0].content, "said things");
        assert_eq!(hits[0].score, 0.7);
    }

    #[tokio::test]
    async fn test_tavily_error_status_is_an_error_and_fetch_degrades() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
            .mount(&server)
            .await;

        let provider = tavily(&server);
        assert!(provider.search("Ada", 5).await.is_err());

        let fetcher = ContentFetcher::new(Arc::new(provider), 5);
        let query = SearchQuery::new("Ada", QueryKind::Initial, None);
        assert!(fetcher.fetch(&query).await.is_empty());
    }
}
