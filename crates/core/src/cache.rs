//! Research Cache
//!
//! Finished persona research is expensive (up to five search calls and one
//! LLM call), so it is kept per persona for a configurable time-to-live.
//! Keys are persona names compared case-insensitively.

use crate::state::PersonaWorkflowState;
use serde::Serialize;
use std::{
    collections::HashMap,
    time::{Duration, Instant},
};
use tokio::sync::Mutex;
use tracing::info;

/// The research outcome worth reusing for another session.
#[derive(Debug, Clone)]
pub struct CachedResearch {
    pub workflow: PersonaWorkflowState,
    pub persona_context: String,
}

struct CacheEntry {
    research: CachedResearch,
    stored_at: Instant,
}

/// Read-only view of one cache entry.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntryInfo {
    pub person_name: String,
    pub age_seconds: u64,
    pub expires_in_seconds: u64,
    pub snippet_count: usize,
}

pub struct ResearchCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

fn key(person_name: &str) -> String {
    person_name.trim().to_lowercase()
}

impl ResearchCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns a fresh entry, evicting it if it has expired.
    pub async fn get(&self, person_name: &str) -> Option<CachedResearch> {
        let mut entries = self.entries.lock().await;
        let k = key(person_name);
        match entries.get(&k) {
            Some(entry) if entry.stored_at.elapsed() <= self.ttl => {
                info!(persona = %person_name, "Using cached research");
                Some(entry.research.clone())
            }
            Some(_) => {
                entries.remove(&k);
                info!(persona = %person_name, "Cached research expired");
                None
            }
            None => None,
        }
    }

    pub async fn put(&self, person_name: &str, research: CachedResearch) {
        self.entries.lock().await.insert(
            key(person_name),
            CacheEntry {
                research,
                stored_at: Instant::now(),
            },
        );
        info!(persona = %person_name, "Cached research");
    }

    /// Forgets one persona. Returns whether anything was cached.
    pub async fn invalidate(&self, person_name: &str) -> bool {
        self.entries.lock().await.remove(&key(person_name)).is_some()
    }

    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }

    pub async fn info(&self) -> Vec<CacheEntryInfo> {
        let entries = self.entries.lock().await;
        let mut infos: Vec<CacheEntryInfo> = entries
            .values()
            .map(|entry| {
                let age = entry.stored_at.elapsed();
                CacheEntryInfo {
                    person_name: entry.research.workflow.person_name.clone(),
                    age_seconds: age.as_secs(),
                    expires_in_seconds: self.ttl.saturating_sub(age).as_secs(),
                    snippet_count: entry.research.workflow.collected_snippets.len(),
                }
            })
            .collect();
        infos.sort_by(|a, b| a.person_name.cmp(&b.person_name));
        infos
    }
}
