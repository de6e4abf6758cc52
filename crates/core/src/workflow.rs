//! Persona Workflow Coordinator
//!
//! Drives the research state machine for a persona:
//!
//! ```text
//! SearchInitial -> Evaluate -> SearchMore -> Evaluate -> ... -> Generate
//! ```
//!
//! `Evaluate` moves to `Generate` as soon as the material is sufficient,
//! otherwise to `SearchMore` while follow-up attempts remain, and forces
//! `Generate` once they are exhausted. Chat turns after initialization skip
//! the research entirely and go straight to generation.

use crate::{
    cache::{CachedResearch, ResearchCache},
    evaluator::SufficiencyEvaluator,
    fetcher::{ContentFetcher, QueryKind, SearchQuery},
    generator::PersonaResponseGenerator,
    state::{ConversationState, PersonaWorkflowState},
};
use chrono::{Datelike, Utc};
use std::sync::Arc;
use tracing::info;

/// Follow-up searches allowed after the initial one.
pub const MAX_SEARCH_ATTEMPTS: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowStep {
    SearchInitial,
    Evaluate,
    SearchMore,
    Generate,
}

impl WorkflowStep {
    /// The transition taken out of `Evaluate`.
    pub fn after_evaluate(state: &PersonaWorkflowState, max_attempts: u32) -> Self {
        if state.sufficiency_flag {
            WorkflowStep::Generate
        } else if state.attempt_count < max_attempts {
            WorkflowStep::SearchMore
        } else {
            WorkflowStep::Generate
        }
    }
}

/// Tunables for the coordinator.
#[derive(Debug, Clone, Copy)]
pub struct WorkflowSettings {
    pub max_attempts: u32,
    /// Maximum history entries kept per conversation; zero keeps everything.
    pub max_history: usize,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            max_attempts: MAX_SEARCH_ATTEMPTS,
            max_history: 20,
        }
    }
}

pub struct WorkflowCoordinator {
    fetcher: ContentFetcher,
    evaluator: Arc<dyn SufficiencyEvaluator>,
    generator: PersonaResponseGenerator,
    cache: Option<Arc<ResearchCache>>,
    settings: WorkflowSettings,
}

impl WorkflowCoordinator {
    pub fn new(
        fetcher: ContentFetcher,
        evaluator: Arc<dyn SufficiencyEvaluator>,
        generator: PersonaResponseGenerator,
        cache: Option<Arc<ResearchCache>>,
        settings: WorkflowSettings,
    ) -> Self {
        Self {
            fetcher,
            evaluator,
            generator,
            cache,
            settings,
        }
    }

    pub fn cache(&self) -> Option<&Arc<ResearchCache>> {
        self.cache.as_ref()
    }

    /// Runs the search/evaluate loop and the terminal generate step.
    ///
    /// Returns the final workflow state and the synthesized persona style.
    pub async fn research(&self, state: PersonaWorkflowState) -> (PersonaWorkflowState, String) {
        let current_year = Utc::now().year();
        let mut state = state;
        let mut step = WorkflowStep::SearchInitial;

        loop {
            info!(persona = %state.person_name, ?step, attempt = state.attempt_count, snippets = state.collected_snippets.len(), "Workflow step");
            step = match step {
                WorkflowStep::SearchInitial => {
                    let query = SearchQuery::new(&state.person_name, QueryKind::Initial, None);
                    let batch = self.fetcher.fetch(&query).await;
                    state = state.with_search(query.text(), batch);
                    WorkflowStep::Evaluate
                }
                WorkflowStep::Evaluate => {
                    let sufficient = self.evaluator.is_sufficient(&state.collected_snippets);
                    state = state.with_sufficiency(sufficient);
                    WorkflowStep::after_evaluate(&state, self.settings.max_attempts)
                }
                WorkflowStep::SearchMore => {
                    let next = state.with_attempt();
                    let query = SearchQuery::new(
                        &next.person_name,
                        QueryKind::for_attempt(next.attempt_count),
                        Some(current_year),
                    );
                    let batch = self.fetcher.fetch(&query).await;
                    state = next.with_search(query.text(), batch);
                    WorkflowStep::Evaluate
                }
                WorkflowStep::Generate => {
                    let style = self.generator.synthesize_style(&state).await;
                    let state = state.with_response(style.clone());
                    info!(persona = %state.person_name, sufficient = state.sufficiency_flag, attempts = state.attempt_count, "Workflow finished");
                    return (state, style);
                }
            };
        }
    }

    /// Initializes a conversation, reusing cached research when available.
    pub async fn initialize(&self, conversation: ConversationState) -> ConversationState {
        let person_name = conversation.person_name().to_string();

        if let Some(cache) = &self.cache {
            if let Some(cached) = cache.get(&person_name).await {
                // The cache key ignores case, so keep the spelling this session asked for.
                let workflow = PersonaWorkflowState {
                    person_name: person_name.clone(),
                    ..cached.workflow
                };
                return conversation.with_initialized(workflow, cached.persona_context);
            }
        }

        let (workflow, style) = self
            .research(PersonaWorkflowState::new(person_name.as_str()))
            .await;

        if let Some(cache) = &self.cache {
            cache
                .put(
                    &person_name,
                    CachedResearch {
                        workflow: workflow.clone(),
                        persona_context: style.clone(),
                    },
                )
                .await;
        }

        conversation.with_initialized(workflow, style)
    }

    /// Answers one user message, initializing first if this conversation never was.
    pub async fn chat(&self, conversation: ConversationState, query: &str) -> (ConversationState, String) {
        let conversation = if conversation.initialized {
            conversation
        } else {
            info!(persona = %conversation.person_name(), "Initializing before first chat turn");
            self.initialize(conversation).await
        };
        self.generator
            .reply(conversation, query, self.settings.max_history)
            .await
    }
}
