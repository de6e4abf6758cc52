//! Persona Workflow and Conversation State
//!
//! The workflow state is advanced only through the `with_*` transition
//! functions below. Each one consumes the previous snapshot and returns the
//! complete next state, so a step that is abandoned half-way (for example
//! because its request was cancelled) never leaves a partially merged state.

use crate::snippet::Snippet;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// State carried through the search → evaluate → generate workflow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PersonaWorkflowState {
    pub person_name: String,
    pub collected_snippets: Vec<Snippet>,
    pub sufficiency_flag: bool,
    pub attempt_count: u32,
    pub last_query: String,
    pub last_response: String,
}

impl PersonaWorkflowState {
    pub fn new(person_name: impl Into<String>) -> Self {
        Self {
            person_name: person_name.into(),
            collected_snippets: Vec::new(),
            sufficiency_flag: false,
            attempt_count: 0,
            last_query: String::new(),
            last_response: String::new(),
        }
    }

    /// Records a search: the query becomes `last_query` and the batch is appended.
    pub fn with_search(mut self, query: impl Into<String>, batch: Vec<Snippet>) -> Self {
        self.last_query = query.into();
        self.collected_snippets.extend(batch);
        self
    }

    pub fn with_sufficiency(mut self, sufficient: bool) -> Self {
        self.sufficiency_flag = sufficient;
        self
    }

    /// Starts a follow-up search attempt.
    pub fn with_attempt(mut self) -> Self {
        self.attempt_count += 1;
        self
    }

    pub fn with_response(mut self, response: impl Into<String>) -> Self {
        self.last_response = response.into();
        self
    }
}

/// Who authored a conversation turn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Persona,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Persona => write!(f, "persona"),
        }
    }
}

/// A single entry of the conversation history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    pub role: Role,
    pub text: String,
    pub at: DateTime<Utc>,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            at: Utc::now(),
        }
    }

    pub fn persona(text: impl Into<String>) -> Self {
        Self {
            role: Role::Persona,
            text: text.into(),
            at: Utc::now(),
        }
    }
}

/// Workflow state plus the chat history of one session.
///
/// History always alternates user / persona, starting with the user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationState {
    pub workflow: PersonaWorkflowState,
    pub history: Vec<Turn>,
    pub current_query: String,
    /// Speaking style synthesized by the initialization run.
    pub persona_context: String,
    pub initialized: bool,
}

impl ConversationState {
    pub fn new(person_name: impl Into<String>) -> Self {
        Self {
            workflow: PersonaWorkflowState::new(person_name),
            history: Vec::new(),
            current_query: String::new(),
            persona_context: String::new(),
            initialized: false,
        }
    }

    pub fn person_name(&self) -> &str {
        &self.workflow.person_name
    }

    /// Marks the end of an initialization run.
    pub fn with_initialized(mut self, workflow: PersonaWorkflowState, persona_context: String) -> Self {
        self.workflow = workflow;
        self.persona_context = persona_context;
        self.initialized = true;
        self
    }

    /// Appends one completed exchange, then trims the oldest exchanges so at
    /// most `max_history` entries remain. A `max_history` of zero disables
    /// trimming.
    pub fn with_exchange(mut self, query: &str, reply: &str, max_history: usize) -> Self {
        self.current_query = query.to_string();
        self.history.push(Turn::user(query));
        self.history.push(Turn::persona(reply));
        self.workflow.last_response = reply.to_string();

        if max_history > 0 {
            // Keep an even count so the first remaining entry is a user turn.
            let keep = max_history.max(2) & !1;
            if self.history.len() > keep {
                let excess = self.history.len() - keep;
                self.history.drain(..excess);
            }
        }
        self
    }

    /// Drops the conversation but keeps everything the research produced.
    pub fn cleared(mut self) -> Self {
        self.history.clear();
        self.current_query.clear();
        self
    }

    /// Number of completed user/persona exchanges.
    pub fn message_count(&self) -> usize {
        self.history.len() / 2
    }

    /// Rough token estimate: serialized history length divided by four.
    pub fn estimated_tokens(&self) -> usize {
        serde_json::to_string(&self.history)
            .map(|json| json.len() / 4)
            .unwrap_or(0)
    }
}
