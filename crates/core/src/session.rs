//! Session Registry
//!
//! An explicitly owned map from session id to a live persona conversation.
//! Each session sits behind its own async mutex: operations on different ids
//! run independently, while operations on the same id are serialized, which
//! also makes later calls wait for a running initialization to finish.

use crate::{
    state::ConversationState,
    workflow::WorkflowCoordinator,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::Mutex;
use tracing::info;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("{0} is required")]
    Validation(&'static str),
    #[error("Session '{0}' not found")]
    NotFound(String),
    #[error("Session '{0}' already exists")]
    AlreadyExists(String),
}

#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub persona: ConversationState,
    pub created_at: DateTime<Utc>,
}

pub type SessionHandle = Arc<Mutex<Session>>;

/// Point-in-time view of a session, safe to hand to callers.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: String,
    pub person_name: String,
    pub created_at: DateTime<Utc>,
    pub initialized: bool,
    pub sufficient: bool,
    pub snippet_count: usize,
    pub attempt_count: u32,
    pub message_count: usize,
    pub estimated_tokens: usize,
    pub last_query: String,
}

impl From<&Session> for SessionSnapshot {
    fn from(session: &Session) -> Self {
        let persona = &session.persona;
        Self {
            session_id: session.id.clone(),
            person_name: persona.person_name().to_string(),
            created_at: session.created_at,
            initialized: persona.initialized,
            sufficient: persona.workflow.sufficiency_flag,
            snippet_count: persona.workflow.collected_snippets.len(),
            attempt_count: persona.workflow.attempt_count,
            message_count: persona.message_count(),
            estimated_tokens: persona.estimated_tokens(),
            last_query: persona.workflow.last_query.clone(),
        }
    }
}

/// Result of one chat turn.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatOutcome {
    pub reply: String,
    pub person_name: String,
    pub timestamp: DateTime<Utc>,
    pub message_count: usize,
    pub estimated_tokens: usize,
    /// Whether this turn had to create the session first.
    pub created: bool,
}

fn require<'a>(value: &'a str, field: &'static str) -> Result<&'a str, RegistryError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(RegistryError::Validation(field))
    } else {
        Ok(trimmed)
    }
}

/// Session ids are stored trimmed; every lookup goes through the same form.
fn key(session_id: &str) -> &str {
    session_id.trim()
}

pub struct SessionRegistry {
    coordinator: Arc<WorkflowCoordinator>,
    sessions: Mutex<HashMap<String, SessionHandle>>,
}

impl SessionRegistry {
    pub fn new(coordinator: Arc<WorkflowCoordinator>) -> Self {
        Self {
            coordinator,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn coordinator(&self) -> &Arc<WorkflowCoordinator> {
        &self.coordinator
    }

    /// Creates a session and runs the persona initialization before returning.
    ///
    /// Fails without touching the existing session if the id is taken.
    pub async fn create(&self, session_id: &str, person_name: &str) -> Result<SessionSnapshot, RegistryError> {
        let session_id = require(session_id, "sessionId")?;
        let person_name = require(person_name, "personName")?;

        let handle: SessionHandle = Arc::new(Mutex::new(Session {
            id: session_id.to_string(),
            persona: ConversationState::new(person_name),
            created_at: Utc::now(),
        }));

        // Lock the new session before publishing it so nothing else can touch
        // it until initialization is done.
        let mut session = {
            let mut sessions = self.sessions.lock().await;
            if sessions.contains_key(session_id) {
                return Err(RegistryError::AlreadyExists(session_id.to_string()));
            }
            let guard = handle.clone().lock_owned().await;
            sessions.insert(session_id.to_string(), handle);
            guard
        };

        info!(%session_id, persona = %person_name, "Session created; initializing persona");
        let fresh = session.persona.clone();
        session.persona = self.coordinator.initialize(fresh).await;
        Ok(SessionSnapshot::from(&*session))
    }

    pub async fn get(&self, session_id: &str) -> Result<SessionHandle, RegistryError> {
        let session_id = key(session_id);
        self.sessions
            .lock()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(session_id.to_string()))
    }

    pub async fn contains(&self, session_id: &str) -> bool {
        self.sessions.lock().await.contains_key(key(session_id))
    }

    /// Deletes a session. Removing an unknown id is not an error.
    pub async fn remove(&self, session_id: &str) -> bool {
        let session_id = key(session_id);
        let removed = self.sessions.lock().await.remove(session_id).is_some();
        if removed {
            info!(%session_id, "Session removed");
        }
        removed
    }

    /// Resets the conversation history, keeping the collected research.
    pub async fn clear(&self, session_id: &str) -> Result<(), RegistryError> {
        let session_id = key(session_id);
        let handle = self.get(session_id).await?;
        let mut session = handle.lock().await;
        session.persona = session.persona.clone().cleared();
        info!(%session_id, "Conversation cleared");
        Ok(())
    }

    pub async fn snapshot(&self, session_id: &str) -> Result<SessionSnapshot, RegistryError> {
        let handle = self.get(session_id).await?;
        let session = handle.lock().await;
        Ok(SessionSnapshot::from(&*session))
    }

    /// Sends one user message to a session.
    ///
    /// An unknown session is created first when `person_name` is given.
    pub async fn chat(
        &self,
        session_id: &str,
        message: &str,
        person_name: Option<&str>,
    ) -> Result<ChatOutcome, RegistryError> {
        let session_id = require(session_id, "sessionId")?;
        let message = require(message, "message")?;

        let mut created = false;
        let handle = match (self.get(session_id).await, person_name) {
            (Ok(handle), _) => handle,
            (Err(RegistryError::NotFound(_)), Some(name)) => {
                self.create(session_id, name).await?;
                created = true;
                self.get(session_id).await?
            }
            (Err(e), _) => return Err(e),
        };

        let mut session = handle.lock().await;
        let (persona, reply) = self
            .coordinator
            .chat(session.persona.clone(), message)
            .await;
        session.persona = persona;

        Ok(ChatOutcome {
            reply,
            person_name: session.persona.person_name().to_string(),
            timestamp: Utc::now(),
            message_count: session.persona.message_count(),
            estimated_tokens: session.persona.estimated_tokens(),
            created,
        })
    }

    /// Forgets cached research for the persona and runs initialization again.
    pub async fn reinitialize(&self, session_id: &str) -> Result<SessionSnapshot, RegistryError> {
        let session_id = key(session_id);
        let handle = self.get(session_id).await?;
        let mut session = handle.lock().await;
        let person_name = session.persona.person_name().to_string();

        if let Some(cache) = self.coordinator.cache() {
            cache.invalidate(&person_name).await;
        }
        info!(%session_id, persona = %person_name, "Reinitializing persona");
        session.persona = self
            .coordinator
            .initialize(ConversationState::new(person_name))
            .await;
        Ok(SessionSnapshot::from(&*session))
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
