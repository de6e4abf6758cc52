//! API Models
//!
//! Request and response bodies for the REST API, with `utoipa` schemas for
//! the generated OpenAPI document. All fields are camelCase on the wire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use voiceboard_core::{ChatOutcome, SessionSnapshot, cache::CacheEntryInfo};

// Missing fields deserialize as empty strings so the registry can reject them
// with a validation error instead of a parser error.
#[derive(Deserialize, ToSchema, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CreateVoiceboardPayload {
    #[serde(default)]
    #[schema(example = "Ada Lovelace")]
    pub person_name: String,
    #[serde(default)]
    #[schema(example = "b1f4c1d2-session")]
    pub session_id: String,
}

#[derive(Deserialize, ToSchema, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ChatPayload {
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    #[schema(example = "What are you working on these days?")]
    pub message: String,
    /// Creates the session first when it does not exist yet.
    #[serde(default)]
    pub person_name: Option<String>,
}

#[derive(Serialize, ToSchema, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
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

impl From<SessionSnapshot> for SessionStatus {
    fn from(snapshot: SessionSnapshot) -> Self {
        Self {
            session_id: snapshot.session_id,
            person_name: snapshot.person_name,
            created_at: snapshot.created_at,
            initialized: snapshot.initialized,
            sufficient: snapshot.sufficient,
            snippet_count: snapshot.snippet_count,
            attempt_count: snapshot.attempt_count,
            message_count: snapshot.message_count,
            estimated_tokens: snapshot.estimated_tokens,
            last_query: snapshot.last_query,
        }
    }
}

#[derive(Serialize, ToSchema, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub session_id: String,
    pub person_name: String,
    pub response: String,
    pub timestamp: DateTime<Utc>,
    pub message_count: usize,
    pub estimated_tokens: usize,
}

impl ChatReply {
    pub fn new(session_id: String, outcome: ChatOutcome) -> Self {
        Self {
            session_id,
            person_name: outcome.person_name,
            response: outcome.reply,
            timestamp: outcome.timestamp,
            message_count: outcome.message_count,
            estimated_tokens: outcome.estimated_tokens,
        }
    }
}

#[derive(Serialize, ToSchema, Debug)]
pub struct RemovedResponse {
    pub removed: bool,
}

#[derive(Serialize, ToSchema, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ClearedResponse {
    pub session_id: String,
    pub cleared: bool,
}

#[derive(Serialize, ToSchema, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub person_name: String,
    pub age_seconds: u64,
    pub expires_in_seconds: u64,
    pub snippet_count: usize,
}

impl From<CacheEntryInfo> for CacheEntry {
    fn from(info: CacheEntryInfo) -> Self {
        Self {
            person_name: info.person_name,
            age_seconds: info.age_seconds,
            expires_in_seconds: info.expires_in_seconds,
            snippet_count: info.snippet_count,
        }
    }
}

#[derive(Serialize, ToSchema, Debug)]
pub struct CacheResponse {
    pub enabled: bool,
    pub entries: Vec<CacheEntry>,
}

#[derive(Serialize, ToSchema, Debug)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    #[schema(example = "healthy")]
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub active_sessions: usize,
}

#[derive(Serialize, ToSchema, Debug)]
pub struct ServiceInfo {
    pub name: String,
    pub version: String,
    pub model: String,
    pub endpoints: Vec<String>,
}

#[derive(Serialize, ToSchema, Debug)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_create_payload_accepts_camel_case() {
        let payload: CreateVoiceboardPayload =
            serde_json::from_value(json!({"personName": "Ada", "sessionId": "s1"})).unwrap();
        assert_eq!(payload.person_name, "Ada");
        assert_eq!(payload.session_id, "s1");
    }

    #[test]
    fn test_create_payload_missing_fields_are_empty() {
        let payload: CreateVoiceboardPayload = serde_json::from_value(json!({})).unwrap();
        assert!(payload.person_name.is_empty());
        assert!(payload.session_id.is_empty());
    }

    #[test]
    fn test_chat_payload_optional_persona() {
        let payload: ChatPayload =
            serde_json::from_value(json!({"sessionId": "s1", "message": "hi"})).unwrap();
        assert_eq!(payload.person_name, None);

        let payload: ChatPayload = serde_json::from_value(
            json!({"sessionId": "s1", "message": "hi", "personName": "Ada"}),
        )
        .unwrap();
        assert_eq!(payload.person_name.as_deref(), Some("Ada"));
    }

    #[test]
    fn test_chat_reply_serialization() {
        let outcome = ChatOutcome {
            reply: "Hello there".to_string(),
            person_name: "Ada".to_string(),
            timestamp: Utc::now(),
            message_count: 1,
            estimated_tokens: 42,
            created: false,
        };
        let value = serde_json::to_value(ChatReply::new("s1".to_string(), outcome)).unwrap();

        assert_eq!(value["sessionId"], "s1");
        assert_eq!(value["personName"], "Ada");
        assert_eq!(value["response"], "Hello there");
        assert_eq!(value["messageCount"], 1);
        assert_eq!(value["estimatedTokens"], 42);
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn test_error_response_serialization() {
        let error = ErrorResponse {
            error: "Session 's1' not found".to_string(),
        };
        assert_eq!(
            serde_json::to_string(&error).unwrap(),
            r#"{"error":"Session 's1' not found"}"#
        );
    }

    #[test]
    fn test_health_response_serialization() {
        let health = HealthResponse {
            status: "healthy".to_string(),
            timestamp: Utc::now(),
            active_sessions: 3,
        };
        let value = serde_json::to_value(&health).unwrap();
        assert_eq!(value["status"], "healthy");
        assert_eq!(value["activeSessions"], 3);
    }
}
