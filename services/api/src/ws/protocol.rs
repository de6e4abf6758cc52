//! Defines the WebSocket event protocol between the browser client and the API server.
//!
//! Every frame is a JSON text message tagged by `type`, with kebab-case type
//! names and camelCase fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Events sent from the client (browser) to the server.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Binds a persona to this connection, replacing any previous one.
    CreateVoiceboard {
        #[serde(default)]
        person_name: String,
    },
    /// A text message for the persona.
    Chat {
        #[serde(default)]
        message: String,
        /// Creates the voiceboard first if the connection has none yet.
        #[serde(default)]
        person_name: Option<String>,
    },
    /// Resets the conversation history, keeping the persona research.
    ClearConversation {},
}

/// Events sent from the server to the client (browser).
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Sent once when the connection opens.
    Connected { session_id: String },
    /// Progress text while a long-running step is underway.
    Status { message: String },
    /// The persona has been researched and is ready to chat.
    VoiceboardReady {
        person_name: String,
        session_id: String,
    },
    /// Brackets the handling of a chat message.
    Typing { is_typing: bool },
    /// The persona's reply to a chat message.
    Response {
        message: String,
        timestamp: DateTime<Utc>,
    },
    /// Reports a failed event. The connection stays open.
    Error { message: String },
    ConversationCleared {},
}
