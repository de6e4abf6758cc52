//! Handles one inbound client event from start to finish.

use crate::{state::AppState, ws::protocol::{ClientMessage, ServerMessage}};
use anyhow::{Context, Result};
use chrono::Utc;
use std::{future::Future, sync::Arc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use voiceboard_core::RegistryError;

async fn emit(outbound: &mpsc::Sender<ServerMessage>, msg: ServerMessage) -> Result<()> {
    outbound
        .send(msg)
        .await
        .context("Client connection closed")
}

/// Runs `work` unless the connection is cancelled first.
async fn unless_cancelled<T>(cancel: &CancellationToken, work: impl Future<Output = T>) -> Option<T> {
    tokio::select! {
        _ = cancel.cancelled() => None,
        result = work => Some(result),
    }
}

/// Processes a single client event, emitting every resulting server event.
///
/// Registry failures become `error` events. The returned error only reports
/// that the outbound channel is gone.
pub async fn handle_client_message(
    state: &Arc<AppState>,
    session_id: &str,
    msg: ClientMessage,
    outbound: &mpsc::Sender<ServerMessage>,
    cancel: CancellationToken,
) -> Result<()> {
    match msg {
        ClientMessage::CreateVoiceboard { person_name } => {
            let person_name = person_name.trim().to_string();
            if person_name.is_empty() {
                let message = RegistryError::Validation("personName").to_string();
                return emit(outbound, ServerMessage::Error { message }).await;
            }

            emit(
                outbound,
                ServerMessage::Status {
                    message: format!("Researching {person_name}..."),
                },
            )
            .await?;

            if state.registry.remove(session_id).await {
                info!(persona = %person_name, "Replacing existing voiceboard");
            }
            let Some(result) =
                unless_cancelled(&cancel, state.registry.create(session_id, &person_name)).await
            else {
                warn!(persona = %person_name, "Voiceboard creation cancelled");
                return Ok(());
            };

            let event = match result {
                Ok(snapshot) => ServerMessage::VoiceboardReady {
                    person_name: snapshot.person_name,
                    session_id: session_id.to_string(),
                },
                Err(e) => ServerMessage::Error {
                    message: e.to_string(),
                },
            };
            emit(outbound, event).await
        }
        ClientMessage::Chat {
            message,
            person_name,
        } => {
            emit(outbound, ServerMessage::Typing { is_typing: true }).await?;

            let Some(result) = unless_cancelled(
                &cancel,
                state
                    .registry
                    .chat(session_id, &message, person_name.as_deref()),
            )
            .await
            else {
                warn!("Chat cancelled");
                return Ok(());
            };

            match result {
                Ok(outcome) => {
                    if outcome.created {
                        emit(
                            outbound,
                            ServerMessage::VoiceboardReady {
                                person_name: outcome.person_name.clone(),
                                session_id: session_id.to_string(),
                            },
                        )
                        .await?;
                    }
                    emit(
                        outbound,
                        ServerMessage::Response {
                            message: outcome.reply,
                            timestamp: Utc::now(),
                        },
                    )
                    .await?;
                }
                Err(e) => {
                    emit(
                        outbound,
                        ServerMessage::Error {
                            message: e.to_string(),
                        },
                    )
                    .await?;
                }
            }
            emit(outbound, ServerMessage::Typing { is_typing: false }).await
        }
        ClientMessage::ClearConversation {} => {
            let event = match state.registry.clear(session_id).await {
                Ok(()) => ServerMessage::ConversationCleared {},
                Err(e) => ServerMessage::Error {
                    message: e.to_string(),
                },
            };
            emit(outbound, event).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{stalled_app, test_app};
    use std::{sync::atomic::Ordering, time::Duration};

    async fn run(state: &Arc<AppState>, msg: ClientMessage) -> Vec<ServerMessage> {
        let (tx, mut rx) = mpsc::channel(16);
        handle_client_message(state, "conn-1", msg, &tx, CancellationToken::new())
            .await
            .unwrap();
        drop(tx);
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    fn create(name: &str) -> ClientMessage {
        ClientMessage::CreateVoiceboard {
            person_name: name.to_string(),
        }
    }

    fn chat(message: &str, person_name: Option<&str>) -> ClientMessage {
        ClientMessage::Chat {
            message: message.to_string(),
            person_name: person_name.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_create_researches_once_and_reports_ready() {
        let app = test_app();
        let events = run(&app.state, create("Ada")).await;

        assert!(matches!(events[0], ServerMessage::Status { .. }));
        assert_eq!(
            events[1],
            ServerMessage::VoiceboardReady {
                person_name: "Ada".to_string(),
                session_id: "conn-1".to_string(),
            }
        );
        assert_eq!(events.len(), 2);
        assert_eq!(app.search.calls.load(Ordering::SeqCst), 1);
        // Style synthesis is the only completion during creation.
        assert_eq!(app.llm.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_blank_persona_is_rejected_without_touching_session() {
        let app = test_app();
        run(&app.state, create("Ada")).await;

        let events = run(&app.state, create("  ")).await;
        assert_eq!(
            events,
            vec![ServerMessage::Error {
                message: "personName is required".to_string()
            }]
        );
        assert!(app.state.registry.contains("conn-1").await);
    }

    #[tokio::test]
    async fn test_create_again_replaces_persona() {
        let app = test_app();
        run(&app.state, create("Ada")).await;
        let events = run(&app.state, create("Grace")).await;

        assert!(matches!(
            &events[1],
            ServerMessage::VoiceboardReady { person_name, .. } if person_name == "Grace"
        ));
        let snapshot = app.state.registry.snapshot("conn-1").await.unwrap();
        assert_eq!(snapshot.person_name, "Grace");
        assert_eq!(app.state.registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_chat_is_bracketed_by_typing() {
        let app = test_app();
        run(&app.state, create("Ada")).await;

        let events = run(&app.state, chat("What drives you?", None)).await;

        assert_eq!(events.len(), 3);
        assert_eq!(events[0], ServerMessage::Typing { is_typing: true });
        assert!(matches!(
            &events[1],
            ServerMessage::Response { message, .. } if message.contains("What drives you?")
        ));
        assert_eq!(events[2], ServerMessage::Typing { is_typing: false });
    }

    #[tokio::test]
    async fn test_chat_without_voiceboard_is_an_error() {
        let app = test_app();
        let events = run(&app.state, chat("hello", None)).await;

        assert_eq!(events[0], ServerMessage::Typing { is_typing: true });
        assert_eq!(
            events[1],
            ServerMessage::Error {
                message: "Session 'conn-1' not found".to_string()
            }
        );
        assert_eq!(events[2], ServerMessage::Typing { is_typing: false });
    }

    #[tokio::test]
    async fn test_chat_with_persona_creates_once() {
        let app = test_app();

        let first = run(&app.state, chat("hello", Some("Ada"))).await;
        assert!(matches!(first[1], ServerMessage::VoiceboardReady { .. }));
        assert!(matches!(first[2], ServerMessage::Response { .. }));

        let second = run(&app.state, chat("hello again", Some("Ada"))).await;
        assert!(
            !second
                .iter()
                .any(|e| matches!(e, ServerMessage::VoiceboardReady { .. }))
        );
        assert_eq!(app.search.calls.load(Ordering::SeqCst), 1);
        // One style synthesis and two replies.
        assert_eq!(app.llm.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_clear_conversation() {
        let app = test_app();
        let events = run(&app.state, ClientMessage::ClearConversation {}).await;
        assert!(matches!(events[0], ServerMessage::Error { .. }));

        run(&app.state, create("Ada")).await;
        run(&app.state, chat("hello", None)).await;
        let events = run(&app.state, ClientMessage::ClearConversation {}).await;

        assert_eq!(events, vec![ServerMessage::ConversationCleared {}]);
        let snapshot = app.state.registry.snapshot("conn-1").await.unwrap();
        assert_eq!(snapshot.message_count, 0);
        assert_eq!(snapshot.snippet_count, 20);
    }

    #[tokio::test]
    async fn test_cancellation_abandons_research() {
        let state = stalled_app();
        let (tx, mut rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();

        let handle = {
            let state = state.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                handle_client_message(&state, "conn-1", create("Ada"), &tx, cancel).await
            })
        };

        assert!(matches!(rx.recv().await, Some(ServerMessage::Status { .. })));
        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("handler should stop once cancelled")
            .unwrap();
        assert!(result.is_ok());
        assert!(rx.recv().await.is_none());
    }
}
