//! Manages the WebSocket connection lifecycle for a voiceboard session.
//!
//! Each connection runs three cooperating parts: the reader loop below, a
//! worker that handles client events strictly in order, and a writer that
//! owns the socket sink. The connection's session id doubles as the registry
//! key, so closing the socket also drops the session.

use super::{
    cycle::handle_client_message,
    protocol::{ClientMessage, ServerMessage},
};
use crate::state::AppState;
use anyhow::Result;
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, instrument, warn};
use uuid::Uuid;

const CHANNEL_CAPACITY: usize = 32;
const INTERNAL_ERROR: &str = "An internal error occurred.";

/// Axum handler to upgrade an HTTP connection to a WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Main handler for an individual WebSocket connection.
#[instrument(name = "ws_session", skip_all, fields(session_id))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let session_id = Uuid::new_v4().to_string();
    tracing::Span::current().record("session_id", session_id.as_str());
    info!("New WebSocket connection");

    let (socket_tx, socket_rx) = socket.split();
    let cancel = CancellationToken::new();
    let (outbound_tx, outbound_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (inbound_tx, inbound_rx) = mpsc::channel(CHANNEL_CAPACITY);

    let writer = tokio::spawn(write_loop(socket_tx, outbound_rx).in_current_span());
    let worker = tokio::spawn(
        run_worker(
            state.clone(),
            session_id.clone(),
            inbound_rx,
            outbound_tx.clone(),
            cancel.clone(),
        )
        .in_current_span(),
    );

    let connected = ServerMessage::Connected {
        session_id: session_id.clone(),
    };
    if outbound_tx.send(connected).await.is_ok() {
        read_loop(socket_rx, inbound_tx, &outbound_tx).await;
    }

    // Abandon in-flight work, then let the writer flush and exit.
    cancel.cancel();
    drop(outbound_tx);
    if let Err(e) = worker.await {
        error!(error = ?e, "Worker task failed");
    }
    if let Err(e) = writer.await {
        error!(error = ?e, "Writer task failed");
    }

    state.registry.remove(&session_id).await;
    info!("WebSocket connection closed");
}

/// Reads client frames until the socket closes, queueing parsed events.
async fn read_loop(
    mut socket_rx: SplitStream<WebSocket>,
    inbound: mpsc::Sender<ClientMessage>,
    outbound: &mpsc::Sender<ServerMessage>,
) {
    while let Some(frame) = socket_rx.next().await {
        let reply = match frame {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(msg) => {
                    if inbound.send(msg).await.is_err() {
                        break;
                    }
                    continue;
                }
                Err(e) => {
                    warn!(error = %e, "Malformed client event");
                    format!("Invalid message: {e}")
                }
            },
            Ok(Message::Binary(_)) => {
                warn!("Ignoring binary frame");
                "Binary messages are not supported".to_string()
            }
            // Pings are answered by the WebSocket layer itself.
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
            Ok(Message::Close(_)) => {
                info!("Client sent close frame");
                break;
            }
            Err(e) => {
                warn!(error = ?e, "Error receiving from client WebSocket");
                break;
            }
        };
        if outbound.send(ServerMessage::Error { message: reply }).await.is_err() {
            break;
        }
    }
}

/// Handles queued client events one at a time until the queue closes or the
/// connection is cancelled.
///
/// Each event runs on its own task; a handler that panics is reported to the
/// client as a generic `error` event and the worker moves on to the next one.
pub(crate) async fn run_worker(
    state: Arc<AppState>,
    session_id: String,
    mut inbound: mpsc::Receiver<ClientMessage>,
    outbound: mpsc::Sender<ServerMessage>,
    cancel: CancellationToken,
) {
    loop {
        let msg = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            msg = inbound.recv() => match msg {
                Some(msg) => msg,
                None => break,
            },
        };
        debug!(event = ?msg, "Handling client event");
        let task = tokio::spawn(
            {
                let state = state.clone();
                let session_id = session_id.clone();
                let outbound = outbound.clone();
                let token = cancel.child_token();
                async move { handle_client_message(&state, &session_id, msg, &outbound, token).await }
            }
            .in_current_span(),
        );
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(error = %e, "Stopping worker");
                break;
            }
            Err(e) => {
                error!(error = ?e, "Client event handler failed");
                let failure = ServerMessage::Error {
                    message: INTERNAL_ERROR.to_string(),
                };
                if outbound.send(failure).await.is_err() {
                    break;
                }
            }
        }
    }
}

/// Forwards outbound events to the socket until every sender is dropped.
async fn write_loop(
    mut socket_tx: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<ServerMessage>,
) {
    while let Some(msg) = outbound.recv().await {
        if let Err(e) = send_msg(&mut socket_tx, msg).await {
            warn!(error = %e, "Failed to write to client WebSocket");
            break;
        }
    }
    let _ = socket_tx.close().await;
}

/// A helper function to serialize and send a `ServerMessage` to the client.
pub(crate) async fn send_msg(
    socket_tx: &mut SplitSink<WebSocket, Message>,
    msg: ServerMessage,
) -> Result<()> {
    let serialized = serde_json::to_string(&msg)?;
    socket_tx.send(Message::Text(serialized.into())).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        router::create_router,
        test_support::{panicking_app, stalled_app, test_app},
    };
    use serde_json::Value;
    use std::{sync::atomic::Ordering, time::Duration};
    use tokio::{net::TcpStream, time::timeout};
    use tokio_tungstenite::{
        MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message as WsMessage,
    };

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    async fn next_event(client: &mut Client) -> Value {
        loop {
            let frame = timeout(Duration::from_secs(5), client.next())
                .await
                .expect("event within timeout")
                .expect("socket still open")
                .expect("valid frame");
            if let WsMessage::Text(text) = frame {
                return serde_json::from_str(text.as_str()).expect("JSON event");
            }
        }
    }

    #[tokio::test]
    async fn test_connection_lifecycle_over_real_socket() {
        let app = test_app();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = create_router(app.state.clone());
        tokio::spawn(async move { axum::serve(listener, router).await });

        let (mut client, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();

        let connected = next_event(&mut client).await;
        assert_eq!(connected["type"], "connected");
        let session_id = connected["sessionId"].as_str().unwrap().to_string();
        assert!(!session_id.is_empty());

        client.send(WsMessage::text("{bad")).await.unwrap();
        let malformed = next_event(&mut client).await;
        assert_eq!(malformed["type"], "error");
        assert!(
            malformed["message"]
                .as_str()
                .unwrap()
                .starts_with("Invalid message")
        );

        client
            .send(WsMessage::binary(vec![1u8, 2, 3]))
            .await
            .unwrap();
        let binary = next_event(&mut client).await;
        assert_eq!(binary["type"], "error");
        assert_eq!(binary["message"], "Binary messages are not supported");

        client
            .send(WsMessage::text(
                r#"{"type":"create-voiceboard","personName":"Ada"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(next_event(&mut client).await["type"], "status");
        let ready = next_event(&mut client).await;
        assert_eq!(ready["type"], "voiceboard-ready");
        assert_eq!(ready["personName"], "Ada");
        assert_eq!(ready["sessionId"], session_id.as_str());
        assert!(app.state.registry.contains(&session_id).await);
        assert_eq!(app.state.registry.len().await, 1);

        client.close(None).await.unwrap();
        timeout(Duration::from_secs(5), async {
            while !app.state.registry.is_empty().await {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("session removed after close");
    }

    #[tokio::test]
    async fn test_worker_handles_events_in_order() {
        let app = test_app();
        let (inbound_tx, inbound_rx) = mpsc::channel(8);
        let (outbound_tx, mut outbound_rx) = mpsc::channel(32);
        let cancel = CancellationToken::new();

        inbound_tx
            .send(ClientMessage::CreateVoiceboard {
                person_name: "Ada".to_string(),
            })
            .await
            .unwrap();
        inbound_tx
            .send(ClientMessage::Chat {
                message: "hello".to_string(),
                person_name: None,
            })
            .await
            .unwrap();
        drop(inbound_tx);

        run_worker(
            app.state.clone(),
            "conn-1".to_string(),
            inbound_rx,
            outbound_tx,
            cancel,
        )
        .await;

        let mut events = Vec::new();
        while let Some(event) = outbound_rx.recv().await {
            events.push(event);
        }

        let ready = events
            .iter()
            .position(|e| matches!(e, ServerMessage::VoiceboardReady { .. }))
            .expect("voiceboard-ready event");
        let response = events
            .iter()
            .position(|e| matches!(e, ServerMessage::Response { .. }))
            .expect("response event");
        assert!(ready < response);
        assert_eq!(app.search.calls.load(Ordering::SeqCst), 1);
        // One style synthesis plus one reply: generation ran once per step.
        assert_eq!(app.llm.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_panicking_handler_reports_error_and_worker_continues() {
        let state = panicking_app();
        let (inbound_tx, inbound_rx) = mpsc::channel(8);
        let (outbound_tx, mut outbound_rx) = mpsc::channel(32);

        inbound_tx
            .send(ClientMessage::CreateVoiceboard {
                person_name: "Ada".to_string(),
            })
            .await
            .unwrap();
        inbound_tx
            .send(ClientMessage::ClearConversation {})
            .await
            .unwrap();
        drop(inbound_tx);

        run_worker(
            state,
            "conn-1".to_string(),
            inbound_rx,
            outbound_tx,
            CancellationToken::new(),
        )
        .await;

        let mut events = Vec::new();
        while let Some(event) = outbound_rx.recv().await {
            events.push(event);
        }

        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], ServerMessage::Status { .. }));
        assert_eq!(
            events[1],
            ServerMessage::Error {
                message: "An internal error occurred.".to_string()
            }
        );
        assert_eq!(events[2], ServerMessage::ConversationCleared {});
    }

    #[tokio::test]
    async fn test_cancelled_worker_stops_promptly() {
        let state = stalled_app();
        let (inbound_tx, inbound_rx) = mpsc::channel(8);
        let (outbound_tx, mut outbound_rx) = mpsc::channel(32);
        let cancel = CancellationToken::new();

        inbound_tx
            .send(ClientMessage::CreateVoiceboard {
                person_name: "Ada".to_string(),
            })
            .await
            .unwrap();

        let worker = tokio::spawn(run_worker(
            state,
            "conn-1".to_string(),
            inbound_rx,
            outbound_tx,
            cancel.clone(),
        ));

        assert!(matches!(
            outbound_rx.recv().await,
            Some(ServerMessage::Status { .. })
        ));
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(5), worker)
            .await
            .expect("worker should stop once cancelled")
            .unwrap();
        drop(inbound_tx);
    }
}
