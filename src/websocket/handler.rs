use crate::{
    auth::AuthenticatedUser,
    error::AppError,
    game::PlaySnapshot,
    routes::play::run_command,
    websocket::messages::{ClientMessage, ServerMessage},
    AppState, PlaySession,
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt};
use std::{sync::Arc, time::Instant};
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

/// WebSocket upgrade handler with authentication
///
/// Anyone signed in may watch a session; only its host may send commands.
pub async fn handle_websocket(
    user: AuthenticatedUser,
    ws: WebSocketUpgrade,
    Path(session_id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    if !state.play_sessions.contains_key(&session_id) {
        return Err(AppError::NotFound("Play session"));
    }

    tracing::info!(
        "WebSocket connection authenticated for user: {} ({}) on session {}",
        user.username,
        user.user_id,
        session_id
    );
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, user, session_id)))
}

/// Handle individual WebSocket connection
async fn handle_socket(
    socket: WebSocket,
    state: Arc<AppState>,
    user: AuthenticatedUser,
    session_id: Uuid,
) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(100);
    let connection_id = Uuid::new_v4();

    // Subscribe to the session and grab the state to send first
    let initial = match state.play_sessions.get_mut(&session_id) {
        Some(mut session) => {
            session.subscribers.insert(connection_id, tx.clone());
            ServerMessage::Snapshot {
                session_id,
                snapshot: session.state.snapshot(Instant::now()),
            }
        }
        None => ServerMessage::SessionEnded { session_id },
    };
    let _ = tx.send(initial).await;

    // The session owns the only strong sender, so the connection closes
    // once the session drops it
    let weak_tx = tx.downgrade();
    drop(tx);

    tracing::info!(
        "WebSocket connection established for user: {} ({}) on session {}",
        user.username,
        user.user_id,
        session_id
    );

    // Spawn a task to send messages to the client
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let ended = matches!(msg, ServerMessage::SessionEnded { .. });
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to serialize message: {}", e);
                }
            }
            if ended {
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
        }
    });

    // Handle incoming messages from the client
    let user_for_recv = user.clone();
    let state_for_recv = state.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            let Some(tx) = weak_tx.upgrade() else {
                break;
            };
            match msg {
                Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(client_msg) => {
                        if let Err(e) = handle_client_message(
                            client_msg,
                            &state_for_recv,
                            session_id,
                            &tx,
                            &user_for_recv,
                        )
                        .await
                        {
                            tracing::warn!("Rejected play message: {}", e);
                            let error_msg = ServerMessage::Error {
                                message: e.to_string(),
                            };
                            let _ = tx.send(error_msg).await;
                        }
                    }
                    Err(e) => {
                        tracing::error!("Failed to parse message: {}", e);
                        let error_msg = ServerMessage::Error {
                            message: format!("Invalid message format: {}", e),
                        };
                        let _ = tx.send(error_msg).await;
                    }
                },
                Message::Close(_) => {
                    tracing::info!(
                        "Client disconnected: {} ({})",
                        user_for_recv.username,
                        user_for_recv.user_id
                    );
                    break;
                }
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = (&mut send_task) => {
            recv_task.abort();
        }
        _ = (&mut recv_task) => {
            send_task.abort();
        }
    }

    // Unsubscribe if the session still exists
    if let Some(mut session) = state.play_sessions.get_mut(&session_id) {
        session.subscribers.remove(&connection_id);
    }

    tracing::info!(
        "WebSocket connection closed for user: {} ({}) on session {}",
        user.username,
        user.user_id,
        session_id
    );
}

/// Handle individual client messages
async fn handle_client_message(
    msg: ClientMessage,
    state: &AppState,
    session_id: Uuid,
    tx: &mpsc::Sender<ServerMessage>,
    user: &AuthenticatedUser,
) -> Result<(), AppError> {
    match msg {
        ClientMessage::Command { command } => {
            tracing::debug!(
                "User {} ({}) sent {:?} to session {}",
                user.username,
                user.user_id,
                command,
                session_id
            );
            // Broadcast reaches this connection too
            run_command(state, session_id, user, command)?;
        }
        ClientMessage::Refresh => {
            let snapshot = state
                .play_sessions
                .get(&session_id)
                .map(|session| session.state.snapshot(Instant::now()))
                .ok_or(AppError::NotFound("Play session"))?;
            let _ = tx.send(ServerMessage::Snapshot { session_id, snapshot }).await;
        }
        ClientMessage::Ping => {
            let _ = tx.send(ServerMessage::Pong).await;
        }
    }

    Ok(())
}

/// Queue a snapshot for every connection watching a session.
///
/// Never waits on a viewer. Connections whose queue is full or closed are
/// unsubscribed and have to reconnect. Returns how many were dropped.
pub fn broadcast_snapshot(session: &mut PlaySession, snapshot: &PlaySnapshot) -> usize {
    let session_id = session.session_id;
    let message = ServerMessage::Snapshot {
        session_id,
        snapshot: snapshot.clone(),
    };

    let before = session.subscribers.len();
    session
        .subscribers
        .retain(|connection_id, tx| match tx.try_send(message.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(
                    "Dropping lagging connection {} from session {}",
                    connection_id,
                    session_id
                );
                false
            }
            Err(TrySendError::Closed(_)) => false,
        });

    before - session.subscribers.len()
}

/// Tell every connection of a removed session that it has ended
pub fn notify_session_ended(session: &PlaySession) {
    let message = ServerMessage::SessionEnded {
        session_id: session.session_id,
    };

    // A full queue still closes once the session's senders are dropped
    for tx in session.subscribers.values() {
        let _ = tx.try_send(message.clone());
    }
}
