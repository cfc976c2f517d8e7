use crate::{
    auth::AuthenticatedUser,
    db,
    error::{AppError, Result},
    game::{PlayCommand, PlaySnapshot, PlayState},
    websocket, AppState, PlaySession,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Instant};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct StartPlayRequest {
    pub game_id: Uuid,
    pub teams: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct SelectRequest {
    pub category: usize,
    pub question: usize,
}

#[derive(Debug, Deserialize)]
pub struct AwardRequest {
    /// Team index, or null when nobody answered correctly
    pub team: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct AdjustRequest {
    pub team: usize,
    pub delta: i64,
}

#[derive(Debug, Serialize)]
pub struct PlaySessionView {
    pub session_id: Uuid,
    pub game_id: Uuid,
    pub title: String,
    pub join_code: String,
    pub is_host: bool,
    pub elapsed_seconds: u64,
    pub snapshot: PlaySnapshot,
}

impl PlaySessionView {
    fn new(session: &PlaySession, user_id: Uuid, now: Instant) -> Self {
        Self {
            session_id: session.session_id,
            game_id: session.game_id,
            title: session.title.clone(),
            join_code: session.join_code.clone(),
            is_host: session.is_host(user_id),
            elapsed_seconds: now.saturating_duration_since(session.created_at).as_secs(),
            snapshot: session.state.snapshot(now),
        }
    }
}

/// Apply a host command to a live session and broadcast the new state.
///
/// Shared by the REST endpoints and the WebSocket channel. The broadcast
/// happens under the session lock so viewers see snapshots in order.
pub fn run_command(
    state: &AppState,
    session_id: Uuid,
    user: &AuthenticatedUser,
    command: PlayCommand,
) -> Result<PlaySnapshot> {
    let mut session = state
        .play_sessions
        .get_mut(&session_id)
        .ok_or(AppError::NotFound("Play session"))?;

    if !session.is_host(user.user_id) {
        return Err(AppError::Forbidden(
            "Only the host can control this game".to_string(),
        ));
    }

    let now = Instant::now();
    session.state.apply(command.clone(), now)?;
    session.touch();

    if session.state.is_complete() {
        tracing::info!("Play session {} is complete", session_id);
    }

    let snapshot = session.state.snapshot(now);
    let dropped = websocket::broadcast_snapshot(&mut session, &snapshot);
    tracing::debug!(
        "Session {} applied {:?} (version {}, {} lagging viewers dropped)",
        session_id,
        command,
        snapshot.version,
        dropped
    );

    Ok(snapshot)
}

/// Start playing one of the user's games
pub async fn start_session(
    user: AuthenticatedUser,
    State(state): State<Arc<AppState>>,
    Json(request): Json<StartPlayRequest>,
) -> Result<(StatusCode, Json<PlaySessionView>)> {
    let game = db::queries::get_game(&state.db, request.game_id, user.user_id)
        .await?
        .ok_or(AppError::NotFound("Game"))?;

    let play_state = PlayState::start(game.content.0, request.teams)?;
    let session = PlaySession::new(game.id, user.user_id, game.title, play_state);
    let session_id = state.insert_play_session(session);

    let view = state
        .play_sessions
        .get(&session_id)
        .map(|session| PlaySessionView::new(&session, user.user_id, Instant::now()))
        .ok_or(AppError::NotFound("Play session"))?;

    tracing::info!(
        "User {} started play session {} for game {} (code {})",
        user.user_id,
        session_id,
        view.game_id,
        view.join_code
    );
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn get_session(
    user: AuthenticatedUser,
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<PlaySessionView>> {
    let view = state
        .play_sessions
        .get(&session_id)
        .map(|session| PlaySessionView::new(&session, user.user_id, Instant::now()))
        .ok_or(AppError::NotFound("Play session"))?;
    Ok(Json(view))
}

/// Spectator lookup by join code
pub async fn get_session_by_code(
    user: AuthenticatedUser,
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<Json<PlaySessionView>> {
    let session_id = state
        .join_code_index
        .get(&code.trim().to_uppercase())
        .map(|entry| *entry.value())
        .ok_or(AppError::NotFound("Play session"))?;

    get_session(user, State(state), Path(session_id)).await
}

pub async fn select_question(
    user: AuthenticatedUser,
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<SelectRequest>,
) -> Result<Json<PlaySnapshot>> {
    let command = PlayCommand::Select {
        category: request.category,
        question: request.question,
    };
    Ok(Json(run_command(&state, session_id, &user, command)?))
}

pub async fn reveal_answer(
    user: AuthenticatedUser,
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<PlaySnapshot>> {
    Ok(Json(
        run_command(&state, session_id, &user, PlayCommand::Reveal)?,
    ))
}

pub async fn team_select(
    user: AuthenticatedUser,
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<PlaySnapshot>> {
    Ok(Json(
        run_command(&state, session_id, &user, PlayCommand::TeamSelect)?,
    ))
}

pub async fn award(
    user: AuthenticatedUser,
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<AwardRequest>,
) -> Result<Json<PlaySnapshot>> {
    let command = PlayCommand::Award { team: request.team };
    Ok(Json(run_command(&state, session_id, &user, command)?))
}

pub async fn skip(
    user: AuthenticatedUser,
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<PlaySnapshot>> {
    Ok(Json(
        run_command(&state, session_id, &user, PlayCommand::Skip)?,
    ))
}

pub async fn back_to_board(
    user: AuthenticatedUser,
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<PlaySnapshot>> {
    Ok(Json(
        run_command(&state, session_id, &user, PlayCommand::Back)?,
    ))
}

pub async fn adjust_score(
    user: AuthenticatedUser,
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<AdjustRequest>,
) -> Result<Json<PlaySnapshot>> {
    let command = PlayCommand::Adjust {
        team: request.team,
        delta: request.delta,
    };
    Ok(Json(run_command(&state, session_id, &user, command)?))
}

/// End a session; only its host may do this
pub async fn end_session(
    user: AuthenticatedUser,
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> Result<StatusCode> {
    let is_host = state
        .play_sessions
        .get(&session_id)
        .map(|session| session.is_host(user.user_id))
        .ok_or(AppError::NotFound("Play session"))?;

    if !is_host {
        return Err(AppError::Forbidden(
            "Only the host can end this game".to_string(),
        ));
    }

    if let Some(session) = state.remove_play_session(session_id) {
        websocket::notify_session_ended(&session);
        tracing::info!("User {} ended play session {}", user.user_id, session_id);
    }

    Ok(StatusCode::NO_CONTENT)
}
