use crate::{
    auth::AuthenticatedUser,
    db,
    error::{AppError, Result},
    game::BoardValidator,
    models::{Game, GameContent, GameStyling, GameSummary},
    routes::templates::load_accessible_template,
    AppState,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

const COPY_SUFFIX: &str = " (copy)";

#[derive(Debug, Deserialize)]
pub struct GamePayload {
    pub title: String,
    pub description: Option<String>,
    pub content: GameContent,
    #[serde(default)]
    pub styling: GameStyling,
}

impl GamePayload {
    fn validate(&self) -> Result<()> {
        BoardValidator::check(&self.title, &self.content, &self.styling)
            .map_err(AppError::Validation)
    }

    fn description(&self) -> Option<&str> {
        self.description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
    }
}

#[derive(Debug, Deserialize)]
pub struct ApplyTemplateRequest {
    pub template_id: Uuid,
    /// Also replace the board with the template's categories
    #[serde(default)]
    pub replace_content: bool,
}

/// Title for a duplicated game, kept within the title limit
fn copy_title(title: &str) -> String {
    let max = crate::game::validator::MAX_TITLE_LEN - COPY_SUFFIX.len();
    let base: String = title.trim().chars().take(max).collect();
    format!("{}{}", base, COPY_SUFFIX)
}

async fn load_game(state: &AppState, game_id: Uuid, user_id: Uuid) -> Result<Game> {
    db::queries::get_game(&state.db, game_id, user_id)
        .await?
        .ok_or(AppError::NotFound("Game"))
}

pub async fn list_games(
    user: AuthenticatedUser,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<GameSummary>>> {
    let games = db::queries::list_games(&state.db, user.user_id).await?;
    Ok(Json(games.iter().map(GameSummary::from).collect()))
}

pub async fn create_game(
    user: AuthenticatedUser,
    State(state): State<Arc<AppState>>,
    Json(payload): Json<GamePayload>,
) -> Result<(StatusCode, Json<Game>)> {
    payload.validate()?;

    let game = db::queries::create_game(
        &state.db,
        user.user_id,
        payload.title.trim(),
        payload.description(),
        &payload.content,
        &payload.styling,
    )
    .await?;

    tracing::info!("User {} created game {}", user.user_id, game.id);
    Ok((StatusCode::CREATED, Json(game)))
}

pub async fn get_game(
    user: AuthenticatedUser,
    State(state): State<Arc<AppState>>,
    Path(game_id): Path<Uuid>,
) -> Result<Json<Game>> {
    Ok(Json(load_game(&state, game_id, user.user_id).await?))
}

pub async fn update_game(
    user: AuthenticatedUser,
    State(state): State<Arc<AppState>>,
    Path(game_id): Path<Uuid>,
    Json(payload): Json<GamePayload>,
) -> Result<Json<Game>> {
    payload.validate()?;

    let game = db::queries::update_game(
        &state.db,
        game_id,
        user.user_id,
        payload.title.trim(),
        payload.description(),
        &payload.content,
        &payload.styling,
    )
    .await?
    .ok_or(AppError::NotFound("Game"))?;

    tracing::debug!("User {} saved game {}", user.user_id, game.id);
    Ok(Json(game))
}

pub async fn delete_game(
    user: AuthenticatedUser,
    State(state): State<Arc<AppState>>,
    Path(game_id): Path<Uuid>,
) -> Result<StatusCode> {
    if !db::queries::delete_game(&state.db, game_id, user.user_id).await? {
        return Err(AppError::NotFound("Game"));
    }

    tracing::info!("User {} deleted game {}", user.user_id, game_id);
    Ok(StatusCode::NO_CONTENT)
}

/// Copy a template's styling, and optionally its board, onto a game
pub async fn apply_template(
    user: AuthenticatedUser,
    State(state): State<Arc<AppState>>,
    Path(game_id): Path<Uuid>,
    Json(request): Json<ApplyTemplateRequest>,
) -> Result<Json<Game>> {
    let game = load_game(&state, game_id, user.user_id).await?;
    let template = load_accessible_template(&state, user.user_id, request.template_id).await?;

    let content = if request.replace_content {
        &template.content.0
    } else {
        &game.content.0
    };

    let game = db::queries::update_game(
        &state.db,
        game_id,
        user.user_id,
        &game.title,
        game.description.as_deref(),
        content,
        &template.styling.0,
    )
    .await?
    .ok_or(AppError::NotFound("Game"))?;

    tracing::info!(
        "User {} applied template {} to game {} (replace_content={})",
        user.user_id,
        template.id,
        game_id,
        request.replace_content
    );
    Ok(Json(game))
}

pub async fn duplicate_game(
    user: AuthenticatedUser,
    State(state): State<Arc<AppState>>,
    Path(game_id): Path<Uuid>,
) -> Result<(StatusCode, Json<Game>)> {
    let original = load_game(&state, game_id, user.user_id).await?;

    let copy = db::queries::create_game(
        &state.db,
        user.user_id,
        &copy_title(&original.title),
        original.description.as_deref(),
        &original.content.0,
        &original.styling.0,
    )
    .await?;

    tracing::info!("User {} duplicated game {} as {}", user.user_id, game_id, copy.id);
    Ok((StatusCode::CREATED, Json(copy)))
}
