use crate::{
    auth::{self, AuthenticatedUser},
    db,
    error::{AppError, Result},
    models::{DashboardCounts, GameSummary, UserProfile},
    routes::auth::validate_username,
    AppState,
};
use axum::{extract::State, http::StatusCode, Json};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

const RECENT_GAMES: i64 = 5;

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(custom(function = "validate_username"))]
    pub username: Option<String>,
    #[validate(length(min = 1, max = 64, message = "Display name must be 1 to 64 characters"))]
    pub display_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub user: UserProfile,
    #[serde(flatten)]
    pub counts: DashboardCounts,
    pub raffle_tickets: i32,
    pub recent_games: Vec<GameSummary>,
}

pub async fn get_profile(
    user: AuthenticatedUser,
    State(state): State<Arc<AppState>>,
) -> Result<Json<UserProfile>> {
    let db_user = db::queries::get_user(&state.db, user.user_id)
        .await?
        .ok_or(AppError::NotFound("User"))?;
    Ok(Json(db_user.to_profile()))
}

pub async fn update_profile(
    user: AuthenticatedUser,
    State(state): State<Arc<AppState>>,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Json<UserProfile>> {
    payload.validate()?;

    let display_name = payload.display_name.as_deref().map(str::trim);
    if display_name == Some("") {
        return Err(AppError::Validation(vec![
            "Display name must be 1 to 64 characters".to_string(),
        ]));
    }

    let updated = db::queries::update_profile(
        &state.db,
        user.user_id,
        payload.username.as_deref(),
        display_name,
    )
    .await?
    .ok_or(AppError::NotFound("User"))?;

    tracing::info!("User {} updated their profile", user.user_id);
    Ok(Json(updated.to_profile()))
}

/// Delete the account and everything it owns, then sign out
pub async fn delete_account(
    user: AuthenticatedUser,
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<(CookieJar, StatusCode)> {
    if !db::queries::delete_user(&state.db, user.user_id).await? {
        return Err(AppError::NotFound("User"));
    }

    // Live sessions hosted by this account go away with it
    let hosted: Vec<uuid::Uuid> = state
        .play_sessions
        .iter()
        .filter(|entry| entry.is_host(user.user_id))
        .map(|entry| *entry.key())
        .collect();
    for session_id in hosted {
        if let Some(session) = state.remove_play_session(session_id) {
            crate::websocket::notify_session_ended(&session);
        }
    }

    tracing::info!("Deleted account {} ({})", user.username, user.user_id);
    Ok((jar.remove(auth::removal_cookie()), StatusCode::NO_CONTENT))
}

pub async fn get_dashboard(
    user: AuthenticatedUser,
    State(state): State<Arc<AppState>>,
) -> Result<Json<DashboardResponse>> {
    let db_user = db::queries::get_user(&state.db, user.user_id)
        .await?
        .ok_or(AppError::NotFound("User"))?;
    let counts = db::queries::get_dashboard_counts(&state.db, user.user_id).await?;
    let recent = db::queries::list_recent_games(&state.db, user.user_id, RECENT_GAMES).await?;

    Ok(Json(DashboardResponse {
        raffle_tickets: db_user.raffle_tickets,
        user: db_user.to_profile(),
        counts,
        recent_games: recent.iter().map(GameSummary::from).collect(),
    }))
}
