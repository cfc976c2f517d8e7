use crate::{
    auth::AuthenticatedUser,
    db,
    error::{AppError, Result},
    game::{marketplace::normalize_tags, BoardValidator, MarketplaceParams, MarketplaceQuery},
    models::{GameContent, GameStyling, MarketplaceListing, Template},
    AppState,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

const MAX_TAGS: usize = 10;
const MAX_TAG_LEN: usize = 30;
const MAX_SUBJECT_LEN: usize = 60;

#[derive(Debug, Deserialize)]
pub struct TemplatePayload {
    pub title: String,
    pub description: Option<String>,
    pub subject: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub content: GameContent,
    #[serde(default)]
    pub styling: GameStyling,
}

impl TemplatePayload {
    /// Check the board and metadata, returning the cleaned-up tags
    fn validate(&self) -> Result<Vec<String>> {
        let mut validator = BoardValidator::new();
        validator
            .title(&self.title)
            .content(&self.content)
            .styling(&self.styling);
        let mut errors = validator.finish().err().unwrap_or_default();

        if self
            .subject
            .as_deref()
            .is_some_and(|s| s.trim().chars().count() > MAX_SUBJECT_LEN)
        {
            errors.push(format!("Subject must be at most {} characters", MAX_SUBJECT_LEN));
        }

        let tags = normalize_tags(self.tags.clone());
        if tags.len() > MAX_TAGS {
            errors.push(format!("A template can have at most {} tags", MAX_TAGS));
        }
        if tags.iter().any(|t| t.chars().count() > MAX_TAG_LEN) {
            errors.push(format!("Tags must be at most {} characters", MAX_TAG_LEN));
        }

        if errors.is_empty() {
            Ok(tags)
        } else {
            Err(AppError::Validation(errors))
        }
    }

    fn subject(&self) -> Option<&str> {
        trimmed(self.subject.as_deref())
    }

    fn description(&self) -> Option<&str> {
        trimmed(self.description.as_deref())
    }
}

fn trimmed(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[derive(Debug, Deserialize)]
pub struct FromGameRequest {
    pub subject: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ShareRequest {
    pub is_public: bool,
}

#[derive(Debug, Serialize)]
pub struct MarketplacePage {
    pub items: Vec<MarketplaceListing>,
    pub total: i64,
    pub page: u32,
    pub per_page: i64,
}

/// Load a template the user may use: their own, a public one, or one they
/// downloaded before it was unshared
pub(crate) async fn load_accessible_template(
    state: &AppState,
    user_id: Uuid,
    template_id: Uuid,
) -> Result<Template> {
    let template = db::queries::get_template(&state.db, template_id)
        .await?
        .ok_or(AppError::NotFound("Template"))?;

    if template.user_id == user_id || template.is_public {
        return Ok(template);
    }

    if db::queries::has_downloaded_template(&state.db, user_id, template_id).await? {
        Ok(template)
    } else {
        Err(AppError::NotFound("Template"))
    }
}

pub async fn list_templates(
    user: AuthenticatedUser,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Template>>> {
    let templates = db::queries::list_templates(&state.db, user.user_id).await?;
    Ok(Json(templates))
}

pub async fn create_template(
    user: AuthenticatedUser,
    State(state): State<Arc<AppState>>,
    Json(payload): Json<TemplatePayload>,
) -> Result<(StatusCode, Json<Template>)> {
    let tags = payload.validate()?;

    let template = db::queries::create_template(
        &state.db,
        user.user_id,
        payload.title.trim(),
        payload.description(),
        payload.subject(),
        tags,
        &payload.content,
        &payload.styling,
    )
    .await?;

    tracing::info!("User {} created template {}", user.user_id, template.id);
    Ok((StatusCode::CREATED, Json(template)))
}

pub async fn get_template(
    user: AuthenticatedUser,
    State(state): State<Arc<AppState>>,
    Path(template_id): Path<Uuid>,
) -> Result<Json<Template>> {
    let template = load_accessible_template(&state, user.user_id, template_id).await?;
    Ok(Json(template))
}

pub async fn update_template(
    user: AuthenticatedUser,
    State(state): State<Arc<AppState>>,
    Path(template_id): Path<Uuid>,
    Json(payload): Json<TemplatePayload>,
) -> Result<Json<Template>> {
    let tags = payload.validate()?;

    let template = db::queries::update_template(
        &state.db,
        template_id,
        user.user_id,
        payload.title.trim(),
        payload.description(),
        payload.subject(),
        tags,
        &payload.content,
        &payload.styling,
    )
    .await?
    .ok_or(AppError::NotFound("Template"))?;

    Ok(Json(template))
}

pub async fn delete_template(
    user: AuthenticatedUser,
    State(state): State<Arc<AppState>>,
    Path(template_id): Path<Uuid>,
) -> Result<StatusCode> {
    if !db::queries::delete_template(&state.db, template_id, user.user_id).await? {
        return Err(AppError::NotFound("Template"));
    }

    tracing::info!("User {} deleted template {}", user.user_id, template_id);
    Ok(StatusCode::NO_CONTENT)
}

/// Save one of the user's games as a template
pub async fn create_from_game(
    user: AuthenticatedUser,
    State(state): State<Arc<AppState>>,
    Path(game_id): Path<Uuid>,
    Json(request): Json<FromGameRequest>,
) -> Result<(StatusCode, Json<Template>)> {
    let game = db::queries::get_game(&state.db, game_id, user.user_id)
        .await?
        .ok_or(AppError::NotFound("Game"))?;

    let payload = TemplatePayload {
        title: game.title,
        description: game.description,
        subject: request.subject,
        tags: request.tags,
        content: game.content.0,
        styling: game.styling.0,
    };
    let tags = payload.validate()?;

    let template = db::queries::create_template(
        &state.db,
        user.user_id,
        payload.title.trim(),
        payload.description(),
        payload.subject(),
        tags,
        &payload.content,
        &payload.styling,
    )
    .await?;

    tracing::info!(
        "User {} saved game {} as template {}",
        user.user_id,
        game_id,
        template.id
    );
    Ok((StatusCode::CREATED, Json(template)))
}

/// Publish a template to the marketplace or take it down
pub async fn share_template(
    user: AuthenticatedUser,
    State(state): State<Arc<AppState>>,
    Path(template_id): Path<Uuid>,
    Json(request): Json<ShareRequest>,
) -> Result<Json<Template>> {
    let template =
        db::queries::set_template_public(&state.db, template_id, user.user_id, request.is_public)
            .await?
            .ok_or(AppError::NotFound("Template"))?;

    tracing::info!(
        "User {} set template {} public={}",
        user.user_id,
        template_id,
        template.is_public
    );
    Ok(Json(template))
}

pub async fn list_downloaded(
    user: AuthenticatedUser,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Template>>> {
    let templates = db::queries::list_downloaded_templates(&state.db, user.user_id).await?;
    Ok(Json(templates))
}

/// Search public templates
pub async fn list_marketplace(
    _user: AuthenticatedUser,
    State(state): State<Arc<AppState>>,
    Query(params): Query<MarketplaceParams>,
) -> Result<Json<MarketplacePage>> {
    let query = MarketplaceQuery::from_params(params);
    tracing::debug!("Marketplace query: {:?}", query);

    let items = db::queries::list_marketplace(&state.db, &query).await?;
    let total = db::queries::count_marketplace(&state.db, &query).await?;

    Ok(Json(MarketplacePage {
        items,
        total,
        page: query.page,
        per_page: query.limit,
    }))
}

/// Download a public template, returning its full content
pub async fn download_template(
    user: AuthenticatedUser,
    State(state): State<Arc<AppState>>,
    Path(template_id): Path<Uuid>,
) -> Result<Json<Template>> {
    let template = db::queries::get_template(&state.db, template_id)
        .await?
        .filter(|t| t.is_public)
        .ok_or(AppError::NotFound("Template"))?;

    let first = db::queries::record_template_download(&state.db, user.user_id, template_id).await?;
    if first {
        tracing::info!("User {} downloaded template {}", user.user_id, template_id);
    }

    Ok(Json(template))
}
