use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow};
use uuid::Uuid;

use super::{GameContent, GameStyling};

/// A reusable board preset; public templates are listed in the marketplace
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Template {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    /// School subject, e.g. "Science"
    pub subject: Option<String>,
    pub tags: Vec<String>,
    pub content: Json<GameContent>,
    pub styling: Json<GameStyling>,
    pub is_public: bool,
    pub downloads: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Marketplace row: a public template plus its author's name
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct MarketplaceListing {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub subject: Option<String>,
    pub tags: Vec<String>,
    pub downloads: i32,
    pub author: String,
    pub created_at: DateTime<Utc>,
}
