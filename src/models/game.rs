use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
    Youtube,
}

/// Media attached to a question, shown alongside its text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Media {
    pub kind: MediaKind,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub value: i32,
    pub text: String,
    pub answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<Media>,
    /// Countdown shown while the question is open
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timer_seconds: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<Difficulty>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    #[serde(default)]
    pub questions: Vec<Question>,
}

/// The board itself: categories as columns, questions as rows
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameContent {
    pub categories: Vec<Category>,
}

impl GameContent {
    pub fn question_count(&self) -> usize {
        self.categories.iter().map(|c| c.questions.len()).sum()
    }

    /// Look up a single question by its board coordinates
    pub fn question(&self, category: usize, question: usize) -> Option<&Question> {
        self.categories
            .get(category)
            .and_then(|c| c.questions.get(question))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameStyling {
    pub board_color: String,
    pub category_color: String,
    pub question_color: String,
    pub text_color: String,
    pub font_family: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_image: Option<String>,
}

impl Default for GameStyling {
    fn default() -> Self {
        Self {
            board_color: "#1E3A8A".to_string(),
            category_color: "#1D4ED8".to_string(),
            question_color: "#2563EB".to_string(),
            text_color: "#FFFFFF".to_string(),
            font_family: "Inter".to_string(),
            background_image: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Game {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub content: Json<GameContent>,
    pub styling: Json<GameStyling>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Listing view of a game without its full board
#[derive(Debug, Clone, Serialize)]
pub struct GameSummary {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub category_count: usize,
    pub question_count: usize,
    pub updated_at: DateTime<Utc>,
}

impl From<&Game> for GameSummary {
    fn from(game: &Game) -> Self {
        Self {
            id: game.id,
            title: game.title.clone(),
            description: game.description.clone(),
            category_count: game.content.categories.len(),
            question_count: game.content.question_count(),
            updated_at: game.updated_at,
        }
    }
}
