use crate::models::{GameContent, GameStyling, Question};

pub const MAX_CATEGORIES: usize = 6;
pub const MAX_QUESTIONS_PER_CATEGORY: usize = 5;
pub const MAX_TITLE_LEN: usize = 120;
pub const MAX_CATEGORY_NAME_LEN: usize = 60;
pub const MAX_QUESTION_VALUE: i32 = 10_000;
pub const TIMER_RANGE_SECONDS: std::ops::RangeInclusive<u32> = 5..=300;

/// Checks board content against the editor's limits.
///
/// Every problem is collected so the editor can highlight all of them at
/// once. Categories and questions are numbered from 1 in the messages.
pub struct BoardValidator {
    errors: Vec<String>,
}

impl BoardValidator {
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    /// Validate a game or template in one call
    pub fn check(title: &str, content: &GameContent, styling: &GameStyling) -> Result<(), Vec<String>> {
        let mut validator = Self::new();
        validator.title(title);
        validator.content(content);
        validator.styling(styling);
        validator.finish()
    }

    pub fn title(&mut self, title: &str) -> &mut Self {
        let title = title.trim();
        if title.is_empty() {
            self.errors.push("Title is required".to_string());
        } else if title.chars().count() > MAX_TITLE_LEN {
            self.errors
                .push(format!("Title must be at most {} characters", MAX_TITLE_LEN));
        }
        self
    }

    pub fn content(&mut self, content: &GameContent) -> &mut Self {
        let count = content.categories.len();
        if count == 0 {
            self.errors.push("Add at least one category".to_string());
        } else if count > MAX_CATEGORIES {
            self.errors
                .push(format!("A game can have at most {} categories", MAX_CATEGORIES));
        }

        for (c_idx, category) in content.categories.iter().enumerate() {
            let c_num = c_idx + 1;
            let name = category.name.trim();
            if name.is_empty() {
                self.errors.push(format!("Category {} needs a name", c_num));
            } else if name.chars().count() > MAX_CATEGORY_NAME_LEN {
                self.errors.push(format!(
                    "Category {} name must be at most {} characters",
                    c_num, MAX_CATEGORY_NAME_LEN
                ));
            }

            if category.questions.len() > MAX_QUESTIONS_PER_CATEGORY {
                self.errors.push(format!(
                    "Category {} can have at most {} questions",
                    c_num, MAX_QUESTIONS_PER_CATEGORY
                ));
            }

            for (q_idx, question) in category.questions.iter().enumerate() {
                self.question(c_num, q_idx + 1, question);
            }
        }
        self
    }

    fn question(&mut self, c_num: usize, q_num: usize, question: &Question) {
        let at = format!("Category {}, question {}", c_num, q_num);

        if question.text.trim().is_empty() {
            self.errors.push(format!("{}: question text is required", at));
        }
        if question.answer.trim().is_empty() {
            self.errors.push(format!("{}: answer is required", at));
        }
        if !(1..=MAX_QUESTION_VALUE).contains(&question.value) {
            self.errors.push(format!(
                "{}: value must be between 1 and {}",
                at, MAX_QUESTION_VALUE
            ));
        }
        if let Some(seconds) = question.timer_seconds {
            if !TIMER_RANGE_SECONDS.contains(&seconds) {
                self.errors.push(format!(
                    "{}: timer must be between {} and {} seconds",
                    at,
                    TIMER_RANGE_SECONDS.start(),
                    TIMER_RANGE_SECONDS.end()
                ));
            }
        }
        if let Some(media) = &question.media {
            if !is_http_url(&media.url) {
                self.errors
                    .push(format!("{}: media URL must start with http:// or https://", at));
            }
        }
    }

    pub fn styling(&mut self, styling: &GameStyling) -> &mut Self {
        let colors = [
            ("board_color", &styling.board_color),
            ("category_color", &styling.category_color),
            ("question_color", &styling.question_color),
            ("text_color", &styling.text_color),
        ];
        for (field, value) in colors {
            if !is_hex_color(value) {
                self.errors
                    .push(format!("{} must be a hex color like #1E3A8A", field));
            }
        }
        if styling.font_family.trim().is_empty() {
            self.errors.push("font_family is required".to_string());
        }
        if let Some(url) = &styling.background_image {
            if !is_http_url(url) {
                self.errors
                    .push("background_image must start with http:// or https://".to_string());
            }
        }
        self
    }

    pub fn finish(self) -> Result<(), Vec<String>> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }
}

impl Default for BoardValidator {
    fn default() -> Self {
        Self::new()
    }
}

/// `#RGB` or `#RRGGBB`
pub fn is_hex_color(value: &str) -> bool {
    match value.strip_prefix('#') {
        Some(hex) => (hex.len() == 3 || hex.len() == 6) && hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("https://") || url.starts_with("http://")
}
