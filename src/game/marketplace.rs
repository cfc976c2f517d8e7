use serde::Deserialize;

pub const DEFAULT_PER_PAGE: u32 = 12;
pub const MAX_PER_PAGE: u32 = 50;
const MAX_QUERY_LEN: usize = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Newest,
    Popular,
    Title,
}

impl SortOrder {
    /// ORDER BY clause for the marketplace listing query
    pub fn order_by(self) -> &'static str {
        match self {
            SortOrder::Newest => "t.created_at DESC, t.id",
            SortOrder::Popular => "t.downloads DESC, t.created_at DESC, t.id",
            SortOrder::Title => "LOWER(t.title) ASC, t.id",
        }
    }
}

/// Raw query string of `GET /api/marketplace`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MarketplaceParams {
    pub q: Option<String>,
    pub subject: Option<String>,
    pub tag: Option<String>,
    #[serde(default)]
    pub sort: SortOrder,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// Marketplace search with blank filters dropped and paging clamped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketplaceQuery {
    /// `ILIKE` pattern over title, description, subject and tags
    pub pattern: Option<String>,
    pub subject: Option<String>,
    pub tag: Option<String>,
    pub sort: SortOrder,
    pub limit: i64,
    pub offset: i64,
    pub page: u32,
}

impl MarketplaceQuery {
    pub fn from_params(params: MarketplaceParams) -> Self {
        let page = params.page.unwrap_or(1).max(1);
        let per_page = params
            .per_page
            .unwrap_or(DEFAULT_PER_PAGE)
            .clamp(1, MAX_PER_PAGE);

        let pattern = non_blank(params.q).map(|q| {
            let q: String = q.chars().take(MAX_QUERY_LEN).collect();
            format!("%{}%", escape_like(&q))
        });

        Self {
            pattern,
            subject: non_blank(params.subject),
            tag: non_blank(params.tag).map(|t| t.to_lowercase()),
            sort: params.sort,
            limit: per_page as i64,
            offset: (page as i64 - 1) * per_page as i64,
            page,
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Escape `%`, `_` and `\` so user input matches literally
fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Tags are stored trimmed, lowercased and without duplicates
pub fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim().to_lowercase();
        if !tag.is_empty() && !normalized.contains(&tag) {
            normalized.push(tag);
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let query = MarketplaceQuery::from_params(MarketplaceParams::default());
        assert_eq!(query.pattern, None);
        assert_eq!(query.sort, SortOrder::Newest);
        assert_eq!(query.limit, 12);
        assert_eq!(query.offset, 0);
        assert_eq!(query.page, 1);
    }

    #[test]
    fn test_paging_is_clamped() {
        let query = MarketplaceQuery::from_params(MarketplaceParams {
            page: Some(0),
            per_page: Some(500),
            ..Default::default()
        });
        assert_eq!(query.page, 1);
        assert_eq!(query.limit, 50);

        let query = MarketplaceQuery::from_params(MarketplaceParams {
            page: Some(3),
            per_page: Some(10),
            ..Default::default()
        });
        assert_eq!(query.offset, 20);
    }

    #[test]
    fn test_search_pattern_escapes_wildcards() {
        let query = MarketplaceQuery::from_params(MarketplaceParams {
            q: Some("  100%_done ".to_string()),
            ..Default::default()
        });
        assert_eq!(query.pattern.as_deref(), Some("%100\\%\\_done%"));
    }

    #[test]
    fn test_blank_filters_are_dropped() {
        let query = MarketplaceQuery::from_params(MarketplaceParams {
            q: Some("   ".to_string()),
            subject: Some("".to_string()),
            tag: Some(" Fractions ".to_string()),
            ..Default::default()
        });
        assert_eq!(query.pattern, None);
        assert_eq!(query.subject, None);
        assert_eq!(query.tag.as_deref(), Some("fractions"));
    }

    #[test]
    fn test_sort_deserialization() {
        let params: MarketplaceParams =
            serde_urlencoded::from_str("sort=popular&q=math").unwrap();
        assert_eq!(params.sort, SortOrder::Popular);
        assert_eq!(params.q.as_deref(), Some("math"));
    }

    #[test]
    fn test_normalize_tags() {
        let tags = normalize_tags(vec![
            " Math ".to_string(),
            "math".to_string(),
            "".to_string(),
            "Grade 4".to_string(),
        ]);
        assert_eq!(tags, vec!["math".to_string(), "grade 4".to_string()]);
    }
}
