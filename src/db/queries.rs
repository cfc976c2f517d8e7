use chrono::{DateTime, Utc};
use sqlx::{types::Json, PgPool, Result};
use uuid::Uuid;

use crate::{
    game::MarketplaceQuery,
    models::{
        DashboardCounts, Game, GameContent, GameStyling, MarketplaceListing, NewsletterSubscriber,
        PasswordReset, Referral, ReferralLink, ReferredUser, Template, User, REFERRAL_TICKET_REWARD,
    },
};

// User queries
pub async fn get_user(pool: &PgPool, user_id: Uuid) -> Result<Option<User>> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await
}

pub async fn get_user_by_email(pool: &PgPool, email: &str) -> Result<Option<User>> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = LOWER($1)")
        .bind(email)
        .fetch_optional(pool)
        .await
}

/// Insert a new account. Duplicate emails or usernames fail with a unique
/// violation on `users_email_key` / `users_username_key`.
pub async fn create_user(
    pool: &PgPool,
    email: &str,
    username: &str,
    password_hash: &str,
    display_name: Option<&str>,
) -> Result<User> {
    sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (id, email, username, password_hash, display_name)
        VALUES ($1, LOWER($2), $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(email)
    .bind(username)
    .bind(password_hash)
    .bind(display_name)
    .fetch_one(pool)
    .await
}

pub async fn update_password(pool: &PgPool, user_id: Uuid, password_hash: &str) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE users
        SET password_hash = $1,
            updated_at = NOW()
        WHERE id = $2
        "#,
    )
    .bind(password_hash)
    .bind(user_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Update the fields that were provided, leaving the others untouched
pub async fn update_profile(
    pool: &PgPool,
    user_id: Uuid,
    username: Option<&str>,
    display_name: Option<&str>,
) -> Result<Option<User>> {
    sqlx::query_as::<_, User>(
        r#"
        UPDATE users
        SET username = COALESCE($1, username),
            display_name = COALESCE($2, display_name),
            updated_at = NOW()
        WHERE id = $3
        RETURNING *
        "#,
    )
    .bind(username)
    .bind(display_name)
    .bind(user_id)
    .fetch_optional(pool)
    .await
}

/// Delete an account; games, templates and referrals cascade
pub async fn delete_user(pool: &PgPool, user_id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn get_dashboard_counts(pool: &PgPool, user_id: Uuid) -> Result<DashboardCounts> {
    sqlx::query_as::<_, DashboardCounts>(
        r#"
        SELECT
            (SELECT COUNT(*) FROM games WHERE user_id = $1) AS games,
            (SELECT COUNT(*) FROM templates WHERE user_id = $1) AS templates,
            (SELECT COUNT(*) FROM templates WHERE user_id = $1 AND is_public) AS public_templates,
            (SELECT COALESCE(SUM(downloads), 0)::BIGINT FROM templates WHERE user_id = $1) AS downloads_received,
            (SELECT COUNT(*) FROM referrals WHERE referrer_id = $1) AS referrals
        "#,
    )
    .bind(user_id)
    .fetch_one(pool)
    .await
}

// Password reset queries
pub async fn create_password_reset(
    pool: &PgPool,
    user_id: Uuid,
    token: &str,
    expires_at: DateTime<Utc>,
) -> Result<PasswordReset> {
    sqlx::query_as::<_, PasswordReset>(
        r#"
        INSERT INTO password_resets (token, user_id, expires_at)
        VALUES ($1, $2, $3)
        RETURNING *
        "#,
    )
    .bind(token)
    .bind(user_id)
    .bind(expires_at)
    .fetch_one(pool)
    .await
}

/// Redeem a reset token and set the new password hash in one transaction.
///
/// The token row is locked, checked with [`PasswordReset::is_usable`] and
/// marked used, so a token can succeed at most once even under concurrent
/// requests. Returns the user id, or `None` when the token is unknown,
/// expired or already used.
pub async fn redeem_password_reset(
    pool: &PgPool,
    token: &str,
    password_hash: &str,
) -> Result<Option<Uuid>> {
    let mut tx = pool.begin().await?;

    let reset = sqlx::query_as::<_, PasswordReset>(
        "SELECT * FROM password_resets WHERE token = $1 FOR UPDATE",
    )
    .bind(token)
    .fetch_optional(&mut *tx)
    .await?;

    let reset = match reset {
        Some(r) if r.is_usable(Utc::now()) => r,
        _ => return Ok(None),
    };

    sqlx::query("UPDATE password_resets SET used_at = NOW() WHERE token = $1")
        .bind(token)
        .execute(&mut *tx)
        .await?;

    sqlx::query("UPDATE users SET password_hash = $1, updated_at = NOW() WHERE id = $2")
        .bind(password_hash)
        .bind(reset.user_id)
        .execute(&mut *tx)
        .await?;

    // Any other outstanding links for this account stop working
    sqlx::query(
        "UPDATE password_resets SET used_at = NOW() WHERE user_id = $1 AND used_at IS NULL",
    )
    .bind(reset.user_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(Some(reset.user_id))
}

// Game queries
pub async fn list_games(pool: &PgPool, user_id: Uuid) -> Result<Vec<Game>> {
    sqlx::query_as::<_, Game>(
        "SELECT * FROM games WHERE user_id = $1 ORDER BY updated_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
}

pub async fn list_recent_games(pool: &PgPool, user_id: Uuid, limit: i64) -> Result<Vec<Game>> {
    sqlx::query_as::<_, Game>(
        "SELECT * FROM games WHERE user_id = $1 ORDER BY updated_at DESC LIMIT $2",
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await
}

/// Fetch a game owned by `user_id`
pub async fn get_game(pool: &PgPool, game_id: Uuid, user_id: Uuid) -> Result<Option<Game>> {
    sqlx::query_as::<_, Game>("SELECT * FROM games WHERE id = $1 AND user_id = $2")
        .bind(game_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
}

pub async fn create_game(
    pool: &PgPool,
    user_id: Uuid,
    title: &str,
    description: Option<&str>,
    content: &GameContent,
    styling: &GameStyling,
) -> Result<Game> {
    sqlx::query_as::<_, Game>(
        r#"
        INSERT INTO games (id, user_id, title, description, content, styling)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(title)
    .bind(description)
    .bind(Json(content))
    .bind(Json(styling))
    .fetch_one(pool)
    .await
}

pub async fn update_game(
    pool: &PgPool,
    game_id: Uuid,
    user_id: Uuid,
    title: &str,
    description: Option<&str>,
    content: &GameContent,
    styling: &GameStyling,
) -> Result<Option<Game>> {
    sqlx::query_as::<_, Game>(
        r#"
        UPDATE games
        SET title = $1,
            description = $2,
            content = $3,
            styling = $4,
            updated_at = NOW()
        WHERE id = $5 AND user_id = $6
        RETURNING *
        "#,
    )
    .bind(title)
    .bind(description)
    .bind(Json(content))
    .bind(Json(styling))
    .bind(game_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
}

pub async fn delete_game(pool: &PgPool, game_id: Uuid, user_id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM games WHERE id = $1 AND user_id = $2")
        .bind(game_id)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

// Template queries
pub async fn list_templates(pool: &PgPool, user_id: Uuid) -> Result<Vec<Template>> {
    sqlx::query_as::<_, Template>(
        "SELECT * FROM templates WHERE user_id = $1 ORDER BY updated_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
}

pub async fn get_template(pool: &PgPool, template_id: Uuid) -> Result<Option<Template>> {
    sqlx::query_as::<_, Template>("SELECT * FROM templates WHERE id = $1")
        .bind(template_id)
        .fetch_optional(pool)
        .await
}

pub async fn create_template(
    pool: &PgPool,
    user_id: Uuid,
    title: &str,
    description: Option<&str>,
    subject: Option<&str>,
    tags: Vec<String>,
    content: &GameContent,
    styling: &GameStyling,
) -> Result<Template> {
    sqlx::query_as::<_, Template>(
        r#"
        INSERT INTO templates (id, user_id, title, description, subject, tags, content, styling)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(title)
    .bind(description)
    .bind(subject)
    .bind(tags)
    .bind(Json(content))
    .bind(Json(styling))
    .fetch_one(pool)
    .await
}

pub async fn update_template(
    pool: &PgPool,
    template_id: Uuid,
    user_id: Uuid,
    title: &str,
    description: Option<&str>,
    subject: Option<&str>,
    tags: Vec<String>,
    content: &GameContent,
    styling: &GameStyling,
) -> Result<Option<Template>> {
    sqlx::query_as::<_, Template>(
        r#"
        UPDATE templates
        SET title = $1,
            description = $2,
            subject = $3,
            tags = $4,
            content = $5,
            styling = $6,
            updated_at = NOW()
        WHERE id = $7 AND user_id = $8
        RETURNING *
        "#,
    )
    .bind(title)
    .bind(description)
    .bind(subject)
    .bind(tags)
    .bind(Json(content))
    .bind(Json(styling))
    .bind(template_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
}

pub async fn delete_template(pool: &PgPool, template_id: Uuid, user_id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM templates WHERE id = $1 AND user_id = $2")
        .bind(template_id)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Share or unshare a template in the marketplace
pub async fn set_template_public(
    pool: &PgPool,
    template_id: Uuid,
    user_id: Uuid,
    is_public: bool,
) -> Result<Option<Template>> {
    sqlx::query_as::<_, Template>(
        r#"
        UPDATE templates
        SET is_public = $1,
            updated_at = NOW()
        WHERE id = $2 AND user_id = $3
        RETURNING *
        "#,
    )
    .bind(is_public)
    .bind(template_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
}

// Marketplace queries
const MARKETPLACE_FILTER: &str = r#"
    WHERE t.is_public
      AND ($1::TEXT IS NULL
           OR t.title ILIKE $1
           OR COALESCE(t.description, '') ILIKE $1
           OR COALESCE(t.subject, '') ILIKE $1
           OR EXISTS (SELECT 1 FROM UNNEST(t.tags) AS tag WHERE tag ILIKE $1))
      AND ($2::TEXT IS NULL OR LOWER(t.subject) = LOWER($2))
      AND ($3::TEXT IS NULL OR $3 = ANY(t.tags))
"#;

/// One page of public templates matching the query
pub async fn list_marketplace(
    pool: &PgPool,
    query: &MarketplaceQuery,
) -> Result<Vec<MarketplaceListing>> {
    let sql = format!(
        r#"
        SELECT t.id, t.title, t.description, t.subject, t.tags, t.downloads,
               COALESCE(u.display_name, u.username) AS author, t.created_at
        FROM templates t
        JOIN users u ON u.id = t.user_id
        {}
        ORDER BY {}
        LIMIT $4 OFFSET $5
        "#,
        MARKETPLACE_FILTER,
        query.sort.order_by()
    );

    sqlx::query_as::<_, MarketplaceListing>(&sql)
        .bind(query.pattern.as_deref())
        .bind(query.subject.as_deref())
        .bind(query.tag.as_deref())
        .bind(query.limit)
        .bind(query.offset)
        .fetch_all(pool)
        .await
}

pub async fn count_marketplace(pool: &PgPool, query: &MarketplaceQuery) -> Result<i64> {
    let sql = format!("SELECT COUNT(*) FROM templates t {}", MARKETPLACE_FILTER);

    sqlx::query_scalar::<_, i64>(&sql)
        .bind(query.pattern.as_deref())
        .bind(query.subject.as_deref())
        .bind(query.tag.as_deref())
        .fetch_one(pool)
        .await
}

/// Record that a user downloaded a template.
///
/// The join row is idempotent; the template's counter only moves on a
/// user's first download. Returns true if this was a new download.
pub async fn record_template_download(
    pool: &PgPool,
    user_id: Uuid,
    template_id: Uuid,
) -> Result<bool> {
    let mut tx = pool.begin().await?;

    let inserted = sqlx::query(
        r#"
        INSERT INTO template_downloads (user_id, template_id)
        VALUES ($1, $2)
        ON CONFLICT (user_id, template_id) DO NOTHING
        "#,
    )
    .bind(user_id)
    .bind(template_id)
    .execute(&mut *tx)
    .await?
    .rows_affected()
        > 0;

    if inserted {
        sqlx::query("UPDATE templates SET downloads = downloads + 1 WHERE id = $1")
            .bind(template_id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(inserted)
}

pub async fn has_downloaded_template(
    pool: &PgPool,
    user_id: Uuid,
    template_id: Uuid,
) -> Result<bool> {
    sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM template_downloads WHERE user_id = $1 AND template_id = $2)",
    )
    .bind(user_id)
    .bind(template_id)
    .fetch_one(pool)
    .await
}

pub async fn list_downloaded_templates(pool: &PgPool, user_id: Uuid) -> Result<Vec<Template>> {
    sqlx::query_as::<_, Template>(
        r#"
        SELECT t.*
        FROM template_downloads d
        JOIN templates t ON t.id = d.template_id
        WHERE d.user_id = $1
        ORDER BY d.downloaded_at DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
}

// Referral queries
/// Return the user's referral link, creating it with `code` if missing
pub async fn get_or_create_referral_link(
    pool: &PgPool,
    user_id: Uuid,
    code: &str,
) -> Result<ReferralLink> {
    sqlx::query_as::<_, ReferralLink>(
        r#"
        INSERT INTO referral_links (code, user_id)
        VALUES ($1, $2)
        ON CONFLICT (user_id) DO UPDATE SET user_id = EXCLUDED.user_id
        RETURNING *
        "#,
    )
    .bind(code)
    .bind(user_id)
    .fetch_one(pool)
    .await
}

pub async fn get_referral_link(pool: &PgPool, code: &str) -> Result<Option<ReferralLink>> {
    sqlx::query_as::<_, ReferralLink>("SELECT * FROM referral_links WHERE code = UPPER($1)")
        .bind(code)
        .fetch_optional(pool)
        .await
}

pub async fn increment_referral_clicks(pool: &PgPool, code: &str) -> Result<bool> {
    let result = sqlx::query("UPDATE referral_links SET clicks = clicks + 1 WHERE code = UPPER($1)")
        .bind(code)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Link a new user to their referrer and award the referrer raffle tickets
pub async fn record_referral(
    pool: &PgPool,
    referrer_id: Uuid,
    referred_id: Uuid,
) -> Result<Referral> {
    let mut tx = pool.begin().await?;

    let referral = sqlx::query_as::<_, Referral>(
        r#"
        INSERT INTO referrals (id, referrer_id, referred_id)
        VALUES ($1, $2, $3)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(referrer_id)
    .bind(referred_id)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query("UPDATE users SET referred_by = $1, updated_at = NOW() WHERE id = $2")
        .bind(referrer_id)
        .bind(referred_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        "UPDATE users SET raffle_tickets = raffle_tickets + $1, updated_at = NOW() WHERE id = $2",
    )
    .bind(REFERRAL_TICKET_REWARD)
    .bind(referrer_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(referral)
}

pub async fn list_referrals(pool: &PgPool, referrer_id: Uuid) -> Result<Vec<ReferredUser>> {
    sqlx::query_as::<_, ReferredUser>(
        r#"
        SELECT u.username, r.created_at
        FROM referrals r
        JOIN users u ON u.id = r.referred_id
        WHERE r.referrer_id = $1
        ORDER BY r.created_at DESC
        "#,
    )
    .bind(referrer_id)
    .fetch_all(pool)
    .await
}

// Newsletter queries
/// Subscribe an address; an earlier unsubscribe is undone
pub async fn subscribe_newsletter(pool: &PgPool, email: &str) -> Result<NewsletterSubscriber> {
    sqlx::query_as::<_, NewsletterSubscriber>(
        r#"
        INSERT INTO newsletter_subscribers (email)
        VALUES (LOWER($1))
        ON CONFLICT (email) DO UPDATE SET
            subscribed_at = CASE
                WHEN newsletter_subscribers.unsubscribed_at IS NULL
                    THEN newsletter_subscribers.subscribed_at
                ELSE NOW()
            END,
            unsubscribed_at = NULL
        RETURNING *
        "#,
    )
    .bind(email)
    .fetch_one(pool)
    .await
}

pub async fn unsubscribe_newsletter(pool: &PgPool, email: &str) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE newsletter_subscribers
        SET unsubscribed_at = NOW()
        WHERE email = LOWER($1) AND unsubscribed_at IS NULL
        "#,
    )
    .bind(email)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}
