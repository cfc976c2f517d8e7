use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64_URL, Engine};
use jsonwebtoken::{decode, DecodingKey, Validation};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::{config::SecurityConfig, error::AppError, AppState};

/// Name of the cookie carrying the session JWT
pub const AUTH_COOKIE: &str = "token";
/// Allowed characters for referral codes - excludes I, O, 0, 1 for readability
pub const REFERRAL_CODE_CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
/// Length of generated referral codes
pub const REFERRAL_CODE_LENGTH: usize = 8;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,      // User ID
    pub username: String, // Username
    pub exp: usize,       // Expiration time
}

#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub username: String,
}

/// Extractor for authenticated users from JWT tokens
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
    Arc<AppState>: FromRef<S>,
{
    type Rejection = AppError;

    fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        let app_state = Arc::<AppState>::from_ref(state);
        let token = token_from_parts(parts);

        async move {
            let token = token.ok_or_else(|| {
                AppError::Unauthorized("Please sign in to continue".to_string())
            })?;
            decode_token(&token, &app_state.config.security.jwt_secret)
        }
    }
}

/// Token from the Authorization header, then the auth cookie, then the
/// `token` query parameter (used by WebSocket upgrades)
fn token_from_parts(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(String::from)
        .or_else(|| {
            CookieJar::from_headers(&parts.headers)
                .get(AUTH_COOKIE)
                .map(|c| c.value().to_string())
        })
        .or_else(|| {
            parts
                .uri
                .query()
                .and_then(|q| serde_urlencoded::from_str::<Vec<(String, String)>>(q).ok())
                .and_then(|params| {
                    params
                        .into_iter()
                        .find(|(k, _)| k == "token")
                        .map(|(_, v)| v)
                })
        })
}

/// Validate a JWT and return the user it was issued to
pub fn decode_token(token: &str, jwt_secret: &str) -> Result<AuthenticatedUser, AppError> {
    let invalid = || AppError::Unauthorized("Your session has expired, please sign in again".to_string());

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt_secret.as_ref()),
        &Validation::default(),
    )
    .map_err(|_| invalid())?;

    let user_id = token_data.claims.sub.parse::<Uuid>().map_err(|_| invalid())?;

    Ok(AuthenticatedUser {
        user_id,
        username: token_data.claims.username,
    })
}

/// Generate a JWT token for a user
pub fn generate_token(
    user_id: Uuid,
    username: &str,
    jwt_secret: &str,
    ttl_hours: i64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let expiration = (chrono::Utc::now() + chrono::Duration::hours(ttl_hours)).timestamp();

    let claims = Claims {
        sub: user_id.to_string(),
        username: username.to_string(),
        exp: expiration.max(0) as usize,
    };

    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(jwt_secret.as_ref()),
    )
}

/// Session cookie holding the JWT
pub fn auth_cookie(token: String, security: &SecurityConfig) -> Cookie<'static> {
    Cookie::build((AUTH_COOKIE, token))
        .path("/")
        .http_only(true)
        .secure(security.cookie_secure)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::hours(security.jwt_ttl_hours))
        .build()
}

/// Cookie that matches `auth_cookie` for removal
pub fn removal_cookie() -> Cookie<'static> {
    Cookie::build(AUTH_COOKIE).path("/").build()
}

/// Hash a password with bcrypt off the async runtime
pub async fn hash_password(password: String, cost: u32) -> anyhow::Result<String> {
    let hash = tokio::task::spawn_blocking(move || bcrypt::hash(password, cost)).await??;
    Ok(hash)
}

/// Compare a password against a stored bcrypt hash
pub async fn verify_password(password: String, hash: String) -> anyhow::Result<bool> {
    let matches = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash)).await??;
    Ok(matches)
}

/// Random, URL-safe password reset token (32 bytes of entropy)
pub fn generate_reset_token() -> String {
    let bytes: [u8; 32] = rand::random();
    BASE64_URL.encode(bytes)
}

/// Generate a short, readable referral code
pub fn generate_referral_code() -> String {
    generate_code(REFERRAL_CODE_LENGTH)
}

/// Random code drawn from `REFERRAL_CODE_CHARSET`
pub fn generate_code(length: usize) -> String {
    let mut rng = rand::rng();
    (0..length)
        .map(|_| {
            let idx = rng.random_range(0..REFERRAL_CODE_CHARSET.len());
            REFERRAL_CODE_CHARSET[idx] as char
        })
        .collect()
}
