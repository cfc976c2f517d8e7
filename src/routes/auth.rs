use crate::{
    auth,
    db,
    error::{AppError, Result},
    models::{User, UserProfile},
    AppState,
};
use axum::{extract::State, http::StatusCode, Json};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use std::{borrow::Cow, sync::Arc};
use validator::{Validate, ValidationError};

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "Enter a valid email address"))]
    pub email: String,
    #[validate(custom(function = "validate_username"))]
    pub username: String,
    #[validate(length(min = 8, max = 128, message = "Password must be between 8 and 128 characters"))]
    pub password: String,
    #[validate(length(min = 1, max = 64, message = "Display name must be 1 to 64 characters"))]
    pub display_name: Option<String>,
    /// Code from a referral link, if the user arrived through one
    pub referral_code: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Email is required"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    #[validate(length(min = 8, max = 128, message = "Password must be between 8 and 128 characters"))]
    pub new_password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ForgotPasswordRequest {
    #[validate(email(message = "Enter a valid email address"))]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResetPasswordRequest {
    #[validate(length(min = 1, message = "Reset token is required"))]
    pub token: String,
    #[validate(length(min = 8, max = 128, message = "Password must be between 8 and 128 characters"))]
    pub new_password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    /// JWT for the Authorization header; also set as the auth cookie
    pub token: String,
    pub user: UserProfile,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

/// 3 to 32 characters: letters, digits and underscores
pub fn validate_username(username: &str) -> std::result::Result<(), ValidationError> {
    let len = username.chars().count();
    let valid_chars = username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_');

    if (3..=32).contains(&len) && valid_chars {
        Ok(())
    } else {
        let mut error = ValidationError::new("username");
        error.message = Some(Cow::Borrowed(
            "Username must be 3 to 32 characters of letters, numbers or underscores",
        ));
        Err(error)
    }
}

/// Create an account, credit the referrer if any, and sign the user in
pub async fn register(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, CookieJar, Json<AuthResponse>)> {
    payload.validate()?;

    let email = payload.email.trim().to_lowercase();
    tracing::info!("Registering new account for {}", email);

    let password_hash =
        auth::hash_password(payload.password, state.config.security.bcrypt_cost).await?;

    let display_name = payload
        .display_name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty());

    let user = db::queries::create_user(
        &state.db,
        &email,
        &payload.username,
        &password_hash,
        display_name,
    )
    .await?;

    if let Some(code) = payload.referral_code.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        credit_referral(&state, code, user.id).await;
    }

    tracing::info!(
        "Successfully registered user: {} (ID: {})",
        user.username,
        user.id
    );

    let (jar, response) = sign_in(&state, jar, user.to_profile())?;
    Ok((StatusCode::CREATED, jar, Json(response)))
}

/// Record a referral; failures never block the signup
async fn credit_referral(state: &AppState, code: &str, new_user_id: uuid::Uuid) {
    let link = match db::queries::get_referral_link(&state.db, code).await {
        Ok(Some(link)) => link,
        Ok(None) => {
            tracing::warn!("Ignoring unknown referral code {}", code);
            return;
        }
        Err(e) => {
            tracing::error!("Failed to look up referral code {}: {}", code, e);
            return;
        }
    };

    if link.user_id == new_user_id {
        return;
    }

    match db::queries::record_referral(&state.db, link.user_id, new_user_id).await {
        Ok(referral) => tracing::info!(
            "User {} referred by {} via code {} (referral {})",
            new_user_id,
            link.user_id,
            code,
            referral.id
        ),
        Err(e) => tracing::error!("Failed to record referral for {}: {}", new_user_id, e),
    }
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(payload): Json<LoginRequest>,
) -> Result<(CookieJar, Json<AuthResponse>)> {
    payload.validate()?;

    let invalid = || AppError::Unauthorized("Invalid email or password".to_string());

    let user = db::queries::get_user_by_email(&state.db, payload.email.trim()).await?;

    // Unknown emails pay for a bcrypt check too, so timing does not reveal accounts
    let hash = user
        .as_ref()
        .map_or_else(|| state.dummy_password_hash.clone(), |u| u.password_hash.clone());
    let matches = auth::verify_password(payload.password, hash).await?;

    let user = match user {
        Some(user) if matches => user,
        Some(user) => {
            tracing::info!("Failed login for user {}", user.id);
            return Err(invalid());
        }
        None => {
            tracing::debug!("Login attempt for unknown email");
            return Err(invalid());
        }
    };

    tracing::info!("User logged in: {} ({})", user.username, user.id);
    let (jar, response) = sign_in(&state, jar, user.to_profile())?;
    Ok((jar, Json(response)))
}

/// Issue a JWT and attach it as the auth cookie
fn sign_in(
    state: &AppState,
    jar: CookieJar,
    user: UserProfile,
) -> Result<(CookieJar, AuthResponse)> {
    let security = &state.config.security;
    let token = auth::generate_token(
        user.id,
        &user.username,
        &security.jwt_secret,
        security.jwt_ttl_hours,
    )
    .map_err(|e| {
        tracing::error!("Failed to generate JWT token: {}", e);
        AppError::Internal(anyhow::anyhow!("token generation failed: {}", e))
    })?;

    let jar = jar.add(auth::auth_cookie(token.clone(), security));
    Ok((jar, AuthResponse { token, user }))
}

/// Get current user info from database
pub async fn get_current_user(
    user: auth::AuthenticatedUser,
    State(state): State<Arc<AppState>>,
) -> Result<Json<UserProfile>> {
    tracing::debug!(
        "Getting user info for authenticated user: {} ({})",
        user.username,
        user.user_id
    );

    let db_user = db::queries::get_user(&state.db, user.user_id)
        .await?
        .ok_or_else(|| {
            tracing::warn!("User not found in database: {}", user.user_id);
            AppError::NotFound("User")
        })?;

    Ok(Json(db_user.to_profile()))
}

pub async fn change_password(
    user: auth::AuthenticatedUser,
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<StatusCode> {
    payload.validate()?;

    let db_user = db::queries::get_user(&state.db, user.user_id)
        .await?
        .ok_or(AppError::NotFound("User"))?;

    if !auth::verify_password(payload.current_password, db_user.password_hash).await? {
        return Err(AppError::Unauthorized(
            "Current password is incorrect".to_string(),
        ));
    }

    let password_hash =
        auth::hash_password(payload.new_password, state.config.security.bcrypt_cost).await?;
    db::queries::update_password(&state.db, user.user_id, &password_hash).await?;

    tracing::info!("Password changed for user {} ({})", user.username, user.user_id);
    Ok(StatusCode::NO_CONTENT)
}

/// Start a password reset.
///
/// Always answers 202 so the endpoint cannot be used to discover which
/// emails have accounts.
pub async fn forgot_password(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Result<(StatusCode, Json<MessageResponse>)> {
    payload.validate()?;

    let accepted = (
        StatusCode::ACCEPTED,
        Json(MessageResponse {
            message: "If an account exists for that email, a reset link is on its way",
        }),
    );

    let Some(user) = db::queries::get_user_by_email(&state.db, payload.email.trim()).await? else {
        tracing::debug!("Password reset requested for unknown email");
        return Ok(accepted);
    };

    send_reset_link(&state, &user).await;
    Ok(accepted)
}

/// Store a reset token and mail the link. Failures are only logged so the
/// caller answers the same way for every email.
async fn send_reset_link(state: &AppState, user: &User) {
    let token = auth::generate_reset_token();
    let expires_at = chrono::Utc::now()
        + chrono::Duration::minutes(state.config.security.reset_token_ttl_minutes);

    if let Err(e) = db::queries::create_password_reset(&state.db, user.id, &token, expires_at).await
    {
        tracing::error!("Failed to store password reset for user {}: {}", user.id, e);
        return;
    }

    let reset_url = state.config.reset_password_url(&token);
    if let Err(e) = state.mailer.send_password_reset(&user.email, &reset_url).await {
        tracing::error!("Failed to send password reset email to user {}: {}", user.id, e);
    } else {
        tracing::info!("Password reset link issued for user {}", user.id);
    }
}

/// Set a new password with a one-time reset token
pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<StatusCode> {
    payload.validate()?;

    let password_hash =
        auth::hash_password(payload.new_password, state.config.security.bcrypt_cost).await?;

    let user_id = db::queries::redeem_password_reset(&state.db, payload.token.trim(), &password_hash)
        .await?
        .ok_or_else(|| {
            AppError::BadRequest("Reset link is invalid or has expired".to_string())
        })?;

    tracing::info!("Password reset completed for user {}", user_id);
    Ok(StatusCode::NO_CONTENT)
}

/// Clear the auth cookie
pub async fn logout(jar: CookieJar) -> (CookieJar, StatusCode) {
    (jar.remove(auth::removal_cookie()), StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_request_deserialization() {
        let json = r#"{"email": "a@b.co", "username": "teacher_1", "password": "hunter22!"}"#;
        let request: RegisterRequest = serde_json::from_str(json).unwrap();

        assert_eq!(request.email, "a@b.co");
        assert!(request.display_name.is_none());
        assert!(request.referral_code.is_none());
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_register_validation_collects_all_problems() {
        let request = RegisterRequest {
            email: "not-an-email".to_string(),
            username: "x".to_string(),
            password: "short".to_string(),
            display_name: None,
            referral_code: None,
        };

        let err: AppError = request.validate().unwrap_err().into();
        match err {
            AppError::Validation(messages) => {
                assert_eq!(messages.len(), 3);
                assert!(messages.contains(&"Enter a valid email address".to_string()));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_username_rules() {
        assert!(validate_username("ms_frizzle").is_ok());
        assert!(validate_username("abc").is_ok());
        assert!(validate_username("ab").is_err());
        assert!(validate_username("has space").is_err());
        assert!(validate_username("émile").is_err());
        assert!(validate_username(&"a".repeat(33)).is_err());
    }

    #[test]
    fn test_reset_password_requires_long_password() {
        let request = ResetPasswordRequest {
            token: "abc".to_string(),
            new_password: "1234567".to_string(),
        };
        assert!(request.validate().is_err());
    }

    #[tokio::test]
    async fn test_reset_link_failure_is_swallowed() {
        // The lazy test pool cannot reach a database, so storing the token fails
        let state = crate::test_support::test_state();
        let user = User {
            id: uuid::Uuid::new_v4(),
            email: "teacher@school.edu".to_string(),
            username: "teacher".to_string(),
            password_hash: state.dummy_password_hash.clone(),
            display_name: None,
            raffle_tickets: 0,
            referred_by: None,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };

        let sent = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            send_reset_link(&state, &user),
        )
        .await;
        assert!(sent.is_ok());
    }

    #[test]
    fn test_auth_response_has_no_password_hash() {
        let response = AuthResponse {
            token: "jwt".to_string(),
            user: UserProfile {
                id: uuid::Uuid::new_v4(),
                email: "a@b.co".to_string(),
                username: "teacher".to_string(),
                display_name: "teacher".to_string(),
                raffle_tickets: 0,
                created_at: chrono::Utc::now(),
            },
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"token\":\"jwt\""));
        assert!(!json.contains("password"));
    }
}
