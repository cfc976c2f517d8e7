use crate::{
    auth::{self, AuthenticatedUser},
    db,
    error::{AppError, Result},
    models::{ReferralLink, ReferredUser},
    AppState,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::sync::Arc;

const CODE_ATTEMPTS: usize = 3;

#[derive(Debug, Serialize)]
pub struct ReferralLinkResponse {
    #[serde(flatten)]
    pub link: ReferralLink,
    /// Signup URL to share, e.g. `https://compyy.app/register?ref=ABCD2345`
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct ReferralSummary {
    pub referrals: Vec<ReferredUser>,
    pub raffle_tickets: i32,
}

fn share_url(frontend_url: &str, code: &str) -> String {
    format!("{}/register?ref={}", frontend_url.trim_end_matches('/'), code)
}

/// Return the caller's referral link, creating it on first use
pub async fn get_link(
    user: AuthenticatedUser,
    State(state): State<Arc<AppState>>,
) -> Result<Json<ReferralLinkResponse>> {
    let mut attempt = 0;
    let link = loop {
        attempt += 1;
        let code = auth::generate_referral_code();
        match db::queries::get_or_create_referral_link(&state.db, user.user_id, &code).await {
            Ok(link) => break link,
            // Another user already holds this code
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() && attempt < CODE_ATTEMPTS => {
                tracing::warn!("Referral code collision on {}, retrying", code);
            }
            Err(e) => return Err(e.into()),
        }
    };

    Ok(Json(ReferralLinkResponse {
        url: share_url(&state.config.server.frontend_url, &link.code),
        link,
    }))
}

/// Count a visit to a referral link; no sign-in needed
pub async fn record_click(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<StatusCode> {
    if !db::queries::increment_referral_clicks(&state.db, code.trim()).await? {
        return Err(AppError::NotFound("Referral code"));
    }

    tracing::debug!("Referral click on {}", code);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_referrals(
    user: AuthenticatedUser,
    State(state): State<Arc<AppState>>,
) -> Result<Json<ReferralSummary>> {
    let db_user = db::queries::get_user(&state.db, user.user_id)
        .await?
        .ok_or(AppError::NotFound("User"))?;
    let referrals = db::queries::list_referrals(&state.db, user.user_id).await?;

    Ok(Json(ReferralSummary {
        referrals,
        raffle_tickets: db_user.raffle_tickets,
    }))
}
