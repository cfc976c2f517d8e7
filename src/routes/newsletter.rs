use crate::{db, error::Result, AppState};
use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct NewsletterRequest {
    #[validate(email(message = "Enter a valid email address"))]
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct SubscriptionResponse {
    pub email: String,
    pub subscribed: bool,
}

pub async fn subscribe(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewsletterRequest>,
) -> Result<(StatusCode, Json<SubscriptionResponse>)> {
    payload.validate()?;

    let subscriber = db::queries::subscribe_newsletter(&state.db, payload.email.trim()).await?;
    tracing::info!("Newsletter subscription for {}", subscriber.email);

    Ok((
        StatusCode::CREATED,
        Json(SubscriptionResponse {
            subscribed: subscriber.is_active(),
            email: subscriber.email,
        }),
    ))
}

/// Unsubscribe an address. Unknown addresses get the same answer.
pub async fn unsubscribe(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewsletterRequest>,
) -> Result<Json<SubscriptionResponse>> {
    payload.validate()?;

    let email = payload.email.trim().to_lowercase();
    if db::queries::unsubscribe_newsletter(&state.db, &email).await? {
        tracing::info!("Newsletter unsubscribe for {}", email);
    }

    Ok(Json(SubscriptionResponse {
        email,
        subscribed: false,
    }))
}
