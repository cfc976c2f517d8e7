use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Raffle tickets a referrer earns per referred signup
pub const REFERRAL_TICKET_REWARD: i32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ReferralLink {
    pub code: String,
    pub user_id: Uuid,
    pub clicks: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Referral {
    pub id: Uuid,
    pub referrer_id: Uuid,
    pub referred_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// A referral as shown to the referrer
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ReferredUser {
    pub username: String,
    pub created_at: DateTime<Utc>,
}
