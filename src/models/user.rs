use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    /// Stored lowercased
    pub email: String,
    pub username: String,
    pub password_hash: String,
    /// Name shown to other teachers (preferred for display)
    pub display_name: Option<String>,
    pub raffle_tickets: i32,
    pub referred_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The user as returned by the API; never carries the password hash
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub display_name: String,
    pub raffle_tickets: i32,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Get the best display name for this user
    /// Priority: display_name > username
    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.username)
    }

    pub fn to_profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            email: self.email.clone(),
            username: self.username.clone(),
            display_name: self.display_name().to_string(),
            raffle_tickets: self.raffle_tickets,
            created_at: self.created_at,
        }
    }
}

/// A one-time password reset token
#[derive(Debug, Clone, FromRow)]
pub struct PasswordReset {
    pub token: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl PasswordReset {
    /// A token can be redeemed once, before it expires
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.used_at.is_none() && self.expires_at > now
    }
}

/// Per-user counts shown on the dashboard
#[derive(Debug, Clone, Default, Serialize, FromRow)]
pub struct DashboardCounts {
    pub games: i64,
    pub templates: i64,
    pub public_templates: i64,
    pub downloads_received: i64,
    pub referrals: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn test_user(display_name: Option<&str>) -> User {
        User {
            id: Uuid::new_v4(),
            email: "teacher@school.edu".to_string(),
            username: "ms_frizzle".to_string(),
            password_hash: "$2b$04$hash".to_string(),
            display_name: display_name.map(String::from),
            raffle_tickets: 3,
            referred_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_display_name_prefers_display_name() {
        let user = test_user(Some("Ms. Frizzle"));
        assert_eq!(user.display_name(), "Ms. Frizzle");
    }

    #[test]
    fn test_display_name_falls_back_to_username() {
        let user = test_user(None);
        assert_eq!(user.display_name(), "ms_frizzle");
    }

    #[test]
    fn test_profile_omits_password_hash() {
        let profile = test_user(None).to_profile();
        let json = serde_json::to_string(&profile).unwrap();

        assert!(!json.contains("password"));
        assert!(!json.contains("$2b$"));
        assert!(json.contains("ms_frizzle"));
    }

    fn reset(expires_in: Duration, used: bool) -> (PasswordReset, DateTime<Utc>) {
        let now = Utc::now();
        (
            PasswordReset {
                token: "token".to_string(),
                user_id: Uuid::new_v4(),
                expires_at: now + expires_in,
                used_at: used.then_some(now),
                created_at: now,
            },
            now,
        )
    }

    #[test]
    fn test_reset_token_usable_within_the_hour() {
        let (reset, now) = reset(Duration::hours(1), false);
        assert!(reset.is_usable(now));
        assert!(reset.is_usable(now + Duration::minutes(59)));
    }

    #[test]
    fn test_reset_token_expires_after_one_hour() {
        let (reset, now) = reset(Duration::hours(1), false);
        assert!(!reset.is_usable(now + Duration::hours(1)));
        assert!(!reset.is_usable(now + Duration::minutes(61)));
    }

    #[test]
    fn test_reset_token_is_single_use() {
        let (reset, now) = reset(Duration::hours(1), true);
        assert!(!reset.is_usable(now));
    }
}
