pub mod game;
pub mod newsletter;
pub mod referral;
pub mod template;
pub mod user;

pub use game::{
    // Board content
    Category, Difficulty, GameContent, GameStyling, Media, MediaKind, Question,
    // Database models
    Game, GameSummary,
};
pub use newsletter::NewsletterSubscriber;
pub use referral::{Referral, ReferralLink, ReferredUser, REFERRAL_TICKET_REWARD};
pub use template::{MarketplaceListing, Template};
pub use user::{DashboardCounts, PasswordReset, User, UserProfile};
