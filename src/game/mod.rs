// Board validation, live play and marketplace search

pub mod marketplace;
pub mod play;
pub mod validator;

pub use marketplace::{MarketplaceParams, MarketplaceQuery};
pub use play::{PlayCommand, PlayError, PlaySnapshot, PlayState};
pub use validator::BoardValidator;
