pub mod models;
pub mod token_provider;

pub use models::*;
pub use token_provider::{AccessToken, TokenOutcome, TokenProvider};
